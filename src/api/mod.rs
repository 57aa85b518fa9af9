//! HTTP control surface.
//!
//! A thin axum router over the [`SessionManager`]: start, stop, and ping
//! sessions, issue publisher tokens, forward collection updates to
//! running workers, and read customer profiles.

mod handlers;
pub mod response;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::orchestrator::session_manager::SessionManager;
use crate::{AppError, Result};

/// Shared state handed to every handler.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Session lifecycle driver.
    pub manager: Arc<SessionManager>,
}

/// Build the router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .route("/sessions", get(handlers::sessions))
        .route("/ping", post(handlers::ping))
        .route("/start", post(handlers::start))
        .route("/stop", post(handlers::stop))
        .route("/token/generate", post(handlers::generate_token))
        .route("/vector/document/update", post(handlers::update_collection))
        .route("/customer/properties", get(handlers::customer_properties))
        .route("/customer/customers", get(handlers::customer_list))
        .route("/customer/customer", get(handlers::customer_get))
        .with_state(state)
}

/// Serve on `config.http_port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails to bind or serve.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;
    serve_on(listener, state, ct).await
}

/// Serve on an already-bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails.
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Config(format!("listener has no address: {err}")))?;
    info!(%addr, "starting HTTP control surface");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("HTTP server error: {err}")))?;

    info!("HTTP control surface shut down");
    Ok(())
}
