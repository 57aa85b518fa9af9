#![forbid(unsafe_code)]

//! `graph-conductor`: control plane server binary.
//!
//! Bootstraps configuration, loads the pipeline template and customer
//! profiles, starts the heartbeat reaper and the HTTP control surface, and
//! stops every worker on shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use graph_conductor::api::{self, AppState};
use graph_conductor::config::GlobalConfig;
use graph_conductor::credentials::SignedTokenIssuer;
use graph_conductor::orchestrator::reaper;
use graph_conductor::orchestrator::registry::SessionRegistry;
use graph_conductor::orchestrator::session_manager::{SessionManager, SessionSettings};
use graph_conductor::pipeline::materializer::Materializer;
use graph_conductor::pipeline::template::TemplateStore;
use graph_conductor::profile::{JsonProfileStore, ProfileStore};
use graph_conductor::worker::process::ProcessWorker;
use graph_conductor::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "graph-conductor", about = "Pipeline worker control plane", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the directory receiving session configs and logs.
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("graph-conductor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;

    if let Some(dir) = args.work_dir {
        std::fs::create_dir_all(&dir)
            .map_err(|err| AppError::Config(format!("cannot create work dir override: {err}")))?;
        config.work_dir = dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid work dir override: {err}")))?;
    }

    config.load_credentials().await?;
    let config = Arc::new(config);
    info!(work_dir = %config.work_dir.display(), "configuration loaded");

    // ── Pipeline template ───────────────────────────────
    let field_map = Arc::new(config.pipeline.clone());
    let template = Arc::new(TemplateStore::load(&config.property_template, &field_map)?);
    let materializer = Materializer::new(template, field_map, config.work_dir.clone());

    // ── Collaborators ───────────────────────────────────
    let profiles: Arc<dyn ProfileStore> = match &config.profiles.database {
        Some(path) => Arc::new(JsonProfileStore::load(path)?),
        None => {
            info!("no profile database configured");
            Arc::new(JsonProfileStore::default())
        }
    };
    let credentials = Arc::new(SignedTokenIssuer::new(
        config.app_id.clone(),
        config.app_certificate.clone(),
    ));
    let worker = Arc::new(ProcessWorker::new(&config.worker));

    let manager = Arc::new(SessionManager::new(
        Arc::new(SessionRegistry::new()),
        materializer,
        worker,
        credentials,
        profiles,
        SessionSettings::from_config(&config),
    ));

    // ── Background tasks ────────────────────────────────
    let ct = CancellationToken::new();
    let reaper_handle = reaper::spawn_reaper(
        Arc::clone(&manager),
        config.reaper_interval(),
        std::time::Duration::from_secs(config.heartbeat_timeout_seconds),
        ct.clone(),
    );
    info!(
        interval_seconds = config.reaper_interval_seconds,
        heartbeat_timeout_seconds = config.heartbeat_timeout_seconds,
        "heartbeat reaper started"
    );

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        manager: Arc::clone(&manager),
    });
    let http_ct = ct.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(state, http_ct.clone()).await {
            error!(%err, "HTTP control surface failed");
            http_ct.cancel();
        }
    });

    info!(port = config.http_port, "graph-conductor ready");

    // ── Wait for shutdown ───────────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => warn!("shutting down after server failure"),
    }
    ct.cancel();

    // In-flight starts must register before the final sweep.
    let _ = tokio::join!(http_handle, reaper_handle);

    let failures = manager.stop_all().await;
    if failures > 0 {
        error!(failures, "some workers could not be stopped cleanly");
    }

    info!("graph-conductor shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
