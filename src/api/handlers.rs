//! Request handlers for the HTTP control surface.
//!
//! Handlers validate channel names, call into the session manager, and
//! translate core errors into envelope codes. Body parse failures are
//! reported as `params invalid`.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::response::{self, ApiError};
use super::AppState;
use crate::credentials::TokenRole;
use crate::models::command::WorkerCommand;
use crate::models::request::{
    require_channel, ChannelRequest, CollectionUpdateRequest, StartRequest, TokenRequest,
};
use crate::orchestrator::session_manager::unix_now;

type HandlerResult = std::result::Result<Response, ApiError>;

fn body<T>(
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> std::result::Result<T, ApiError> {
    payload.map(|Json(value)| value).map_err(|err| {
        warn!(%err, "request body invalid");
        ApiError::new(StatusCode::BAD_REQUEST, response::PARAMS_INVALID)
    })
}

fn query<T>(
    params: std::result::Result<Query<T>, QueryRejection>,
) -> std::result::Result<T, ApiError> {
    params.map(|Query(value)| value).map_err(|err| {
        warn!(%err, "query invalid");
        ApiError::new(StatusCode::BAD_REQUEST, response::PARAMS_INVALID)
    })
}

fn channel(channel_name: &str) -> std::result::Result<(), ApiError> {
    require_channel(channel_name)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, response::CHANNEL_EMPTY))
}

/// `GET /health`
pub async fn health() -> Response {
    response::ok(response::OK, ())
}

/// `GET /sessions`
pub async fn sessions(State(state): State<Arc<AppState>>) -> Response {
    response::ok(response::SUCCESS, state.manager.list())
}

/// `POST /ping`
pub async fn ping(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChannelRequest>, JsonRejection>,
) -> HandlerResult {
    let req = body(payload)?;
    channel(&req.channel_name)?;

    let session = state
        .manager
        .ping(&req.channel_name, unix_now())
        .map_err(|err| ApiError::from_app(&err, response::CHANNEL_NOT_EXISTED))?;

    info!(channel = %req.channel_name, request_id = %req.request_id, "ping");
    Ok(response::ok(response::SUCCESS, session))
}

/// `POST /start`
pub async fn start(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<StartRequest>, JsonRejection>,
) -> HandlerResult {
    let mut req = body(payload)?;
    channel(&req.channel_name)?;
    if req.request_id.is_empty() {
        req.request_id = Uuid::new_v4().to_string();
    }

    let session = state
        .manager
        .start(req)
        .await
        .map_err(|err| ApiError::from_app(&err, response::START_WORKER_FAILED))?;
    Ok(response::ok(response::SUCCESS, session))
}

/// `POST /stop`
pub async fn stop(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChannelRequest>, JsonRejection>,
) -> HandlerResult {
    let req = body(payload)?;
    channel(&req.channel_name)?;

    state
        .manager
        .stop(&req.channel_name)
        .await
        .map_err(|err| ApiError::from_app(&err, response::STOP_WORKER_FAILED))?;
    Ok(response::ok(response::SUCCESS, ()))
}

/// `POST /token/generate`: publisher token for a client.
pub async fn generate_token(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<TokenRequest>, JsonRejection>,
) -> HandlerResult {
    let req = body(payload)?;
    channel(&req.channel_name)?;

    let credentials = state.manager.credentials();
    let token = credentials
        .issue_token(
            &req.channel_name,
            req.uid,
            TokenRole::Publisher,
            state.config.token_expiration_seconds,
        )
        .map_err(|err| ApiError::from_app(&err, response::GENERATE_TOKEN_FAILED))?;

    Ok(response::ok(
        response::SUCCESS,
        json!({
            "appId": credentials.app_id(),
            "token": token,
            "channel_name": req.channel_name,
            "uid": req.uid,
        }),
    ))
}

/// `POST /vector/document/update`
pub async fn update_collection(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CollectionUpdateRequest>, JsonRejection>,
) -> HandlerResult {
    let req = body(payload)?;
    channel(&req.channel_name)?;

    let command = WorkerCommand::update_querying_collection(
        &req.request_id,
        &req.channel_name,
        &req.collection,
        &req.file_name,
    );
    state
        .manager
        .update(&req.channel_name, &command)
        .await
        .map_err(|err| {
            let mut api = ApiError::from_app(&err, response::UPDATE_WORKER_FAILED);
            if api.code == response::UPDATE_WORKER_FAILED {
                api.status = StatusCode::BAD_REQUEST;
            }
            api
        })?;

    Ok(response::ok(
        response::SUCCESS,
        json!({ "channel_name": req.channel_name }),
    ))
}

/// Query for `GET /customer/customers`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomerListQuery {
    /// Comma-separated field names; empty keeps every field.
    pub fields: String,
}

/// Query for `GET /customer/customer`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomerGetQuery {
    /// Customer identifier.
    pub id: String,
}

/// `GET /customer/properties`
pub async fn customer_properties(State(state): State<Arc<AppState>>) -> Response {
    response::ok(response::SUCCESS, state.manager.profiles().fields())
}

/// `GET /customer/customers`
pub async fn customer_list(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<CustomerListQuery>, QueryRejection>,
) -> HandlerResult {
    let params = query(params)?;
    let fields: Vec<String> = params.fields.split(',').map(str::to_owned).collect();
    Ok(response::ok(
        response::SUCCESS,
        state.manager.profiles().list(&fields),
    ))
}

/// `GET /customer/customer`
pub async fn customer_get(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<CustomerGetQuery>, QueryRejection>,
) -> HandlerResult {
    let params = query(params)?;
    match state.manager.profiles().lookup(&params.id) {
        Some(profile) if !profile.is_empty() => Ok(response::ok(response::SUCCESS, profile)),
        _ => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            response::CUSTOMER_NOT_FOUND,
        )),
    }
}
