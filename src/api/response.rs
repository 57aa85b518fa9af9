//! Response envelope and error mapping for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::AppError;

/// Result code carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code {
    /// Numeric code as a string.
    pub code: &'static str,
    /// Short message.
    pub msg: &'static str,
}

impl Code {
    const fn new(code: &'static str, msg: &'static str) -> Self {
        Self { code, msg }
    }
}

/// Liveness probe.
pub const OK: Code = Code::new("0", "ok");
/// Operation completed.
pub const SUCCESS: Code = Code::new("0", "success");
/// Body or query could not be parsed.
pub const PARAMS_INVALID: Code = Code::new("10000", "params invalid");
/// Concurrent worker limit reached.
pub const WORKERS_LIMIT: Code = Code::new("10001", "workers limit");
/// No running session for the channel.
pub const CHANNEL_NOT_EXISTED: Code = Code::new("10002", "channel not existed");
/// The channel already has a session.
pub const CHANNEL_EXISTED: Code = Code::new("10003", "channel existed");
/// Blank channel name.
pub const CHANNEL_EMPTY: Code = Code::new("10004", "channel empty");
/// Token issuance failed.
pub const GENERATE_TOKEN_FAILED: Code = Code::new("10005", "generate token failed");
/// Configuration could not be materialized.
pub const PROCESS_PROPERTY_FAILED: Code = Code::new("10100", "process property json failed");
/// Worker launch failed.
pub const START_WORKER_FAILED: Code = Code::new("10101", "start worker failed");
/// Worker stop failed.
pub const STOP_WORKER_FAILED: Code = Code::new("10102", "stop worker failed");
/// Worker command failed.
pub const UPDATE_WORKER_FAILED: Code = Code::new("10103", "update worker failed");
/// Unknown customer.
pub const CUSTOMER_NOT_FOUND: Code = Code::new("10200", "customer not found");

#[derive(Debug, Serialize)]
struct Envelope {
    code: &'static str,
    msg: &'static str,
    data: Value,
}

/// Successful envelope response.
#[must_use]
pub fn ok(code: Code, data: impl Serialize) -> Response {
    let data = serde_json::to_value(data).unwrap_or(Value::Null);
    envelope(StatusCode::OK, code, data)
}

fn envelope(status: StatusCode, code: Code, data: Value) -> Response {
    (
        status,
        Json(Envelope {
            code: code.code,
            msg: code.msg,
            data,
        }),
    )
        .into_response()
}

/// Failed request, rendered as an envelope with a non-2xx status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status.
    pub status: StatusCode,
    /// Envelope code.
    pub code: Code,
}

impl ApiError {
    /// Build an error from parts.
    #[must_use]
    pub fn new(status: StatusCode, code: Code) -> Self {
        Self { status, code }
    }

    /// Map a core error; `fallback` covers operation-specific failures.
    #[must_use]
    pub fn from_app(err: &AppError, fallback: Code) -> Self {
        warn!(%err, "request failed");
        match err {
            AppError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, CHANNEL_EMPTY),
            AppError::WorkersLimit(_) => Self::new(StatusCode::TOO_MANY_REQUESTS, WORKERS_LIMIT),
            AppError::ChannelExists(_) => Self::new(StatusCode::BAD_REQUEST, CHANNEL_EXISTED),
            AppError::ChannelNotFound(_) => {
                Self::new(StatusCode::BAD_REQUEST, CHANNEL_NOT_EXISTED)
            }
            AppError::ChannelBusy(_) => Self::new(StatusCode::CONFLICT, fallback),
            AppError::GraphNotFound(_) | AppError::Template(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, PROCESS_PROPERTY_FAILED)
            }
            AppError::WorkerLaunch(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, START_WORKER_FAILED)
            }
            AppError::Credential(_) => {
                Self::new(StatusCode::BAD_REQUEST, GENERATE_TOKEN_FAILED)
            }
            AppError::Profile(_) => Self::new(StatusCode::NOT_FOUND, CUSTOMER_NOT_FOUND),
            AppError::WorkerCommand(_) | AppError::Config(_) | AppError::Io(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, fallback)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        envelope(self.status, self.code, Value::Null)
    }
}
