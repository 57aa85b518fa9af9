//! Request payloads accepted by the control plane.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::field_map::StartField;
use crate::{AppError, Result};

/// Start a pipeline worker for a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct StartRequest {
    /// Caller-supplied correlation id.
    pub request_id: String,
    /// Channel the worker joins.
    pub channel_name: String,
    /// Explicit graph; resolved from the language when empty.
    pub graph_name: String,
    /// Speech recognition language, also the voice table key.
    #[serde(alias = "agora_asr_language")]
    pub asr_language: String,
    /// Remote media stream to subscribe to.
    pub remote_stream_id: u32,
    /// Subscriber token; issued by the control plane before launch.
    pub token: String,
    /// Requested voice type (`male`, `female`, ...).
    pub voice_type: String,
    /// Worker callback port; assigned by the control plane.
    pub worker_http_server_port: u16,
    /// Customer whose profile seeds defaults.
    pub customer_id: String,
    /// System prompt; rendered from the profile when a template is set.
    pub prompt: String,
}

impl StartRequest {
    /// Minimal request for a channel.
    #[must_use]
    pub fn for_channel(channel_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            ..Self::default()
        }
    }

    /// Value of a mappable field, or `None` when it is empty or zero.
    #[must_use]
    pub fn field_value(&self, field: StartField) -> Option<Value> {
        let text = |s: &str| (!s.is_empty()).then(|| Value::String(s.to_owned()));
        match field {
            StartField::ChannelName => text(&self.channel_name),
            StartField::RemoteStreamId => {
                (self.remote_stream_id != 0).then(|| Value::from(self.remote_stream_id))
            }
            StartField::Token => text(&self.token),
            StartField::WorkerHttpServerPort => (self.worker_http_server_port != 0)
                .then(|| Value::from(self.worker_http_server_port)),
            StartField::AsrLanguage => text(&self.asr_language),
            StartField::VoiceType => text(&self.voice_type),
            StartField::Prompt => text(&self.prompt),
        }
    }

    /// Reject requests without a usable channel name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when the channel name is blank.
    pub fn validate(&self) -> Result<()> {
        require_channel(&self.channel_name)
    }
}

/// Reject blank channel names.
///
/// # Errors
///
/// Returns `AppError::Validation` when the channel name is blank.
pub fn require_channel(channel_name: &str) -> Result<()> {
    if channel_name.trim().is_empty() {
        Err(AppError::Validation("channel_name is empty".into()))
    } else {
        Ok(())
    }
}

/// Heartbeat or stop request for a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct ChannelRequest {
    /// Caller-supplied correlation id.
    pub request_id: String,
    /// Target channel.
    pub channel_name: String,
}

/// Publisher token request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct TokenRequest {
    /// Caller-supplied correlation id.
    pub request_id: String,
    /// Channel the token grants access to.
    pub channel_name: String,
    /// User id bound into the token.
    pub uid: u32,
}

/// Switch the document collection a running worker queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct CollectionUpdateRequest {
    /// Caller-supplied correlation id.
    pub request_id: String,
    /// Target channel.
    pub channel_name: String,
    /// Collection to query.
    pub collection: String,
    /// Display name of the source file.
    pub file_name: String,
}
