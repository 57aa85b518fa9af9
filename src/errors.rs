//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Empty or malformed request field, rejected at the boundary.
    Validation(String),
    /// Admission refused: the concurrent worker limit is reached.
    WorkersLimit(String),
    /// Admission refused: a session already exists for the channel.
    ChannelExists(String),
    /// Neither the explicit graph name nor the language table resolved
    /// to a graph in the template.
    GraphNotFound(String),
    /// Template could not be loaded, patched, or written.
    Template(String),
    /// The external worker failed to launch.
    WorkerLaunch(String),
    /// No running session exists for the channel.
    ChannelNotFound(String),
    /// The channel is already being stopped by another caller.
    ChannelBusy(String),
    /// A stop signal or control command to the worker failed.
    WorkerCommand(String),
    /// Token issuance failure.
    Credential(String),
    /// Profile store loading failure.
    Profile(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::WorkersLimit(msg) => write!(f, "workers limit: {msg}"),
            Self::ChannelExists(msg) => write!(f, "channel exists: {msg}"),
            Self::GraphNotFound(msg) => write!(f, "graph not found: {msg}"),
            Self::Template(msg) => write!(f, "template: {msg}"),
            Self::WorkerLaunch(msg) => write!(f, "worker launch: {msg}"),
            Self::ChannelNotFound(msg) => write!(f, "channel not found: {msg}"),
            Self::ChannelBusy(msg) => write!(f, "channel busy: {msg}"),
            Self::WorkerCommand(msg) => write!(f, "worker command: {msg}"),
            Self::Credential(msg) => write!(f, "credential: {msg}"),
            Self::Profile(msg) => write!(f, "profile: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Whether the error is one of the two admission rejections.
    #[must_use]
    pub fn is_admission_rejection(&self) -> bool {
        matches!(self, Self::WorkersLimit(_) | Self::ChannelExists(_))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Template(format!("invalid json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
