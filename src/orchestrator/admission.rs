//! Admission control: concurrency cap and channel uniqueness.

use std::sync::Arc;

use tracing::warn;

use super::registry::{SessionRegistry, SessionSlot};
use crate::{AppError, Result};

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The channel is reserved in `Starting` state for the caller.
    Accepted,
    /// The registry is at the configured maximum.
    RejectedLimit,
    /// The channel already has an entry.
    RejectedDuplicate,
}

impl Admission {
    /// Map a rejection onto its error; `Accepted` maps to `Ok`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::WorkersLimit` or `AppError::ChannelExists`.
    pub fn into_result(self, channel_name: &str, max_sessions: usize) -> Result<()> {
        match self {
            Self::Accepted => Ok(()),
            Self::RejectedLimit => Err(AppError::WorkersLimit(format!(
                "{max_sessions} sessions already running"
            ))),
            Self::RejectedDuplicate => Err(AppError::ChannelExists(format!(
                "channel `{channel_name}` already has a session"
            ))),
        }
    }
}

/// Gate in front of session creation.
///
/// The size check and the reservation are separate steps, so a burst of
/// starts may briefly overshoot the limit; the reservation itself is atomic
/// per channel.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    registry: Arc<SessionRegistry>,
    max_sessions: usize,
}

impl AdmissionController {
    /// Create a controller enforcing `max_sessions`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, max_sessions: usize) -> Self {
        Self {
            registry,
            max_sessions,
        }
    }

    /// Configured maximum.
    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Try to reserve `channel_name`.
    #[must_use]
    pub fn admit(&self, channel_name: &str) -> Admission {
        let running = self.registry.len();
        if running >= self.max_sessions {
            warn!(
                channel = channel_name,
                running,
                max = self.max_sessions,
                "admission rejected: workers limit"
            );
            return Admission::RejectedLimit;
        }

        if self.registry.try_insert(channel_name, SessionSlot::Starting) {
            Admission::Accepted
        } else {
            warn!(channel = channel_name, "admission rejected: channel exists");
            Admission::RejectedDuplicate
        }
    }
}
