//! Session record and lifecycle state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::worker::{LaunchSpec, WorkerHandle};

/// Lifecycle state of a channel. A channel without a registry entry is
/// absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Admitted; configuration and worker launch in progress.
    Starting,
    /// Worker launched and tracked.
    Running,
    /// Shutdown in progress.
    Stopping,
}

/// One active channel and the worker serving it.
///
/// Identity, paths, and port are fixed at creation. Only the heartbeat
/// timestamp and the stopping flag change afterwards.
#[derive(Debug)]
pub struct Session {
    channel_name: String,
    graph_name: String,
    config_path: PathBuf,
    log_path: PathBuf,
    http_port: u16,
    created_at: i64,
    quit_timeout: Duration,
    last_heartbeat_at: AtomicI64,
    stopping: AtomicBool,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Session {
    /// Record a freshly launched worker; `created_at = last_heartbeat_at = now`.
    #[must_use]
    pub fn new(
        launch: &LaunchSpec,
        graph_name: String,
        worker: WorkerHandle,
        quit_timeout: Duration,
        now: i64,
    ) -> Self {
        Self {
            channel_name: launch.channel_name.clone(),
            graph_name,
            config_path: launch.config_path.clone(),
            log_path: launch.log_path.clone(),
            http_port: launch.callback_port,
            created_at: now,
            quit_timeout,
            last_heartbeat_at: AtomicI64::new(now),
            stopping: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Channel name, the registry key.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Graph the worker runs.
    #[must_use]
    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    /// Materialized configuration file.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Worker log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Worker callback port.
    #[must_use]
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Creation time, Unix seconds.
    #[must_use]
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Graceful shutdown budget.
    #[must_use]
    pub fn quit_timeout(&self) -> Duration {
        self.quit_timeout
    }

    /// Latest heartbeat, Unix seconds.
    #[must_use]
    pub fn last_heartbeat_at(&self) -> i64 {
        self.last_heartbeat_at.load(Ordering::SeqCst)
    }

    /// Advance the heartbeat to `max(current, now)` and return the result.
    pub fn touch(&self, now: i64) -> i64 {
        self.last_heartbeat_at.fetch_max(now, Ordering::SeqCst).max(now)
    }

    /// Seconds since the last heartbeat.
    #[must_use]
    pub fn heartbeat_age(&self, now: i64) -> i64 {
        now - self.last_heartbeat_at()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.stopping.load(Ordering::SeqCst) {
            SessionState::Stopping
        } else {
            SessionState::Running
        }
    }

    /// Transition `Running → Stopping`; `false` if another stop holds it.
    pub(crate) fn begin_stop(&self) -> bool {
        !self.stopping.swap(true, Ordering::SeqCst)
    }

    /// Return to `Running` after a stop attempt failed before signalling.
    pub(crate) fn abort_stop(&self) {
        self.stopping.store(false, Ordering::SeqCst);
    }

    /// Worker handle slot; empty while a stop owns the handle.
    pub(crate) fn worker(&self) -> &Mutex<Option<WorkerHandle>> {
        &self.worker
    }

    /// Serializable view for responses and logs.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            channel_name: self.channel_name.clone(),
            graph_name: self.graph_name.clone(),
            http_port: self.http_port,
            created_at: self.created_at,
            last_heartbeat_at: self.last_heartbeat_at(),
            state: self.state(),
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionInfo {
    /// Channel name.
    pub channel_name: String,
    /// Graph the worker runs.
    pub graph_name: String,
    /// Worker callback port.
    pub http_port: u16,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Latest heartbeat, Unix seconds.
    pub last_heartbeat_at: i64,
    /// Lifecycle state.
    pub state: SessionState,
}
