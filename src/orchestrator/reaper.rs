//! Heartbeat reaper: stops sessions whose clients went silent.
//!
//! Every tick scans a registry snapshot and stops each running session
//! whose heartbeat is older than the expiry threshold. Stops in one tick
//! run concurrently; a failed stop is logged and the session, still
//! registered, is reconsidered on the next tick.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::session_manager::{unix_now, SessionManager};
use crate::models::session::SessionState;

/// Result of one reaper pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Channels stopped and removed.
    pub stopped: Vec<String>,
    /// Channels whose stop failed; retried next tick.
    pub failed: Vec<String>,
}

/// Channels whose heartbeat age at `now` exceeds `threshold_seconds`.
#[must_use]
pub fn expired_channels(manager: &SessionManager, threshold_seconds: i64, now: i64) -> Vec<String> {
    let mut expired = Vec::new();
    manager.registry().for_each(|session| {
        if session.state() == SessionState::Running
            && session.heartbeat_age(now) > threshold_seconds
        {
            expired.push(session.channel_name().to_owned());
        }
    });
    expired
}

/// Run one reaper pass as of `now` (Unix seconds).
pub async fn reap_once(manager: &SessionManager, threshold_seconds: i64, now: i64) -> ReapReport {
    let expired = expired_channels(manager, threshold_seconds, now);
    if expired.is_empty() {
        return ReapReport::default();
    }

    info!(count = expired.len(), "reaping sessions with stale heartbeats");
    let results = join_all(expired.iter().map(|channel| manager.stop(channel))).await;

    let mut report = ReapReport::default();
    for (channel, result) in expired.into_iter().zip(results) {
        match result {
            Ok(()) => {
                info!(channel = %channel, "stale session reaped");
                report.stopped.push(channel);
            }
            Err(err) => {
                warn!(channel = %channel, %err, "reap failed, retrying next tick");
                report.failed.push(channel);
            }
        }
    }
    report
}

/// Spawn the reaper background task.
///
/// The task ticks every `interval` until `cancel` fires.
#[must_use]
pub fn spawn_reaper(
    manager: Arc<SessionManager>,
    interval: Duration,
    heartbeat_timeout: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let threshold = i64::try_from(heartbeat_timeout.as_secs()).unwrap_or(i64::MAX);
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        reap_once(&manager, threshold, unix_now()).await;
                    }
                }
            }
        }
        .instrument(info_span!("reaper")),
    )
}
