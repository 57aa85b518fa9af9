//! Collision-resistant names for per-session artifacts.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

/// Hex digest of a channel name.
#[must_use]
pub fn channel_digest(channel_name: &str) -> String {
    format!("{:x}", Sha256::digest(channel_name.as_bytes()))
}

/// Current time in nanoseconds since the Unix epoch.
#[must_use]
pub fn timestamp_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000))
}

/// Unique suffix for one session: channel digest plus nanosecond timestamp.
#[must_use]
pub fn unique_suffix(channel_name: &str) -> String {
    format!("{}-{}", channel_digest(channel_name), timestamp_nanos())
}

/// Configuration and log file paths for a session under `work_dir`.
#[must_use]
pub fn session_paths(work_dir: &Path, channel_name: &str) -> (PathBuf, PathBuf) {
    let suffix = unique_suffix(channel_name);
    (
        work_dir.join(format!("property-{suffix}.json")),
        work_dir.join(format!("app-{suffix}.log")),
    )
}
