//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::pipeline::field_map::FieldMap;
use crate::{AppError, Result};

/// Keychain service name used for runtime secrets.
pub const KEYRING_SERVICE: &str = "graph-conductor";

/// Required length of the channel application identifier.
pub const APP_ID_LEN: usize = 32;

/// Worker process launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Worker executable.
    pub command: String,
    /// Arguments passed before `--property <config_path>`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the worker; inherits the server's when absent.
    #[serde(default)]
    pub current_dir: Option<PathBuf>,
    /// Lowest callback port handed to workers.
    #[serde(default = "default_callback_port_min")]
    pub callback_port_min: u16,
    /// Highest callback port handed to workers.
    #[serde(default = "default_callback_port_max")]
    pub callback_port_max: u16,
}

fn default_callback_port_min() -> u16 {
    10000
}

fn default_callback_port_max() -> u16 {
    30000
}

/// Customer profile store settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProfileConfig {
    /// JSON file holding an array of customer records.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Prompt template rendered from a customer's fields (`{field}` placeholders).
    #[serde(default)]
    pub prompt_template: Option<String>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_max_workers() -> u32 {
    5
}

fn default_quit_timeout() -> u64 {
    60
}

fn default_heartbeat_timeout() -> u64 {
    60
}

fn default_reaper_interval() -> u64 {
    5
}

fn default_token_expiration() -> u32 {
    86_400
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Channel application identifier.
    pub app_id: String,
    /// Channel application certificate (populated at runtime).
    #[serde(skip)]
    pub app_certificate: String,
    /// Directory receiving per-session configuration and log files.
    pub work_dir: PathBuf,
    /// Pipeline property template loaded at startup.
    pub property_template: PathBuf,
    /// Port for the HTTP control surface.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Maximum concurrent worker sessions.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    /// Grace period before a stopping worker is force-terminated.
    #[serde(default = "default_quit_timeout")]
    pub worker_quit_timeout_seconds: u64,
    /// Heartbeat age after which the reaper stops a session.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_seconds: u64,
    /// Interval between reaper scans.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
    /// Lifetime of issued channel tokens.
    #[serde(default = "default_token_expiration")]
    pub token_expiration_seconds: u32,
    /// Worker launch settings.
    pub worker: WorkerConfig,
    /// Customer profile settings.
    #[serde(default)]
    pub profiles: ProfileConfig,
    /// Graph selection and property mapping tables.
    #[serde(default)]
    pub pipeline: FieldMap,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the app certificate from OS keychain with env-var fallback.
    ///
    /// A missing certificate is not an error: tokens then degrade to the
    /// bare app id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.app_certificate = load_credential("app_certificate", "APP_CERTIFICATE")
            .await?
            .unwrap_or_default();
        if self.app_certificate.is_empty() {
            warn!("no app certificate configured, tokens fall back to the app id");
        }
        Ok(())
    }

    /// Grace period before forced worker termination.
    #[must_use]
    pub fn quit_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_quit_timeout_seconds)
    }

    /// Interval between reaper scans.
    #[must_use]
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }

    fn validate(&mut self) -> Result<()> {
        if self.app_id.chars().count() != APP_ID_LEN {
            return Err(AppError::Config(format!(
                "app_id must be {APP_ID_LEN} characters long"
            )));
        }

        if self.max_workers == 0 {
            return Err(AppError::Config(
                "max_workers must be greater than zero".into(),
            ));
        }

        if self.worker_quit_timeout_seconds == 0 {
            return Err(AppError::Config(
                "worker_quit_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.heartbeat_timeout_seconds == 0 {
            return Err(AppError::Config(
                "heartbeat_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.reaper_interval_seconds == 0 {
            return Err(AppError::Config(
                "reaper_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.worker.command.trim().is_empty() {
            return Err(AppError::Config("worker.command must not be empty".into()));
        }

        if self.worker.callback_port_min == 0
            || self.worker.callback_port_min > self.worker.callback_port_max
        {
            return Err(AppError::Config(format!(
                "invalid callback port range {}..={}",
                self.worker.callback_port_min, self.worker.callback_port_max
            )));
        }

        if !self.work_dir.exists() {
            fs::create_dir_all(&self.work_dir)
                .map_err(|err| AppError::Config(format!("cannot create work_dir: {err}")))?;
        }
        self.work_dir = self
            .work_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("work_dir invalid: {err}")))?;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
///
/// Returns `Ok(None)` when neither source provides a value.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.is_empty()))
}
