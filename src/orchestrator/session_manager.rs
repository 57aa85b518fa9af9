//! Session lifecycle: start, heartbeat, stop, and mid-session updates.
//!
//! A channel moves through `Absent → Starting → Running → Stopping →
//! Absent`. Admission reserves the channel in `Starting`; the reservation
//! becomes a live session only after the worker launches, and is dropped
//! on any earlier failure. Stop owns the worker handle for the whole
//! shutdown and removes the entry last, so the channel cannot be
//! re-admitted until the worker is gone. The shutdown itself runs on a
//! spawned task and finishes even if the caller goes away.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{error, info, info_span, warn, Instrument, Span};

use super::admission::AdmissionController;
use super::ports::PortAllocator;
use super::registry::SessionRegistry;
use crate::config::GlobalConfig;
use crate::credentials::{CredentialIssuer, TokenRole};
use crate::models::command::WorkerCommand;
use crate::models::request::{require_channel, StartRequest};
use crate::models::session::{Session, SessionInfo, SessionState};
use crate::pipeline::materializer::Materializer;
use crate::profile::{infer_voice_type, render_prompt, ProfileStore};
use crate::worker::{LaunchSpec, WorkerDriver, WorkerHandle};
use crate::{AppError, Result};

/// Current time in Unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Tunables for the lifecycle driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Grace period before forced termination.
    pub quit_timeout: Duration,
    /// Lifetime of subscriber tokens embedded in configurations.
    pub token_expiration_seconds: u32,
    /// Prompt template rendered from customer profiles.
    pub prompt_template: Option<String>,
    /// Lowest worker callback port.
    pub callback_port_min: u16,
    /// Highest worker callback port.
    pub callback_port_max: u16,
}

impl SessionSettings {
    /// Derive settings from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            max_sessions: usize::try_from(config.max_workers).unwrap_or(usize::MAX),
            quit_timeout: config.quit_timeout(),
            token_expiration_seconds: config.token_expiration_seconds,
            prompt_template: config.profiles.prompt_template.clone(),
            callback_port_min: config.worker.callback_port_min,
            callback_port_max: config.worker.callback_port_max,
        }
    }
}

/// Drops a `Starting` reservation unless committed.
struct Reservation<'a> {
    registry: &'a SessionRegistry,
    channel_name: String,
    committed: bool,
}

impl<'a> Reservation<'a> {
    fn new(registry: &'a SessionRegistry, channel_name: &str) -> Self {
        Self {
            registry,
            channel_name: channel_name.to_owned(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.remove(&self.channel_name);
            info!(channel = %self.channel_name, "start reservation released");
        }
    }
}

/// Orchestrates worker sessions over the shared registry.
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    admission: AdmissionController,
    materializer: Materializer,
    worker: Arc<dyn WorkerDriver>,
    credentials: Arc<dyn CredentialIssuer>,
    profiles: Arc<dyn ProfileStore>,
    ports: PortAllocator,
    settings: SessionSettings,
}

impl SessionManager {
    /// Wire the lifecycle driver to its collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        materializer: Materializer,
        worker: Arc<dyn WorkerDriver>,
        credentials: Arc<dyn CredentialIssuer>,
        profiles: Arc<dyn ProfileStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            admission: AdmissionController::new(Arc::clone(&registry), settings.max_sessions),
            ports: PortAllocator::new(settings.callback_port_min, settings.callback_port_max),
            registry,
            materializer,
            worker,
            credentials,
            profiles,
            settings,
        }
    }

    /// Shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Token issuer shared with the HTTP surface.
    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialIssuer> {
        &self.credentials
    }

    /// Profile store shared with the HTTP surface.
    #[must_use]
    pub fn profiles(&self) -> &Arc<dyn ProfileStore> {
        &self.profiles
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Snapshot of every live session.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        self.registry.snapshot().iter().map(|s| s.info()).collect()
    }

    /// Admit, materialize, launch, and register a session.
    ///
    /// # Errors
    ///
    /// - `AppError::Validation` for a blank channel name.
    /// - `AppError::WorkersLimit` / `AppError::ChannelExists` on rejection.
    /// - `AppError::GraphNotFound` / `AppError::Template` if materialization
    ///   fails.
    /// - `AppError::Credential` if the subscriber token cannot be issued.
    /// - `AppError::WorkerLaunch` if the worker does not start.
    ///
    /// No registry entry remains after any error.
    pub async fn start(&self, request: StartRequest) -> Result<SessionInfo> {
        let span = info_span!(
            "start_session",
            channel = %request.channel_name,
            request_id = %request.request_id
        );
        self.start_inner(request).instrument(span).await
    }

    async fn start_inner(&self, mut request: StartRequest) -> Result<SessionInfo> {
        request.validate()?;
        let channel = request.channel_name.clone();

        self.admission
            .admit(&channel)
            .into_result(&channel, self.admission.max_sessions())?;
        let reservation = Reservation::new(&self.registry, &channel);

        self.prepare_request(&mut request)?;
        request.worker_http_server_port = self.ports.allocate(&self.registry)?;

        let materialized = self.materializer.materialize(&request).await?;
        let launch = LaunchSpec {
            channel_name: channel.clone(),
            config_path: materialized.config_path,
            log_path: materialized.log_path,
            callback_port: request.worker_http_server_port,
        };

        let handle = match self.worker.launch(&launch).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(%err, "worker launch failed, rolling back");
                if let Err(rm_err) = tokio::fs::remove_file(&launch.config_path).await {
                    warn!(
                        %rm_err,
                        path = %launch.config_path.display(),
                        "failed to remove session config"
                    );
                }
                return Err(err);
            }
        };

        let session = Arc::new(Session::new(
            &launch,
            materialized.graph_name,
            handle,
            self.settings.quit_timeout,
            unix_now(),
        ));
        if !self.registry.promote(Arc::clone(&session)) {
            return Err(AppError::WorkerLaunch(format!(
                "reservation for `{channel}` disappeared during launch"
            )));
        }
        reservation.commit();

        info!(
            running = self.registry.len(),
            port = session.http_port(),
            graph = session.graph_name(),
            "session started"
        );
        Ok(session.info())
    }

    /// Seed defaults from the customer profile and issue the subscriber token.
    fn prepare_request(&self, request: &mut StartRequest) -> Result<()> {
        if let Some(profile) = self.profiles.lookup(&request.customer_id) {
            if let Some(template) = &self.settings.prompt_template {
                request.prompt = render_prompt(template, &profile);
            }
            if request.voice_type.is_empty() {
                if let Some(voice) = infer_voice_type(&profile) {
                    request.voice_type = voice.to_owned();
                }
            }
        }

        request.token = self.credentials.issue_token(
            &request.channel_name,
            0,
            TokenRole::Subscriber,
            self.settings.token_expiration_seconds,
        )?;
        Ok(())
    }

    fn running(&self, channel_name: &str) -> Result<Arc<Session>> {
        require_channel(channel_name)?;
        self.registry
            .get(channel_name)
            .filter(|s| s.state() == SessionState::Running)
            .ok_or_else(|| AppError::ChannelNotFound(channel_name.to_owned()))
    }

    /// Record a heartbeat at `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelNotFound` unless the channel is running.
    pub fn ping(&self, channel_name: &str, now: i64) -> Result<SessionInfo> {
        let session = self.running(channel_name)?;
        session.touch(now);
        Ok(session.info())
    }

    /// Stop a session, escalating to forced termination after the grace
    /// period, then remove it.
    ///
    /// # Errors
    ///
    /// - `AppError::ChannelNotFound` if the channel has no live session.
    /// - `AppError::ChannelBusy` if another stop is in progress.
    /// - `AppError::WorkerCommand` if the stop signal cannot be delivered;
    ///   the session stays `Running` so the stop can be retried.
    pub async fn stop(&self, channel_name: &str) -> Result<()> {
        let span = info_span!("stop_session", channel = channel_name);
        self.stop_inner(channel_name).instrument(span).await
    }

    async fn stop_inner(&self, channel_name: &str) -> Result<()> {
        require_channel(channel_name)?;
        let session = self
            .registry
            .get(channel_name)
            .ok_or_else(|| AppError::ChannelNotFound(channel_name.to_owned()))?;
        if !session.begin_stop() {
            return Err(AppError::ChannelBusy(format!(
                "stop already in progress for `{channel_name}`"
            )));
        }

        // Teardown outlives a dropped caller; the entry never stays `Stopping`.
        let teardown = tokio::spawn(
            teardown_session(
                Arc::clone(&self.worker),
                Arc::clone(&self.registry),
                session,
            )
            .instrument(Span::current()),
        );
        teardown.await.map_err(|err| {
            AppError::WorkerCommand(format!("stop task for `{channel_name}` failed: {err}"))
        })?
    }

    /// Forward a command to a running worker. Not retried on failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelNotFound` unless the channel is running, or
    /// `AppError::WorkerCommand` if delivery fails.
    pub async fn update(&self, channel_name: &str, command: &WorkerCommand) -> Result<()> {
        let session = self.running(channel_name)?;
        let target = session
            .worker()
            .lock()
            .await
            .as_ref()
            .map(|h| WorkerHandle::detached(h.callback_port(), h.pid()))
            .ok_or_else(|| AppError::ChannelNotFound(channel_name.to_owned()))?;

        self.worker
            .send_command(&target, command)
            .await
            .inspect_err(|err| {
                warn!(
                    channel = channel_name,
                    command = %command.rte.name,
                    %err,
                    "worker update failed"
                );
            })?;
        info!(channel = channel_name, command = %command.rte.name, "worker updated");
        Ok(())
    }

    /// Stop every live session concurrently; used on shutdown.
    ///
    /// Returns the number of sessions that failed to stop.
    pub async fn stop_all(&self) -> usize {
        let sessions = self.registry.snapshot();
        let results = join_all(sessions.iter().map(|s| self.stop(s.channel_name()))).await;
        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            warn!(failures, "some sessions failed to stop");
        }
        failures
    }
}

/// Signal, wait, escalate, then remove the registry entry.
///
/// A failed signal puts the handle back and returns the session to
/// `Running` so the stop can be retried.
async fn teardown_session(
    worker: Arc<dyn WorkerDriver>,
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
) -> Result<()> {
    let taken = session.worker().lock().await.take();
    if let Some(mut handle) = taken {
        if let Err(err) = worker.signal_stop(&mut handle).await {
            warn!(%err, "stop signal failed, session kept");
            *session.worker().lock().await = Some(handle);
            session.abort_stop();
            return Err(err);
        }
        await_shutdown(worker.as_ref(), &mut handle, session.quit_timeout()).await;
    } else {
        warn!("session had no worker handle");
    }

    registry.remove(session.channel_name());
    info!(running = registry.len(), "session stopped");
    Ok(())
}

/// Wait for a signalled worker, forcing it down after `grace`.
async fn await_shutdown(worker: &dyn WorkerDriver, handle: &mut WorkerHandle, grace: Duration) {
    match tokio::time::timeout(grace, worker.wait_exit(handle)).await {
        Ok(Ok(())) => {
            info!("worker exited gracefully");
            return;
        }
        Ok(Err(err)) => {
            warn!(%err, "error waiting for worker, forcing termination");
        }
        Err(_) => {
            warn!(?grace, "worker did not exit within grace period, forcing termination");
        }
    }

    match tokio::time::timeout(grace, worker.force_terminate(handle)).await {
        Ok(Ok(())) => info!("worker force-terminated"),
        Ok(Err(err)) => warn!(%err, "forced termination failed"),
        Err(_) => warn!("forced termination timed out, abandoning worker handle"),
    }
}
