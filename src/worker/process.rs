//! Worker driver backed by local child processes.
//!
//! Each worker runs `<command> <args...> --property <config_path>` in its
//! own process group with stdout and stderr appended to the session log.
//! Graceful stop sends `SIGTERM` to the group; forced termination sends
//! `SIGKILL`. Control commands are posted as JSON to
//! `http://127.0.0.1:<callback_port>/cmd`.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use super::{DriverFuture, LaunchSpec, WorkerDriver, WorkerHandle};
use crate::config::WorkerConfig;
use crate::models::command::WorkerCommand;
use crate::{AppError, Result};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawns pipeline workers as child processes.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    command: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    http: reqwest::Client,
}

impl ProcessWorker {
    /// Build a driver from the worker configuration.
    #[must_use]
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            current_dir: config.current_dir.clone(),
            http: reqwest::Client::builder()
                .timeout(COMMAND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn spawn(&self, spec: &LaunchSpec) -> Result<WorkerHandle> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)
            .map_err(|err| {
                AppError::WorkerLaunch(format!(
                    "cannot open log {}: {err}",
                    spec.log_path.display()
                ))
            })?;
        let log_err = log
            .try_clone()
            .map_err(|err| AppError::WorkerLaunch(format!("cannot share log handle: {err}")))?;

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg("--property")
            .arg(&spec.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|err| AppError::WorkerLaunch(format!("failed to spawn worker: {err}")))?;

        info!(
            channel = %spec.channel_name,
            pid = child.id().unwrap_or(0),
            port = spec.callback_port,
            config_path = %spec.config_path.display(),
            "worker process spawned"
        );

        Ok(WorkerHandle::from_child(child, spec.callback_port))
    }

    async fn post_command(&self, port: u16, command: &WorkerCommand) -> Result<()> {
        let url = format!("http://127.0.0.1:{port}/cmd");
        let response = self
            .http
            .post(&url)
            .json(command)
            .send()
            .await
            .map_err(|err| AppError::WorkerCommand(format!("post {url} failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::WorkerCommand(format!(
                "worker rejected `{}` with status {status}",
                command.rte.name
            )))
        }
    }
}

/// Deliver a signal to the worker's process group; a vanished group is fine.
#[cfg(unix)]
fn signal_group(handle: &WorkerHandle, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = handle.pid() else {
        return Ok(());
    };
    let raw = i32::try_from(pid)
        .map_err(|_| AppError::WorkerCommand(format!("pid {pid} out of range")))?;
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(AppError::WorkerCommand(format!(
            "failed to send {signal} to worker group {pid}: {err}"
        ))),
    }
}

impl WorkerDriver for ProcessWorker {
    fn launch<'a>(&'a self, spec: &'a LaunchSpec) -> DriverFuture<'a, WorkerHandle> {
        Box::pin(self.spawn(spec))
    }

    fn signal_stop<'a>(&'a self, handle: &'a mut WorkerHandle) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            #[cfg(unix)]
            {
                signal_group(handle, nix::sys::signal::Signal::SIGTERM)
            }
            #[cfg(not(unix))]
            {
                match handle.child_mut() {
                    Some(child) => child
                        .start_kill()
                        .map_err(|err| AppError::WorkerCommand(format!("stop failed: {err}"))),
                    None => Ok(()),
                }
            }
        })
    }

    fn wait_exit<'a>(&'a self, handle: &'a mut WorkerHandle) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let pid = handle.pid();
            let Some(child) = handle.child_mut() else {
                return Ok(());
            };
            let status = child
                .wait()
                .await
                .map_err(|err| AppError::WorkerCommand(format!("wait failed: {err}")))?;
            info!(pid, ?status, "worker process exited");
            Ok(())
        })
    }

    fn force_terminate<'a>(&'a self, handle: &'a mut WorkerHandle) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            #[cfg(unix)]
            if let Err(err) = signal_group(handle, nix::sys::signal::Signal::SIGKILL) {
                warn!(%err, "group kill failed, killing direct child");
            }
            if let Some(child) = handle.child_mut() {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    return Ok(());
                }
                child
                    .kill()
                    .await
                    .map_err(|err| AppError::WorkerCommand(format!("kill failed: {err}")))?;
            }
            Ok(())
        })
    }

    fn send_command<'a>(
        &'a self,
        handle: &'a WorkerHandle,
        command: &'a WorkerCommand,
    ) -> DriverFuture<'a, ()> {
        Box::pin(self.post_command(handle.callback_port(), command))
    }
}
