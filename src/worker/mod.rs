//! External worker capability.
//!
//! The [`WorkerDriver`] trait is the only way the lifecycle driver touches
//! a worker: launch it, ask it to stop, wait for it to exit, force it down,
//! and forward control commands. [`process::ProcessWorker`] implements it
//! with local child processes; tests substitute an in-memory fake.

pub mod process;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::process::Child;

use crate::models::command::WorkerCommand;
use crate::Result;

/// Boxed future returned by [`WorkerDriver`] methods.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Everything a worker needs to start serving a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Channel the worker serves.
    pub channel_name: String,
    /// Materialized property document.
    pub config_path: PathBuf,
    /// File receiving the worker's output.
    pub log_path: PathBuf,
    /// Port the worker listens on for control commands.
    pub callback_port: u16,
}

/// Exclusive ownership of one launched worker.
///
/// Owned by exactly one session record. When it wraps a local child
/// process, dropping the handle kills the process.
#[derive(Debug)]
pub struct WorkerHandle {
    callback_port: u16,
    pid: Option<u32>,
    child: Option<Child>,
}

impl WorkerHandle {
    /// Handle for a local child process.
    #[must_use]
    pub fn from_child(child: Child, callback_port: u16) -> Self {
        Self {
            callback_port,
            pid: child.id(),
            child: Some(child),
        }
    }

    /// Handle for a worker that is not a local child of this process.
    #[must_use]
    pub fn detached(callback_port: u16, pid: Option<u32>) -> Self {
        Self {
            callback_port,
            pid,
            child: None,
        }
    }

    /// Port the worker accepts commands on.
    #[must_use]
    pub fn callback_port(&self) -> u16 {
        self.callback_port
    }

    /// OS process id, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The local child process, if any.
    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }
}

/// Capability interface over external pipeline workers.
pub trait WorkerDriver: Send + Sync {
    /// Start a worker bound to the given configuration and callback port.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WorkerLaunch`](crate::AppError::WorkerLaunch) if
    /// the worker cannot be started.
    fn launch<'a>(&'a self, spec: &'a LaunchSpec) -> DriverFuture<'a, WorkerHandle>;

    /// Ask the worker to shut down gracefully. Must not block on exit.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WorkerCommand`](crate::AppError::WorkerCommand) if
    /// the signal cannot be delivered.
    fn signal_stop<'a>(&'a self, handle: &'a mut WorkerHandle) -> DriverFuture<'a, ()>;

    /// Resolve once the worker has exited.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WorkerCommand`](crate::AppError::WorkerCommand) if
    /// the exit status cannot be observed.
    fn wait_exit<'a>(&'a self, handle: &'a mut WorkerHandle) -> DriverFuture<'a, ()>;

    /// Terminate the worker without waiting for cooperation.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WorkerCommand`](crate::AppError::WorkerCommand) if
    /// the kill fails.
    fn force_terminate<'a>(&'a self, handle: &'a mut WorkerHandle) -> DriverFuture<'a, ()>;

    /// Forward a structured command over the worker's control channel.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WorkerCommand`](crate::AppError::WorkerCommand) if
    /// delivery fails or the worker rejects the command.
    fn send_command<'a>(
        &'a self,
        handle: &'a WorkerHandle,
        command: &'a WorkerCommand,
    ) -> DriverFuture<'a, ()>;
}
