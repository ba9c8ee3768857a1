//! Watcher process launch and signal delivery

use super::{ProcessTerminator, WatchSettings};
use crate::error::{HealthError, Result};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

/// Sends SIGTERM to the monitored process
pub struct SignalTerminator;

impl ProcessTerminator for SignalTerminator {
    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| HealthError::SignalDelivery {
            pid,
            reason: "pid out of range".to_string(),
        })?;

        kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|e| HealthError::SignalDelivery {
            pid,
            reason: e.desc().to_string(),
        })?;

        info!("Sent SIGTERM to process {}", pid);
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: u32) -> Result<()> {
        Err(HealthError::SignalDelivery {
            pid,
            reason: "signals are not supported on this platform".to_string(),
        })
    }
}

/// Stall watcher running as a separate OS process
pub struct WatcherProcess {
    child: Child,
    target: u32,
}

impl WatcherProcess {
    /// Start `program watch --pid <pid> ...` as a child process
    pub fn spawn(program: &Path, pid: u32, settings: &WatchSettings) -> Result<Self> {
        let child = Command::new(program)
            .args(watch_args(pid, settings))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(HealthError::WatcherLaunch)?;

        info!("Stall watcher started as process {} for process {}", child.id(), pid);
        Ok(Self { child, target: pid })
    }

    /// Re-run the current executable as watcher
    pub fn spawn_current_exe(pid: u32, settings: &WatchSettings) -> Result<Self> {
        let program = current_program()?;
        Self::spawn(&program, pid, settings)
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// True while the watcher process has not exited
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the watcher so a deliberate shutdown is not taken for a stall
    pub fn stop(mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!("Failed to stop stall watcher {}: {}", self.child.id(), e);
        }
        match self.child.wait() {
            Ok(status) => debug!("Stall watcher {} stopped ({})", self.child.id(), status),
            Err(e) => warn!("Failed to reap stall watcher {}: {}", self.child.id(), e),
        }
    }
}

pub fn current_program() -> Result<PathBuf> {
    std::env::current_exe().map_err(HealthError::WatcherLaunch)
}

/// Command line understood by the `watch` subcommand
pub fn watch_args(pid: u32, settings: &WatchSettings) -> Vec<String> {
    vec![
        "watch".to_string(),
        "--pid".to_string(),
        pid.to_string(),
        "--grace-secs".to_string(),
        settings.grace.as_secs_f64().to_string(),
        "--interval-secs".to_string(),
        settings.interval.as_secs_f64().to_string(),
        "--threshold-secs".to_string(),
        settings.threshold_secs.to_string(),
    ]
}
