//! Out-of-band stall detection
//!
//! The watcher runs in its own OS process and samples the user-mode CPU time
//! of the monitored process. When the rounded CPU delta over one sampling
//! window falls below the threshold, the monitored process is sent SIGTERM
//! and the watcher exits.
//!
//! A process blocked on network or disk I/O accrues almost no CPU time and is
//! treated as stalled too. This heuristic is kept as is: it detects "no
//! progress", not "no I/O".

mod process;
mod sampler;

pub use process::{current_program, watch_args, SignalTerminator, WatcherProcess};
pub use sampler::ProcCpuTimes;

use crate::config::StallWatcherConfig;
use crate::error::{HealthError, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One reading of a process's accumulated user CPU time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimeSample {
    pub timestamp: DateTime<Utc>,
    pub user_cpu_seconds: f64,
}

/// Reads accumulated user CPU time of a process
pub trait CpuTimeSource {
    /// Fails with `ProcessIntrospection` once the process is gone
    fn sample(&mut self, pid: u32) -> Result<CpuTimeSample>;
}

/// Delivers the termination signal
pub trait ProcessTerminator {
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// Blocking sleep, replaceable with a virtual clock in tests
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Timing parameters of the sampling loop
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSettings {
    pub grace: Duration,
    pub interval: Duration,
    pub threshold_secs: f64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            interval: Duration::from_secs(10),
            threshold_secs: 1.0,
        }
    }
}

impl From<&StallWatcherConfig> for WatchSettings {
    fn from(config: &StallWatcherConfig) -> Self {
        Self {
            grace: config.grace(),
            interval: config.interval(),
            threshold_secs: config.threshold_secs,
        }
    }
}

/// How the watcher loop ended
#[derive(Debug)]
pub enum WatchOutcome {
    /// The monitored process was already gone; nothing was signalled
    TargetExited,
    /// A stall was detected and SIGTERM delivered
    Terminated { delta_secs: f64 },
    /// A stall was detected but the signal could not be delivered
    SignalFailed(HealthError),
}

/// Rounded CPU progress between two samples (round half to even)
pub fn cpu_delta(last: &CpuTimeSample, new: &CpuTimeSample) -> f64 {
    (new.user_cpu_seconds - last.user_cpu_seconds).abs().round_ties_even()
}

/// Sampling loop state, owned by the watcher process alone
pub struct StallWatcher<S, T, Z> {
    pid: u32,
    settings: WatchSettings,
    source: S,
    terminator: T,
    sleeper: Z,
}

impl<S, T, Z> StallWatcher<S, T, Z>
where
    S: CpuTimeSource,
    T: ProcessTerminator,
    Z: Sleeper,
{
    pub fn new(pid: u32, settings: WatchSettings, source: S, terminator: T, sleeper: Z) -> Self {
        Self {
            pid,
            settings,
            source,
            terminator,
            sleeper,
        }
    }

    /// Run until a stall is handled or the monitored process disappears
    pub fn run(mut self) -> WatchOutcome {
        info!(
            "Watching process {} (grace {:?}, interval {:?}, threshold {}s)",
            self.pid, self.settings.grace, self.settings.interval, self.settings.threshold_secs
        );

        let mut last = match self.source.sample(self.pid) {
            Ok(sample) => sample,
            Err(e) => return self.target_gone(e),
        };
        self.sleeper.sleep(self.settings.grace);

        loop {
            let new = match self.source.sample(self.pid) {
                Ok(sample) => sample,
                Err(e) => return self.target_gone(e),
            };

            let delta = cpu_delta(&last, &new);
            debug!("Process {} used {}s of CPU since last sample", self.pid, delta);

            if delta < self.settings.threshold_secs {
                return self.handle_stall(delta);
            }

            last = new;
            self.sleeper.sleep(self.settings.interval);
        }
    }

    fn handle_stall(&self, delta: f64) -> WatchOutcome {
        warn!(
            "Process {} stalled ({}s CPU over the last window), sending SIGTERM",
            self.pid, delta
        );

        match self.terminator.terminate(self.pid) {
            Ok(()) => WatchOutcome::Terminated { delta_secs: delta },
            Err(e) => {
                error!("{}", e);
                WatchOutcome::SignalFailed(e)
            }
        }
    }

    fn target_gone(&self, e: HealthError) -> WatchOutcome {
        if e.is_expected_exit() {
            info!("Monitored process {} has exited; watcher stopping", self.pid);
        } else {
            warn!("Cannot sample process {}: {}; watcher stopping", self.pid, e);
        }
        WatchOutcome::TargetExited
    }
}
