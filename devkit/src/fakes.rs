/*!
Fakes for the privileged and time-dependent capabilities
*/

use chrono::{Duration as ChronoDuration, Utc};
use nodehealth_agent::error::{HealthError, Result};
use nodehealth_agent::platform::HostIdentity;
use nodehealth_agent::remediation::{Rebooter, UptimeSource};
use nodehealth_agent::watcher::{CpuTimeSample, CpuTimeSource, ProcessTerminator, Sleeper};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// CPU-time source replaying a fixed script of readings
///
/// `None` entries, and any read past the end of the script, behave like a
/// process that has exited.
pub struct ScriptedCpuTimes {
    script: VecDeque<Option<f64>>,
    reads: Arc<AtomicUsize>,
    clock: chrono::DateTime<Utc>,
    step: ChronoDuration,
}

impl ScriptedCpuTimes {
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        Self::with_gaps(readings.into_iter().map(Some))
    }

    pub fn with_gaps(readings: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            script: readings.into_iter().collect(),
            reads: Arc::new(AtomicUsize::new(0)),
            clock: Utc::now(),
            step: ChronoDuration::seconds(10),
        }
    }

    /// A process that is already gone
    pub fn exited() -> Self {
        Self::with_gaps(std::iter::empty())
    }

    /// Shared counter of sample calls
    pub fn reads(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

impl CpuTimeSource for ScriptedCpuTimes {
    fn sample(&mut self, pid: u32) -> Result<CpuTimeSample> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front().flatten() {
            Some(user_cpu_seconds) => {
                let timestamp = self.clock;
                self.clock += self.step;
                Ok(CpuTimeSample { timestamp, user_cpu_seconds })
            }
            None => Err(HealthError::ProcessIntrospection {
                pid,
                reason: "[MOCK] no such process".into(),
            }),
        }
    }
}

/// Terminator that records every signal instead of sending it
#[derive(Clone, Default)]
pub struct RecordingTerminator {
    signalled: Arc<Mutex<Vec<u32>>>,
    deny: bool,
}

impl RecordingTerminator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminator failing like an unprivileged kill
    pub fn denying() -> Self {
        Self { deny: true, ..Self::default() }
    }

    pub fn signalled(&self) -> Vec<u32> {
        self.signalled.lock().clone()
    }
}

impl ProcessTerminator for RecordingTerminator {
    fn terminate(&self, pid: u32) -> Result<()> {
        self.signalled.lock().push(pid);
        if self.deny {
            return Err(HealthError::SignalDelivery {
                pid,
                reason: "[MOCK] operation not permitted".into(),
            });
        }
        Ok(())
    }
}

/// Sleeper that records requested durations and returns immediately
#[derive(Clone, Default)]
pub struct VirtualSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl VirtualSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Sleeper for VirtualSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

/// Rebooter counting invocations
#[derive(Clone, Default)]
pub struct CountingRebooter {
    calls: Arc<AtomicUsize>,
}

impl CountingRebooter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Rebooter for CountingRebooter {
    fn reboot(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::info!("[MOCK] reboot #{}", self.calls());
        Ok(())
    }
}

/// Uptime that never changes
pub struct FixedUptime(pub Duration);

impl UptimeSource for FixedUptime {
    fn uptime(&self) -> Duration {
        self.0
    }
}

/// Host identity from literal strings; a `None` release file is unreadable
pub struct StaticHost {
    pub family: String,
    pub release: Option<String>,
}

impl StaticHost {
    pub fn linux(release: &str) -> Self {
        Self { family: "Linux".into(), release: Some(release.into()) }
    }

    pub fn family(family: &str) -> Self {
        Self { family: family.into(), release: None }
    }
}

impl HostIdentity for StaticHost {
    fn os_family(&self) -> Result<String> {
        Ok(self.family.clone())
    }

    fn release_metadata(&self) -> Result<String> {
        self.release.clone().ok_or_else(|| HealthError::PlatformRead {
            what: "/etc/os-release".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "[MOCK] missing"),
        })
    }
}
