/*!
Test harness for the stall watcher

Runs a `StallWatcher` against scripted CPU readings with virtual time and
collects what it did: signals sent, sleeps requested, samples taken.
*/

use crate::fakes::{RecordingTerminator, ScriptedCpuTimes, VirtualSleeper};
use anyhow::Result;
use nodehealth_agent::watcher::{StallWatcher, WatchOutcome, WatchSettings};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Everything observed during one watcher run
#[derive(Debug)]
pub struct WatchReport {
    pub outcome: WatchOutcome,
    pub signalled: Vec<u32>,
    pub sleeps: Vec<Duration>,
    pub samples_taken: usize,
}

pub struct WatcherHarness {
    pid: u32,
    settings: WatchSettings,
    source: ScriptedCpuTimes,
    terminator: RecordingTerminator,
}

impl WatcherHarness {
    /// Harness with default timings (10s grace, 10s interval, 1s threshold)
    pub fn new(pid: u32, source: ScriptedCpuTimes) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        Self {
            pid,
            settings: WatchSettings::default(),
            source,
            terminator: RecordingTerminator::new(),
        }
    }

    pub fn with_settings(mut self, settings: WatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_terminator(mut self, terminator: RecordingTerminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn run(self) -> WatchReport {
        let reads = self.source.reads();
        let sleeper = VirtualSleeper::new();
        let terminator = self.terminator.clone();

        let outcome =
            StallWatcher::new(self.pid, self.settings, self.source, self.terminator, sleeper.clone())
                .run();

        WatchReport {
            outcome,
            signalled: terminator.signalled(),
            sleeps: sleeper.slept(),
            samples_taken: reads.load(Ordering::SeqCst),
        }
    }
}

impl WatchReport {
    /// Exactly one signal, to `pid`, and a terminated outcome
    pub fn assert_terminated_once(&self, pid: u32) -> Result<()> {
        if self.signalled != vec![pid] {
            anyhow::bail!("expected exactly one signal to {}, got {:?}", pid, self.signalled);
        }
        if !matches!(self.outcome, WatchOutcome::Terminated { .. }) {
            anyhow::bail!("expected Terminated outcome, got {:?}", self.outcome);
        }
        Ok(())
    }

    /// No signal at all
    pub fn assert_not_signalled(&self) -> Result<()> {
        if !self.signalled.is_empty() {
            anyhow::bail!("expected no signal, got {:?}", self.signalled);
        }
        Ok(())
    }
}
