//! Remediation policy for unhealthy nodes
//!
//! - Platform gate: only Raspberry Pi nodes may be rebooted automatically
//! - Rate limiting decorator guarding any reboot capability against boot loops
//! - Persistent reboot ledger so history survives the reboot itself
//!
//! The privileged reboot primitive is not implemented here; callers supply it
//! through [`Rebooter`].

mod ledger;

pub use ledger::RebootLedger;

use crate::config::RemediationConfig;
use crate::error::{HealthError, Result};
use crate::platform::PlatformKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Privileged reboot capability
pub trait Rebooter: Send + Sync {
    fn reboot(&self) -> Result<()>;
}

/// Result of a remediation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "platform", rename_all = "snake_case")]
pub enum RemediationOutcome {
    Rebooted,
    /// Platform does not allow automated reboot
    Skipped(PlatformKind),
}

/// Reboot only when the host is a Raspberry Pi; a no-op everywhere else
pub fn maybe_reboot(kind: PlatformKind, rebooter: &dyn Rebooter) -> Result<RemediationOutcome> {
    if kind != PlatformKind::RPi {
        info!("Reboot skipped: automated remediation not permitted on {}", kind);
        return Ok(RemediationOutcome::Skipped(kind));
    }

    warn!("Remediation requested on {}: rebooting this computer", kind);
    rebooter.reboot()?;
    Ok(RemediationOutcome::Rebooted)
}

/// Stand-in reboot capability that only logs
pub struct LogOnlyRebooter;

impl Rebooter for LogOnlyRebooter {
    fn reboot(&self) -> Result<()> {
        info!("This is a mock reboot.");
        Ok(())
    }
}

/// Host uptime provider
pub trait UptimeSource: Send + Sync {
    fn uptime(&self) -> Duration;
}

/// Uptime of the running host (sysinfo)
pub struct HostUptime;

impl UptimeSource for HostUptime {
    fn uptime(&self) -> Duration {
        Duration::from_secs(sysinfo::System::uptime())
    }
}

/// Limits applied by [`RateLimitedRebooter`]
#[derive(Debug, Clone)]
pub struct RebootLimits {
    pub min_uptime: Duration,
    pub max_reboots: u32,
    pub window: Duration,
}

impl From<&RemediationConfig> for RebootLimits {
    fn from(config: &RemediationConfig) -> Self {
        Self {
            min_uptime: Duration::from_secs(config.min_uptime_secs),
            max_reboots: config.max_reboots,
            window: Duration::from_secs(config.window_secs),
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wraps a reboot capability and refuses reboots that would risk a boot loop
pub struct RateLimitedRebooter<R> {
    inner: R,
    limits: RebootLimits,
    uptime: Box<dyn UptimeSource>,
    ledger: RebootLedger,
    now: Clock,
}

impl<R: Rebooter> RateLimitedRebooter<R> {
    pub fn new(inner: R, limits: RebootLimits, ledger: RebootLedger) -> Self {
        Self {
            inner,
            limits,
            uptime: Box::new(HostUptime),
            ledger,
            now: Box::new(Utc::now),
        }
    }

    pub fn from_config(inner: R, config: &RemediationConfig) -> Self {
        let ledger = match config.ledger_file() {
            Some(path) => RebootLedger::at(path),
            None => RebootLedger::in_memory(),
        };
        Self::new(inner, RebootLimits::from(config), ledger)
    }

    pub fn with_uptime_source(mut self, uptime: impl UptimeSource + 'static) -> Self {
        self.uptime = Box::new(uptime);
        self
    }

    pub fn with_clock(mut self, now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.now = Box::new(now);
        self
    }

    pub fn ledger(&self) -> &RebootLedger {
        &self.ledger
    }

    fn check_limits(&self, now: DateTime<Utc>) -> Result<()> {
        let uptime = self.uptime.uptime();
        if uptime < self.limits.min_uptime {
            return Err(HealthError::RebootSuppressed(format!(
                "host uptime {}s is below the {}s minimum",
                uptime.as_secs(),
                self.limits.min_uptime.as_secs()
            )));
        }

        let window = chrono::Duration::from_std(self.limits.window)
            .map_err(|e| HealthError::RebootSuppressed(format!("invalid reboot window: {}", e)))?;
        let recent = self.ledger.count_since(now - window)?;
        if recent >= self.limits.max_reboots as usize {
            return Err(HealthError::RebootSuppressed(format!(
                "{} reboots already recorded in the last {}s (max {})",
                recent,
                self.limits.window.as_secs(),
                self.limits.max_reboots
            )));
        }

        Ok(())
    }
}

impl<R: Rebooter> Rebooter for RateLimitedRebooter<R> {
    fn reboot(&self) -> Result<()> {
        let now = (self.now)();
        if let Err(e) = self.check_limits(now) {
            warn!("{}", e);
            return Err(e);
        }

        // Recorded first: a successful reboot never returns to write it
        self.ledger.record(now)?;
        self.inner.reboot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Counter(Arc<AtomicUsize>);

    impl Rebooter for Counter {
        fn reboot(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Counter {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct FixedUptime(Duration);

    impl UptimeSource for FixedUptime {
        fn uptime(&self) -> Duration {
            self.0
        }
    }

    fn limits() -> RebootLimits {
        RebootLimits {
            min_uptime: Duration::from_secs(600),
            max_reboots: 2,
            window: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_gate_reboots_only_rpi() {
        let counter = Counter::default();
        assert_eq!(maybe_reboot(PlatformKind::RPi, &counter).unwrap(), RemediationOutcome::Rebooted);
        assert_eq!(counter.count(), 1);

        for kind in [PlatformKind::Mac, PlatformKind::Ubuntu, PlatformKind::Linux, PlatformKind::Unknown] {
            assert_eq!(maybe_reboot(kind, &counter).unwrap(), RemediationOutcome::Skipped(kind));
        }
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_gate_propagates_capability_failure() {
        struct Broken;
        impl Rebooter for Broken {
            fn reboot(&self) -> Result<()> {
                Err(HealthError::RebootFailed("permission denied".into()))
            }
        }

        assert!(matches!(
            maybe_reboot(PlatformKind::RPi, &Broken),
            Err(HealthError::RebootFailed(_))
        ));
    }

    #[test]
    fn test_low_uptime_suppresses_reboot() {
        let counter = Counter::default();
        let rebooter = RateLimitedRebooter::new(counter.clone(), limits(), RebootLedger::in_memory())
            .with_uptime_source(FixedUptime(Duration::from_secs(30)));

        assert!(matches!(rebooter.reboot(), Err(HealthError::RebootSuppressed(_))));
        assert_eq!(counter.count(), 0);
        assert!(rebooter.ledger().entries().unwrap().is_empty());
    }

    #[test]
    fn test_window_limit() {
        let counter = Counter::default();
        let start = Utc::now();
        let rebooter = RateLimitedRebooter::new(counter.clone(), limits(), RebootLedger::in_memory())
            .with_uptime_source(FixedUptime(Duration::from_secs(3600)))
            .with_clock(move || start);

        rebooter.reboot().unwrap();
        rebooter.reboot().unwrap();
        assert!(matches!(rebooter.reboot(), Err(HealthError::RebootSuppressed(_))));
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_old_reboots_fall_out_of_window() {
        let counter = Counter::default();
        let now = Utc::now();
        let ledger = RebootLedger::in_memory();
        ledger.record(now - chrono::Duration::hours(3)).unwrap();
        ledger.record(now - chrono::Duration::hours(2)).unwrap();

        let rebooter = RateLimitedRebooter::new(counter.clone(), limits(), ledger)
            .with_uptime_source(FixedUptime(Duration::from_secs(3600)))
            .with_clock(move || now);

        rebooter.reboot().unwrap();
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_gate_with_rate_limiter_skips_non_rpi_without_recording() {
        let counter = Counter::default();
        let rebooter = RateLimitedRebooter::new(counter.clone(), limits(), RebootLedger::in_memory())
            .with_uptime_source(FixedUptime(Duration::from_secs(3600)));

        maybe_reboot(PlatformKind::Ubuntu, &rebooter).unwrap();
        assert!(rebooter.ledger().entries().unwrap().is_empty());
        assert_eq!(counter.count(), 0);
    }
}
