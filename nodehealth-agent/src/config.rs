//! Node configuration
//!
//! Handles:
//! - Node identity (name reported in heartbeats)
//! - Heartbeat interval and outbound queue bound
//! - Stall watcher timings
//! - Remediation rate limits and ledger location
//!
//! Settings live in a TOML file; a missing file means defaults.

use crate::error::{HealthError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "NODEHEALTH_CONFIG";

/// Longest heartbeat or watcher period accepted (one week)
pub const MAX_PERIOD_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub heartbeat: HeartbeatConfig,
    pub stall_watcher: StallWatcherConfig,
    pub remediation: RemediationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Seconds between heartbeats; 0 disables the emitter
    pub interval_secs: f64,
    /// Max pending events in the default queue (0 = unbounded)
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StallWatcherConfig {
    pub enabled: bool,
    pub grace_secs: f64,
    pub interval_secs: f64,
    pub threshold_secs: f64,
    /// Executable hosting the `watch` subcommand; current executable if unset
    pub program: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    pub min_uptime_secs: u64,
    pub max_reboots: u32,
    pub window_secs: u64,
    pub ledger_path: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSection::default(),
            heartbeat: HeartbeatConfig::default(),
            stall_watcher: StallWatcherConfig::default(),
            remediation: RemediationConfig::default(),
        }
    }
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "nodehealth".to_string()),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 0.0,
            queue_capacity: 1024,
        }
    }
}

impl Default for StallWatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_secs: 10.0,
            interval_secs: 10.0,
            threshold_secs: 1.0,
            program: None,
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            min_uptime_secs: 600,
            max_reboots: 3,
            window_secs: 24 * 60 * 60,
            ledger_path: None,
        }
    }
}

impl HeartbeatConfig {
    /// Heartbeat period, or `None` when the emitter is disabled
    pub fn period(&self) -> Option<Duration> {
        if self.interval_secs > 0.0 {
            Duration::try_from_secs_f64(self.interval_secs).ok()
        } else {
            None
        }
    }
}

impl StallWatcherConfig {
    /// Timings the sampling loop can act on: a zero, negative or NaN
    /// threshold would never detect a stall
    pub fn validate(&self) -> Result<()> {
        if !self.grace_secs.is_finite() || self.grace_secs < 0.0 || self.grace_secs > MAX_PERIOD_SECS {
            return Err(HealthError::Configuration(format!(
                "stall watcher grace period must be between 0 and {} seconds, got {}",
                MAX_PERIOD_SECS, self.grace_secs
            )));
        }
        if !self.interval_secs.is_finite() || self.interval_secs <= 0.0 || self.interval_secs > MAX_PERIOD_SECS {
            return Err(HealthError::Configuration(format!(
                "stall watcher interval must be positive and at most {} seconds, got {}",
                MAX_PERIOD_SECS, self.interval_secs
            )));
        }
        if !self.threshold_secs.is_finite() || self.threshold_secs <= 0.0 {
            return Err(HealthError::Configuration(format!(
                "stall threshold must be positive, got {}",
                self.threshold_secs
            )));
        }
        Ok(())
    }

    pub fn grace(&self) -> Duration {
        Duration::try_from_secs_f64(self.grace_secs).unwrap_or(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs).unwrap_or(Duration::ZERO)
    }
}

impl RemediationConfig {
    /// Ledger file, defaulting to the OS data directory
    pub fn ledger_file(&self) -> Option<PathBuf> {
        self.ledger_path.clone().or_else(|| {
            dirs::data_local_dir().map(|mut p| {
                p.push("nodehealth");
                p.push("reboots.json");
                p
            })
        })
    }
}

impl NodeConfig {
    /// Load config from `path`, then `$NODEHEALTH_CONFIG`, then the OS config dir
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::config_file_path(),
        };

        let config = match config_path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(&p).map_err(|e| {
                    HealthError::Configuration(format!("cannot read {}: {}", p.display(), e))
                })?;
                Self::from_toml(&content)?
            }
            Some(p) if path.is_some() => {
                return Err(HealthError::Configuration(format!(
                    "config file {} does not exist",
                    p.display()
                )));
            }
            _ => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HealthError::Configuration(e.to_string()))
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Option<PathBuf> {
        if let Ok(p) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(p));
        }

        let mut path = dirs::config_dir()?;
        path.push("nodehealth");
        path.push("config.toml");
        Some(path)
    }

    /// Reject settings that cannot produce a working monitor
    pub fn validate(&self) -> Result<()> {
        if self.node.name.trim().is_empty() {
            return Err(HealthError::Configuration("node name must not be empty".into()));
        }

        let interval = self.heartbeat.interval_secs;
        if !interval.is_finite() || interval < 0.0 || interval > MAX_PERIOD_SECS {
            return Err(HealthError::Configuration(format!(
                "heartbeat interval must be between 0 and {} seconds, got {}",
                MAX_PERIOD_SECS, interval
            )));
        }

        self.stall_watcher.validate()?;

        if self.remediation.window_secs == 0 {
            return Err(HealthError::Configuration("reboot window must be positive".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.heartbeat.period().is_none());
        assert_eq!(config.stall_watcher.interval(), Duration::from_secs(10));
        assert_eq!(config.stall_watcher.threshold_secs, 1.0);
    }

    #[test]
    fn test_negative_heartbeat_is_rejected() {
        let mut config = NodeConfig::default();
        config.heartbeat.interval_secs = -2.0;
        assert!(matches!(config.validate(), Err(HealthError::Configuration(_))));

        config.heartbeat.interval_secs = f64::NAN;
        assert!(matches!(config.validate(), Err(HealthError::Configuration(_))));
    }

    #[test]
    fn test_out_of_range_heartbeat_is_rejected() {
        let mut config = NodeConfig::default();
        config.heartbeat.interval_secs = 1.0e19;
        assert!(matches!(config.validate(), Err(HealthError::Configuration(_))));

        config.heartbeat.interval_secs = MAX_PERIOD_SECS + 1.0;
        assert!(config.validate().is_err());

        config.heartbeat.interval_secs = MAX_PERIOD_SECS;
        assert!(config.validate().is_ok());
        assert!(config.heartbeat.period().is_some());
    }

    #[test]
    fn test_watcher_timings_are_checked() {
        for threshold in [0.0, -1.0, f64::NAN] {
            let watcher = StallWatcherConfig { threshold_secs: threshold, ..StallWatcherConfig::default() };
            assert!(matches!(watcher.validate(), Err(HealthError::Configuration(_))));
        }

        let watcher = StallWatcherConfig { interval_secs: 1.0e19, ..StallWatcherConfig::default() };
        assert!(watcher.validate().is_err());

        let watcher = StallWatcherConfig { grace_secs: 0.0, ..StallWatcherConfig::default() };
        assert!(watcher.validate().is_ok());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut config = NodeConfig::default();
        config.node.name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            [node]
            name = "jeffcam"

            [heartbeat]
            interval_secs = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(config.node.name, "jeffcam");
        assert_eq!(config.heartbeat.period(), Some(Duration::from_millis(2500)));
        assert!(config.stall_watcher.enabled);
        assert_eq!(config.remediation.max_reboots, 3);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[stall_watcher]\ninterval_secs = 5.0\nthreshold_secs = 0.5").unwrap();

        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.stall_watcher.interval(), Duration::from_secs(5));
        assert_eq!(config.stall_watcher.threshold_secs, 0.5);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(NodeConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = NodeConfig::from_toml("[heartbeat]\ninterval_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, HealthError::Configuration(_)));
    }
}
