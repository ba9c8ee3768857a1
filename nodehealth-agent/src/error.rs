//! Error types shared by every node-health component
//!
//! Loop-internal failures (queue insertion, signal delivery) are logged by the
//! loops that hit them; only construction-time errors reach the caller.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HealthError>;

#[derive(Debug, Error)]
pub enum HealthError {
    /// Invalid settings detected at startup
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// OS identity or release metadata could not be read
    #[error("failed to read platform identity ({what}): {source}")]
    PlatformRead {
        what: String,
        #[source]
        source: io::Error,
    },

    /// The monitored process is gone (or already a zombie)
    #[error("process {pid} cannot be sampled: {reason}")]
    ProcessIntrospection { pid: u32, reason: String },

    #[error("failed to deliver termination signal to process {pid}: {reason}")]
    SignalDelivery { pid: u32, reason: String },

    #[error("outbound queue rejected event: {0}")]
    QueueInsertion(String),

    /// Remediation refused by the rate limiter
    #[error("reboot suppressed: {0}")]
    RebootSuppressed(String),

    #[error("reboot failed: {0}")]
    RebootFailed(String),

    #[error("failed to launch stall watcher process: {0}")]
    WatcherLaunch(#[source] io::Error),
}

impl HealthError {
    /// True for failures that loops treat as expected exits rather than faults
    pub fn is_expected_exit(&self) -> bool {
        matches!(self, HealthError::ProcessIntrospection { .. })
    }
}
