//! Node health agent for camera nodes
//!
//! Keeps a node honest about its own health:
//! - Periodic heartbeat events pushed into the outbound queue
//! - Stall detection from a separate watcher process sampling CPU time
//! - Platform classification gating automated reboot

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod monitor;
pub mod platform;
pub mod remediation;
pub mod watcher;

pub use config::NodeConfig;
pub use error::{HealthError, Result};
pub use heartbeat::{HeartbeatEmitter, HeartbeatEvent, OutboundQueue, SendQueue, TinyImage};
pub use monitor::{HealthMonitor, NodeIdentity};
pub use platform::{classify, PlatformKind};
pub use remediation::{maybe_reboot, RateLimitedRebooter, Rebooter, RemediationOutcome};
pub use watcher::{StallWatcher, WatchOutcome, WatchSettings};
