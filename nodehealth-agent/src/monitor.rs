//! Composition root of the node-health subsystem
//!
//! Owns node identity and settings, classifies the platform once, starts the
//! heartbeat emitter and the isolated stall watcher, and exposes remediation
//! to callers.

use crate::config::NodeConfig;
use crate::error::Result;
use crate::heartbeat::{EmitterHandle, HeartbeatEmitter, OutboundQueue};
use crate::platform::{self, PlatformKind};
use crate::remediation::{self, Rebooter, RemediationOutcome};
use crate::watcher::{WatchSettings, WatcherProcess};
use std::sync::Arc;
use tracing::{info, warn};

/// Name under which the node reports itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    name: String,
}

impl NodeIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct HealthMonitor {
    identity: NodeIdentity,
    config: NodeConfig,
    platform: PlatformKind,
    queue: Arc<dyn OutboundQueue>,
    emitter: Option<EmitterHandle>,
    watcher: Option<WatcherProcess>,
}

impl HealthMonitor {
    /// Validate settings and classify the host
    ///
    /// An unreadable release file is not fatal: the platform falls back to
    /// `Linux`, which never permits automated reboot.
    pub fn new(config: NodeConfig, queue: Arc<dyn OutboundQueue>) -> Result<Self> {
        let platform = platform::classify().unwrap_or_else(|e| {
            warn!("Platform classification failed ({}), assuming Linux", e);
            PlatformKind::Linux
        });
        Self::with_platform(config, queue, platform)
    }

    /// Build with an already-known platform
    pub fn with_platform(
        config: NodeConfig,
        queue: Arc<dyn OutboundQueue>,
        platform: PlatformKind,
    ) -> Result<Self> {
        config.validate()?;
        let identity = NodeIdentity::new(config.node.name.clone());
        info!("Health monitor for node {} on {}", identity.name(), platform);

        Ok(Self {
            identity,
            config,
            platform,
            queue,
            emitter: None,
            watcher: None,
        })
    }

    /// Start the stall watcher process and the heartbeat task
    ///
    /// The watcher is launched first so a launch failure leaves nothing
    /// running. Must be called from within a tokio runtime when heartbeats
    /// are enabled.
    pub fn start(&mut self) -> Result<()> {
        if self.watcher.is_none() && self.config.stall_watcher.enabled {
            let settings = WatchSettings::from(&self.config.stall_watcher);
            let pid = std::process::id();
            let watcher = match &self.config.stall_watcher.program {
                Some(program) => WatcherProcess::spawn(program, pid, &settings)?,
                None => WatcherProcess::spawn_current_exe(pid, &settings)?,
            };
            self.watcher = Some(watcher);
        }

        if self.emitter.is_none() {
            if let Some(period) = self.config.heartbeat.period() {
                let emitter = HeartbeatEmitter::new(self.identity.name(), self.queue.clone());
                self.emitter = emitter.start(period);
            }
        }

        Ok(())
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn platform(&self) -> PlatformKind {
        self.platform
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn heartbeat_running(&self) -> bool {
        self.emitter.as_ref().map(EmitterHandle::is_running).unwrap_or(false)
    }

    pub fn watcher_pid(&self) -> Option<u32> {
        self.watcher.as_ref().map(WatcherProcess::id)
    }

    /// Reboot through `rebooter` if this platform allows it
    pub fn reboot_this_computer(&self, rebooter: &dyn Rebooter) -> Result<RemediationOutcome> {
        remediation::maybe_reboot(self.platform, rebooter)
    }

    /// Stop heartbeats and the watcher
    pub async fn shutdown(mut self) {
        if let Some(emitter) = self.emitter.take() {
            emitter.stop().await;
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
        info!("Health monitor for node {} stopped", self.identity.name());
    }
}
