//! Heartbeat emission
//!
//! A background task appends a small liveness event to the outbound queue on a
//! fixed period. The queue belongs to the networking layer; the emitter only
//! ever inserts, and never blocks doing so.

mod queue;

pub use queue::{OutboundQueue, SendQueue};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Width and height of the placeholder image
pub const TINY_IMAGE_SIDE: usize = 3;

/// 3×3 single-channel all-zero image sent with every heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TinyImage {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl TinyImage {
    pub fn blank() -> Self {
        Self {
            width: TINY_IMAGE_SIDE,
            height: TINY_IMAGE_SIDE,
            channels: 1,
            data: vec![0; TINY_IMAGE_SIDE * TINY_IMAGE_SIDE],
        }
    }
}

/// Liveness event as consumed by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub text: String,
    pub payload: TinyImage,
}

/// Text carried by every heartbeat of a node
pub fn heartbeat_text(node_name: &str) -> String {
    format!("{} |Heartbeat", node_name)
}

/// Produces heartbeat events for one node
pub struct HeartbeatEmitter {
    text: String,
    queue: Arc<dyn OutboundQueue>,
}

/// Handle on a running emitter task
pub struct EmitterHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatEmitter {
    pub fn new(node_name: &str, queue: Arc<dyn OutboundQueue>) -> Self {
        Self {
            text: heartbeat_text(node_name),
            queue,
        }
    }

    /// Compose one heartbeat and append it to the queue
    pub fn tick(&self) -> Result<()> {
        let event = HeartbeatEvent {
            text: self.text.clone(),
            payload: TinyImage::blank(),
        };
        self.queue.append(event)
    }

    /// Spawn the periodic task; `None` when the period is zero or too large
    /// to schedule
    ///
    /// The first heartbeat fires one full period after start. Must be called
    /// from within a tokio runtime.
    pub fn start(self, period: Duration) -> Option<EmitterHandle> {
        if period.is_zero() {
            debug!("Heartbeat disabled");
            return None;
        }

        let Some(first) = Instant::now().checked_add(period) else {
            warn!("Heartbeat period {:?} is out of range; heartbeat not started", period);
            return None;
        };

        let (stop, mut stopped) = watch::channel(false);
        info!("Starting heartbeat every {:?}", period);

        let task = tokio::spawn(async move {
            let mut timer = interval_at(first, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.tick() {
                            warn!("Heartbeat skipped: {}", e);
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            debug!("Heartbeat task stopping");
                            break;
                        }
                    }
                }
            }
        });

        Some(EmitterHandle { stop, task })
    }
}

impl EmitterHandle {
    /// Signal the task to stop and wait for it
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!("Heartbeat task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_appends_heartbeat() {
        let queue = Arc::new(SendQueue::unbounded());
        let emitter = HeartbeatEmitter::new("jeffcam", queue.clone());

        emitter.tick().unwrap();

        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "jeffcam |Heartbeat");
        assert_eq!(events[0].payload.data, vec![0u8; 9]);
        assert_eq!(events[0].payload.channels, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_second_period_over_six_and_a_half_seconds() {
        let queue = Arc::new(SendQueue::unbounded());
        let handle = HeartbeatEmitter::new("node1", queue.clone())
            .start(Duration::from_secs(2))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(6500)).await;

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.text == "node1 |Heartbeat"));
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_before_first_period() {
        let queue = Arc::new(SendQueue::unbounded());
        let handle = HeartbeatEmitter::new("node1", queue.clone())
            .start(Duration::from_secs(5))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(queue.is_empty());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_zero_period_never_starts() {
        let queue = Arc::new(SendQueue::unbounded());
        let handle = HeartbeatEmitter::new("node1", queue.clone()).start(Duration::ZERO);
        assert!(handle.is_none());
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedulable_period_is_refused_without_panic() {
        let queue = Arc::new(SendQueue::unbounded());
        let handle = HeartbeatEmitter::new("node1", queue.clone()).start(Duration::MAX);
        assert!(handle.is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_period_keeps_task_alive() {
        let queue = Arc::new(SendQueue::unbounded());
        let handle = HeartbeatEmitter::new("node1", queue.clone())
            .start(Duration::from_secs(7 * 24 * 60 * 60))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_skips_tick_and_keeps_running() {
        let queue = Arc::new(SendQueue::with_capacity(1));
        let handle = HeartbeatEmitter::new("node1", queue.clone())
            .start(Duration::from_secs(1))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(queue.len(), 1);
        assert!(handle.is_running());

        queue.drain();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(queue.len(), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_emission() {
        let queue = Arc::new(SendQueue::unbounded());
        let handle = HeartbeatEmitter::new("node1", queue.clone())
            .start(Duration::from_secs(1))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(queue.len(), 1);
    }
}
