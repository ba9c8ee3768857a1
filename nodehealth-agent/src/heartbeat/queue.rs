//! Outbound queue seam between the emitter and the networking layer

use super::HeartbeatEvent;
use crate::error::{HealthError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// Ordered, append-only sink for outgoing events
///
/// Implementations must be safe to append to from the emitter task while
/// another thread drains them, and must not block indefinitely.
pub trait OutboundQueue: Send + Sync {
    fn append(&self, event: HeartbeatEvent) -> Result<()>;
}

/// Mutex-protected FIFO, optionally bounded
#[derive(Debug, Default)]
pub struct SendQueue {
    events: Mutex<VecDeque<HeartbeatEvent>>,
    capacity: Option<usize>,
}

impl SendQueue {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    /// Bounded when `capacity > 0`, unbounded otherwise
    pub fn from_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            Self::unbounded()
        } else {
            Self::with_capacity(capacity)
        }
    }

    pub fn pop_front(&self) -> Option<HeartbeatEvent> {
        self.events.lock().pop_front()
    }

    /// Take every pending event in insertion order
    pub fn drain(&self) -> Vec<HeartbeatEvent> {
        self.events.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl OutboundQueue for SendQueue {
    fn append(&self, event: HeartbeatEvent) -> Result<()> {
        let mut events = self.events.lock();
        if let Some(capacity) = self.capacity {
            if events.len() >= capacity {
                return Err(HealthError::QueueInsertion(format!(
                    "queue full ({} pending)",
                    events.len()
                )));
            }
        }
        events.push_back(event);
        Ok(())
    }
}

impl OutboundQueue for mpsc::Sender<HeartbeatEvent> {
    fn append(&self, event: HeartbeatEvent) -> Result<()> {
        self.try_send(event).map_err(|e| HealthError::QueueInsertion(e.to_string()))
    }
}
