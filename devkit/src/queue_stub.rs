/*!
Mock outbound queue

Records every appended heartbeat and can be switched into a rejecting mode to
exercise the emitter's skip-and-continue path.
*/

use nodehealth_agent::error::{HealthError, Result};
use nodehealth_agent::heartbeat::{HeartbeatEvent, OutboundQueue};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Queue double that records events and counts rejections
#[derive(Clone, Default)]
pub struct MockQueue {
    events: Arc<Mutex<Vec<HeartbeatEvent>>>,
    rejecting: Arc<AtomicBool>,
    rejected: Arc<AtomicUsize>,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject (true) or accept (false) subsequent appends
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// All accepted events, in insertion order
    pub fn events(&self) -> Vec<HeartbeatEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Accepted events whose text matches exactly
    pub fn find_by_text(&self, text: &str) -> Vec<HeartbeatEvent> {
        self.events.lock().iter().filter(|e| e.text == text).cloned().collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl OutboundQueue for MockQueue {
    fn append(&self, event: HeartbeatEvent) -> Result<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(HealthError::QueueInsertion("[MOCK] queue rejecting".into()));
        }

        tracing::debug!("[MOCK] queued: {}", event.text);
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodehealth_agent::heartbeat::TinyImage;

    fn event(text: &str) -> HeartbeatEvent {
        HeartbeatEvent { text: text.to_string(), payload: TinyImage::blank() }
    }

    #[test]
    fn test_records_and_rejects() {
        let queue = MockQueue::new();
        queue.append(event("a |Heartbeat")).unwrap();

        queue.set_rejecting(true);
        assert!(queue.append(event("b |Heartbeat")).is_err());
        queue.set_rejecting(false);
        queue.append(event("a |Heartbeat")).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.rejected(), 1);
        assert_eq!(queue.find_by_text("a |Heartbeat").len(), 2);

        queue.clear();
        assert!(queue.is_empty());
    }
}
