//! Event bus - pub/sub fan-out for engine events
//!
//! Built on a tokio broadcast channel: emission is fire-and-forget, a slow
//! or absent subscriber never stalls the engine. Subscribers that fall
//! behind see a Lagged error and keep going.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::EngineEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Central event bus for engine activity
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped; with a
    /// full channel the oldest events are dropped.
    pub fn emit(&self, event: EngineEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create a shared event bus
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(EngineEvent::IterationStarted { n: 1 });
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(EngineEvent::TaskBlocked {
            task_id: "t1".to_string(),
            reason: "killed 10x - needs replan".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "task_blocked");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(EngineEvent::IterationStarted { n: 3 });
        assert_eq!(rx1.recv().await.unwrap().event_type(), "iteration_started");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "iteration_started");
    }

    #[tokio::test]
    async fn test_lagged_subscriber_continues() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for n in 0..10 {
            bus.emit(EngineEvent::IterationStarted { n });
        }

        match rx.recv().await {
            Ok(event) => assert_eq!(event.event_type(), "iteration_started"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                assert!(missed > 0);
                assert!(rx.recv().await.is_ok());
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
}
