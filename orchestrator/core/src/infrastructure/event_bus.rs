// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory broadcast of cortex and lifecycle events.
// Feeds the SSE endpoint and any in-process observers; events are not persisted.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use synapse_cortex::application::EventBus;
use synapse_cortex::CortexEvent;

use crate::domain::events::{DomainEvent, LifecycleEvent};
use crate::domain::lifecycle::AttemptId;

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct DomainEventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl DomainEventBus {
    /// Capacity is how many events are buffered before slow receivers lag
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_lifecycle_event(&self, event: LifecycleEvent) {
        self.publish(DomainEvent::Lifecycle(event));
    }

    pub fn publish_cortex_event(&self, event: CortexEvent) {
        self.publish(DomainEvent::Cortex(event));
    }

    /// Publish a domain event to all subscribers
    pub fn publish(&self, event: DomainEvent) {
        debug!(event = event.name(), "Publishing event");

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the lifecycle events of one provisioning attempt
    pub fn subscribe_attempt(&self, attempt_id: AttemptId) -> AttemptEventReceiver {
        AttemptEventReceiver {
            receiver: self.sender.subscribe(),
            attempt_id,
        }
    }

    /// Raw broadcast receiver, for adapting into a stream
    pub fn raw_receiver(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DomainEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl EventBus for DomainEventBus {
    async fn publish(&self, event: CortexEvent) -> anyhow::Result<()> {
        self.publish_cortex_event(event);
        Ok(())
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one provisioning attempt
pub struct AttemptEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    attempt_id: AttemptId,
}

impl AttemptEventReceiver {
    pub async fn recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Lifecycle(lifecycle) = event {
                if lifecycle.attempt_id() == self.attempt_id {
                    return Ok(lifecycle);
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use synapse_cortex::NodeId;

    fn started(attempt_id: AttemptId, concept: &str) -> LifecycleEvent {
        LifecycleEvent::ProvisioningStarted {
            attempt_id,
            concept: concept.to_string(),
            intent: String::new(),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = DomainEventBus::new(10);
        let mut receiver = bus.subscribe();

        let attempt_id = AttemptId::new();
        bus.publish_lifecycle_event(started(attempt_id, "qubit"));

        match receiver.recv().await.unwrap() {
            DomainEvent::Lifecycle(LifecycleEvent::ProvisioningStarted { concept, .. }) => {
                assert_eq!(concept, "qubit");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cortex_events_arrive_through_trait() {
        let bus = DomainEventBus::new(10);
        let mut receiver = bus.subscribe();
        let as_trait: &dyn EventBus = &bus;

        as_trait
            .publish(CortexEvent::FeedbackIgnored {
                agent_id: NodeId::new(),
                concept_id: NodeId::new(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name(), "feedback_ignored");
    }

    #[tokio::test]
    async fn test_attempt_receiver_filters_other_attempts() {
        let bus = DomainEventBus::new(10);
        let wanted = AttemptId::new();
        let mut receiver = bus.subscribe_attempt(wanted);

        bus.publish_lifecycle_event(started(AttemptId::new(), "other"));
        bus.publish_lifecycle_event(started(wanted, "mine"));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.attempt_id(), wanted);
    }

    #[test]
    fn test_try_recv_empty_and_no_subscribers() {
        let bus = DomainEventBus::new(4);
        // Publishing without subscribers is not an error
        bus.publish_lifecycle_event(started(AttemptId::new(), "x"));
        assert_eq!(bus.subscriber_count(), 0);

        let mut receiver = bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
