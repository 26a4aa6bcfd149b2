//! Lifecycle events published to subscribers over a broadcast channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Channel, QuoteStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuoteEvent {
    SubmissionReceived {
        submission_id: Uuid,
        project_id: Uuid,
        submitter_id: Uuid,
        channel: Channel,
    },
    QuoteVersionCreated {
        quote_id: Uuid,
        version: u32,
        previous_version_id: Option<Uuid>,
    },
    QuoteStateChanged {
        quote_id: Uuid,
        from: QuoteStatus,
        to: QuoteStatus,
    },
    QuoteStandardized {
        quote_id: Uuid,
        overall_confidence: f64,
    },
    QuoteNeedsClarification {
        quote_id: Uuid,
        flags: Vec<String>,
    },
}

impl QuoteEvent {
    pub fn quote_id(&self) -> Option<Uuid> {
        match self {
            Self::SubmissionReceived { .. } => None,
            Self::QuoteVersionCreated { quote_id, .. }
            | Self::QuoteStateChanged { quote_id, .. }
            | Self::QuoteStandardized { quote_id, .. }
            | Self::QuoteNeedsClarification { quote_id, .. } => Some(*quote_id),
        }
    }
}

/// Fan-out of [`QuoteEvent`]s. Publishing never blocks and never fails;
/// slow subscribers observe `Lagged` and skip ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<QuoteEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: QuoteEvent) {
        tracing::trace!(?event, "Publishing event");
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuoteEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let quote_id = Uuid::new_v4();

        bus.publish(QuoteEvent::QuoteStateChanged {
            quote_id,
            from: QuoteStatus::Received,
            to: QuoteStatus::Processing,
        });
        bus.publish(QuoteEvent::QuoteStandardized {
            quote_id,
            overall_confidence: 0.8,
        });

        assert!(matches!(rx.recv().await.unwrap(), QuoteEvent::QuoteStateChanged { .. }));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.quote_id(), Some(quote_id));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new(1);
        bus.publish(QuoteEvent::QuoteNeedsClarification {
            quote_id: Uuid::new_v4(),
            flags: vec!["extraction_failed".into()],
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(QuoteEvent::QuoteVersionCreated {
            quote_id: Uuid::nil(),
            version: 2,
            previous_version_id: None,
        })
        .unwrap();
        assert_eq!(json["type"], "quote_version_created");
        assert_eq!(json["version"], 2);
    }
}
