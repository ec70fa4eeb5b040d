//! Process-wide pub/sub for filtered thinking fragments.
//!
//! One broadcast topic; each chat request publishes, each client on
//! `/v1/thinking/stream` subscribes. Delivery is best-effort: a subscriber
//! that falls behind loses the oldest fragments and is told how many were
//! skipped.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingEvent {
    Thinking {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        timestamp: String,
    },
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Drop {
        skipped: u64,
    },
}

pub struct ThinkingBus {
    sender: broadcast::Sender<ThinkingEvent>,
}

impl ThinkingBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(crate::constants::THINKING_BUS_CAPACITY);
        Self { sender }
    }

    pub fn publish_thinking(&self, content: &str, model: Option<&str>) {
        if content.is_empty() {
            return;
        }
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.sender.send(ThinkingEvent::Thinking {
            content: content.to_string(),
            model: model.map(ToString::to_string),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    pub fn publish_done(&self, model: Option<&str>) {
        let _ = self.sender.send(ThinkingEvent::Done {
            model: model.map(ToString::to_string),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThinkingEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ThinkingBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_fragments() {
        let bus = ThinkingBus::new();
        let mut rx = bus.subscribe();

        bus.publish_thinking("I think", Some("claude-sonnet"));
        bus.publish_done(Some("claude-sonnet"));

        match rx.recv().await.unwrap() {
            ThinkingEvent::Thinking { content, model, timestamp } => {
                assert_eq!(content, "I think");
                assert_eq!(model.as_deref(), Some("claude-sonnet"));
                assert!(!timestamp.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), ThinkingEvent::Done { .. }));
    }

    #[tokio::test]
    async fn empty_fragments_are_not_published() {
        let bus = ThinkingBus::new();
        let mut rx = bus.subscribe();

        bus.publish_thinking("", Some("m"));
        bus.publish_done(None);

        assert!(matches!(rx.recv().await.unwrap(), ThinkingEvent::Done { .. }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = ThinkingBus::new();
        bus.publish_thinking("dropped on the floor", None);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_later_fragments() {
        let bus = ThinkingBus::new();
        bus.publish_thinking("before", None);

        let mut rx = bus.subscribe();
        bus.publish_thinking("after", None);

        match rx.recv().await.unwrap() {
            ThinkingEvent::Thinking { content, .. } => assert_eq!(content, "after"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_and_learns_the_count() {
        let bus = ThinkingBus::new();
        let mut rx = bus.subscribe();

        for i in 0..(crate::constants::THINKING_BUS_CAPACITY + 10) {
            bus.publish_thinking(&format!("f{}", i), None);
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                assert!(skipped >= 10);
            }
            other => panic!("expected lag, got {:?}", other),
        }
        // After the lag the receiver resumes with the oldest retained event.
        assert!(matches!(
            rx.recv().await.unwrap(),
            ThinkingEvent::Thinking { .. }
        ));
    }

    #[test]
    fn events_serialize_with_type_tags() {
        let event = ThinkingEvent::Thinking {
            content: "x".into(),
            model: Some("m".into()),
            timestamp: "2024-01-01T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "thinking");
        assert_eq!(value["content"], "x");
        assert_eq!(value["model"], "m");

        let done = serde_json::to_value(ThinkingEvent::Done { model: None }).unwrap();
        assert_eq!(done, serde_json::json!({ "type": "done" }));

        let drop = serde_json::to_value(ThinkingEvent::Drop { skipped: 3 }).unwrap();
        assert_eq!(drop, serde_json::json!({ "type": "drop", "skipped": 3 }));
    }
}
