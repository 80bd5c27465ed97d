//! Fan-out of newly persisted messages to live push connections.

use std::sync::Arc;

use hubcast::types::{Message, PushFrame};
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;

/// Pushes persisted messages to every connection currently registered for
/// their workspace. Delivery is best-effort against the set that was live at
/// the instant of broadcast; recovering anything missed is the catch-up
/// fetch's and poll loop's job, never this component's.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `message` to a snapshot of the workspace's live connections.
    /// A failed delivery tears down that connection and does not abort
    /// delivery to the others; there is no retry. Returns how many
    /// connections accepted the frame.
    pub fn fan_out(&self, workspace_id: &str, message: &Message) -> usize {
        let frame = PushFrame::NewMessage {
            message: message.clone(),
        };
        let payload = match serde_json::to_string(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, message_id = message.id, "failed to encode push frame");
                return 0;
            }
        };

        let snapshot = self.registry.snapshot(workspace_id);
        let mut delivered = 0;

        for connection in &snapshot {
            if connection.send_frame(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(
                    workspace_id,
                    connection_id = connection.id(),
                    principal = connection.principal(),
                    "push delivery failed; tearing down connection"
                );
                self.registry.unregister(workspace_id, connection.id());
            }
        }

        debug!(
            workspace_id,
            message_id = message.id,
            delivered,
            of = snapshot.len(),
            "message fanned out"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use hubcast::types::{Message, MessageKind, PushFrame, Sender};
    use serde_json::json;

    use super::Broadcaster;
    use crate::registry::ConnectionRegistry;

    fn message(id: i64) -> Message {
        Message {
            id,
            workspace_id: "ws-1".to_string(),
            sender: Sender::human("u-1"),
            content: format!("message {id}"),
            message_kind: MessageKind::Chat,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_live_connection_gets_exactly_one_frame() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let (_a, mut rx_a) = registry.register("ws-1", "human:u-1");
        let (_b, mut rx_b) = registry.register("ws-1", "human:u-2");

        let delivered = broadcaster.fan_out("ws-1", &message(1));
        assert_eq!(delivered, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let payload = rx.try_recv().expect("one frame");
            let frame: PushFrame = serde_json::from_str(&payload).expect("valid frame");
            match frame {
                PushFrame::NewMessage { message } => assert_eq!(message.id, 1),
                other => panic!("unexpected frame: {other:?}"),
            }
            assert!(rx.try_recv().is_err(), "no duplicate frame");
        }
    }

    #[tokio::test]
    async fn failed_delivery_is_isolated_and_tears_down_the_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let (_dead, rx_dead) = registry.register("ws-1", "human:u-1");
        let (_live, mut rx_live) = registry.register("ws-1", "human:u-2");
        drop(rx_dead); // simulated dead socket

        let delivered = broadcaster.fan_out("ws-1", &message(1));
        assert_eq!(delivered, 1);
        assert!(rx_live.try_recv().is_ok());

        // The failing connection was removed; siblings remain.
        assert_eq!(registry.workspace_count("ws-1"), 1);
    }

    #[tokio::test]
    async fn fan_out_is_scoped_to_the_workspace() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());

        let (_a, mut rx_other) = registry.register("ws-2", "human:u-9");

        let delivered = broadcaster.fan_out("ws-1", &message(1));
        assert_eq!(delivered, 0);
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn frames_arrive_in_persist_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let (_a, mut rx) = registry.register("ws-1", "human:u-1");

        for id in 1..=3 {
            broadcaster.fan_out("ws-1", &message(id));
        }

        let mut seen = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            let frame: PushFrame = serde_json::from_str(&payload).expect("valid frame");
            if let PushFrame::NewMessage { message } = frame {
                seen.push(message.id);
            }
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
