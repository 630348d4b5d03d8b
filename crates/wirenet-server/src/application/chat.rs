//! Chat service use case.
//!
//! - `ServerPing` is echoed unchanged to its sender, so the client can
//!   measure round-trip time from the timestamp it put in the body.
//! - `MessageAll` is re-tagged as `ServerMessage`, the sender's ID is pushed
//!   on top of the original JSON body, and the result goes to every other
//!   registered client.
//! - `ServerMessage` is server-to-client only; a client sending one is logged
//!   and ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};
use wirenet_core::protocol::ChatKind;
use wirenet_core::{Connection, Message};

use super::{ClientRegistry, ServerHandler};

/// Demo chat server. Keeps a couple of counters for the shutdown summary.
#[derive(Debug, Default)]
pub struct ChatServer {
    pings: AtomicU64,
    relayed: AtomicU64,
}

impl ChatServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pings echoed so far.
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }

    /// Number of `ServerMessage` copies queued so far.
    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }
}

/// Builds the `ServerMessage` that relays `message` from client `sender_id`.
pub fn relay_message(sender_id: u32, message: &Message<ChatKind>) -> Message<ChatKind> {
    let mut relay = Message::new(ChatKind::ServerMessage);
    relay.push_bytes(&message.body).push(sender_id);
    relay
}

impl ServerHandler<ChatKind> for ChatServer {
    fn on_client_validated(&self, registry: &dyn ClientRegistry<ChatKind>, conn: &Arc<Connection<ChatKind>>) {
        info!(
            client_id = conn.id(),
            clients = registry.client_count(),
            "client joined"
        );
    }

    fn on_client_disconnect(&self, registry: &dyn ClientRegistry<ChatKind>, conn: &Arc<Connection<ChatKind>>) {
        info!(
            client_id = conn.id(),
            clients = registry.client_count(),
            "removing client"
        );
    }

    fn on_message(
        &self,
        registry: &dyn ClientRegistry<ChatKind>,
        sender: &Arc<Connection<ChatKind>>,
        message: Message<ChatKind>,
    ) {
        match message.id() {
            ChatKind::ServerPing => {
                debug!(client_id = sender.id(), "server ping");
                if sender.send(message) {
                    self.pings.fetch_add(1, Ordering::Relaxed);
                }
            }
            ChatKind::MessageAll => {
                debug!(client_id = sender.id(), "message all ({} bytes)", message.size());
                let relay = relay_message(sender.id(), &message);
                let sent = registry.broadcast(&relay, Some(sender.id()));
                self.relayed.fetch_add(sent as u64, Ordering::Relaxed);
            }
            ChatKind::ServerMessage => {
                debug!(client_id = sender.id(), "ignoring server-only message from client");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Weak;
    use wirenet_core::{ConnectionOwner, ErrorKind, Reactor, Role, TsQueue};

    /// Registry double that records broadcasts instead of sending them.
    #[derive(Default)]
    struct RecordingRegistry {
        broadcasts: Mutex<Vec<(Message<ChatKind>, Option<u32>)>>,
    }

    impl ClientRegistry<ChatKind> for RecordingRegistry {
        fn client_count(&self) -> usize {
            3
        }

        fn client_ids(&self) -> Vec<u32> {
            vec![10, 11, 12]
        }

        fn connection(&self, _id: u32) -> Option<Arc<Connection<ChatKind>>> {
            None
        }

        fn send_to(&self, _id: u32, _message: Message<ChatKind>) -> bool {
            true
        }

        fn broadcast(&self, message: &Message<ChatKind>, exclude: Option<u32>) -> usize {
            self.broadcasts.lock().push((message.clone(), exclude));
            2
        }

        fn disconnect(&self, _id: u32) -> bool {
            false
        }
    }

    #[test]
    fn test_relay_message_pops_sender_then_json() {
        // Arrange
        let mut original = Message::new(ChatKind::MessageAll);
        original.push_json(&json!({"name": "ada", "age": 36})).unwrap();

        // Act
        let mut relay = relay_message(42, &original);

        // Assert
        assert_eq!(relay.id(), ChatKind::ServerMessage);
        assert_eq!(relay.pop::<u32>().unwrap(), 42);
        let body: serde_json::Value = relay.pop_json().unwrap();
        assert_eq!(body, json!({"name": "ada", "age": 36}));
    }

    #[test]
    fn test_relay_of_empty_body_carries_only_sender() {
        let mut relay = relay_message(7, &Message::new(ChatKind::MessageAll));

        assert_eq!(relay.size(), 4);
        assert_eq!(relay.pop::<u32>().unwrap(), 7);
        assert!(relay.is_empty());
    }

    #[test]
    fn test_chat_server_starts_with_zero_counters() {
        let server = ChatServer::new();
        assert_eq!(server.pings(), 0);
        assert_eq!(server.relayed(), 0);
    }

    fn detached_client(id: u32, reactor: &Reactor) -> Arc<Connection<ChatKind>> {
        let owner: Weak<dyn ConnectionOwner<ChatKind>> = Weak::<NoOwner>::new();
        Connection::new(id, Role::Acceptor, reactor.clone(), Arc::new(TsQueue::new()), owner)
    }

    struct NoOwner;

    impl ConnectionOwner<ChatKind> for NoOwner {
        fn on_error(&self, _conn: &Arc<Connection<ChatKind>>, _kind: ErrorKind) {}
    }

    #[test]
    fn test_message_all_is_broadcast_excluding_sender() {
        // Arrange
        let reactor = Reactor::start("chat-test-broadcast").unwrap();
        let sender = detached_client(10, &reactor);
        let registry = RecordingRegistry::default();
        let server = ChatServer::new();
        let mut message = Message::new(ChatKind::MessageAll);
        message.push_str("{}");

        // Act
        server.on_message(&registry, &sender, message);

        // Assert
        let recorded = registry.broadcasts.lock();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0.id(), ChatKind::ServerMessage);
        assert_eq!(recorded[0].1, Some(10));
        assert_eq!(server.relayed(), 2);
        reactor.stop().unwrap();
    }

    #[test]
    fn test_ping_is_echoed_not_broadcast() {
        let reactor = Reactor::start("chat-test-ping").unwrap();
        let sender = detached_client(11, &reactor);
        let registry = RecordingRegistry::default();
        let server = ChatServer::new();
        let mut ping = Message::new(ChatKind::ServerPing);
        ping.push(123u64);

        server.on_message(&registry, &sender, ping);

        assert_eq!(server.pings(), 1);
        assert!(registry.broadcasts.lock().is_empty());
        reactor.stop().unwrap();
    }

    #[test]
    fn test_ping_to_released_client_is_not_counted() {
        let reactor = Reactor::start("chat-test-released").unwrap();
        let sender = detached_client(12, &reactor);
        sender.mark_released();
        let server = ChatServer::new();

        server.on_message(&RecordingRegistry::default(), &sender, Message::new(ChatKind::ServerPing));

        assert_eq!(server.pings(), 0);
        reactor.stop().unwrap();
    }
}
