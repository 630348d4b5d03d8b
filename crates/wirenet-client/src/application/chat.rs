//! Chat client use cases: building requests and reading replies.
//!
//! Body layouts are listed in [`wirenet_core::protocol::chat`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use wirenet_core::protocol::ChatKind;
use wirenet_core::{CodecError, Message};

/// The JSON object the demo client broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub name: String,
    pub age: u32,
}

/// What a message from the server means to the demo client.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Our own ping came back.
    Pong { round_trip: Duration },
    /// Another client's `MessageAll`, relayed by the server.
    Relayed { sender: u32, body: serde_json::Value },
    /// A client-to-server kind the server should never send.
    Unexpected(ChatKind),
}

/// Microseconds since the Unix epoch; `0` if the clock is before 1970.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

pub fn ping_message(sent_at_us: u64) -> Message<ChatKind> {
    let mut ping = Message::new(ChatKind::ServerPing);
    ping.push(sent_at_us);
    ping
}

/// Builds a `MessageAll` carrying `greeting` as JSON.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn message_all(greeting: &Greeting) -> Result<Message<ChatKind>, CodecError> {
    let mut message = Message::new(ChatKind::MessageAll);
    message.push_json(greeting)?;
    Ok(message)
}

/// Decodes a message received from the server. `now_us` is the receive
/// time, used for the ping round trip.
///
/// # Errors
///
/// Returns a [`CodecError`] if the body does not match the layout for its
/// kind.
pub fn interpret(mut message: Message<ChatKind>, now_us: u64) -> Result<ChatEvent, CodecError> {
    match message.id() {
        ChatKind::ServerPing => {
            let sent_at: u64 = message.pop()?;
            Ok(ChatEvent::Pong {
                round_trip: Duration::from_micros(now_us.saturating_sub(sent_at)),
            })
        }
        ChatKind::ServerMessage => {
            // Scalar first; the JSON body is the rest.
            let sender: u32 = message.pop()?;
            let body = if message.is_empty() {
                serde_json::Value::Null
            } else {
                message.pop_json()?
            };
            Ok(ChatEvent::Relayed { sender, body })
        }
        other => Ok(ChatEvent::Unexpected(other)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_round_trip_is_measured_from_timestamp() {
        // Arrange
        let ping = ping_message(1_000_000);

        // Act
        let event = interpret(ping, 1_002_500).unwrap();

        // Assert
        assert_eq!(
            event,
            ChatEvent::Pong {
                round_trip: Duration::from_micros(2_500)
            }
        );
    }

    #[test]
    fn test_clock_going_backwards_gives_zero_round_trip() {
        let event = interpret(ping_message(10), 5).unwrap();
        assert_eq!(event, ChatEvent::Pong { round_trip: Duration::ZERO });
    }

    #[test]
    fn test_relayed_message_yields_sender_and_json() {
        // Arrange: the server pushes the JSON body first, then the sender ID.
        let mut relayed = Message::new(ChatKind::ServerMessage);
        relayed.push_json(&json!({"name": "ada", "age": 36})).unwrap();
        relayed.push(12u32);

        // Act
        let event = interpret(relayed, 0).unwrap();

        // Assert
        assert_eq!(
            event,
            ChatEvent::Relayed {
                sender: 12,
                body: json!({"name": "ada", "age": 36})
            }
        );
    }

    #[test]
    fn test_relayed_message_without_body_is_null() {
        let mut relayed = Message::new(ChatKind::ServerMessage);
        relayed.push(3u32);

        let event = interpret(relayed, 0).unwrap();

        assert_eq!(
            event,
            ChatEvent::Relayed {
                sender: 3,
                body: serde_json::Value::Null
            }
        );
    }

    #[test]
    fn test_truncated_ping_is_codec_error() {
        let mut short = Message::new(ChatKind::ServerPing);
        short.push(1u16);

        assert!(interpret(short, 0).is_err());
    }

    #[test]
    fn test_message_all_body_is_greeting_json() {
        let greeting = Greeting {
            name: "grace".into(),
            age: 45,
        };

        let mut message = message_all(&greeting).unwrap();

        assert_eq!(message.id(), ChatKind::MessageAll);
        assert_eq!(message.pop_json::<Greeting>().unwrap(), greeting);
    }

    #[test]
    fn test_message_all_from_server_is_unexpected() {
        let event = interpret(Message::new(ChatKind::MessageAll), 0).unwrap();
        assert_eq!(event, ChatEvent::Unexpected(ChatKind::MessageAll));
    }
}
