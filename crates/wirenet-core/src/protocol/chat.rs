//! Message set spoken by the bundled `wirenet-server` and `wirenet-client`
//! binaries.
//!
//! | Kind            | Direction        | Body (push order)                      |
//! |-----------------|------------------|----------------------------------------|
//! | `ServerPing`    | client ↔ server  | `u64` send time, µs since Unix epoch   |
//! | `MessageAll`    | client → server  | JSON object                            |
//! | `ServerMessage` | server → clients | JSON object, then `u32` sender ID      |
//!
//! The server echoes `ServerPing` unchanged to its sender and re-broadcasts
//! `MessageAll` as `ServerMessage` to every other client.

/// Demo chat message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChatKind {
    ServerPing = 0,
    MessageAll = 1,
    ServerMessage = 2,
}

impl From<ChatKind> for u32 {
    fn from(kind: ChatKind) -> u32 {
        kind as u32
    }
}

impl TryFrom<u32> for ChatKind {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(ChatKind::ServerPing),
            1 => Ok(ChatKind::MessageAll),
            2 => Ok(ChatKind::ServerMessage),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_kind_tags_round_trip() {
        for kind in [ChatKind::ServerPing, ChatKind::MessageAll, ChatKind::ServerMessage] {
            assert_eq!(ChatKind::try_from(u32::from(kind)), Ok(kind));
        }
    }

    #[test]
    fn test_chat_kind_rejects_unknown_tag() {
        assert_eq!(ChatKind::try_from(3), Err(()));
    }
}
