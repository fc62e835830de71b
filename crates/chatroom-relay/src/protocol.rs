//! Relay WebSocket protocol — JSON frames between browser clients and the relay
//!
//! Every frame on the wire has the shape `{"event": <name>, "data": <payload>}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport-assigned identity of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh identity for a new connection
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a chat message's content should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Plain text
    #[default]
    Text,
    /// URL of a file previously uploaded to the file storage service
    File,
}

// ── Client → Relay ──

/// Payload of a `join` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_name: String,
    pub room_name: String,
}

/// Payload of a `chat` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

/// Client → Relay frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientFrame {
    Join(JoinRequest),
    Chat(ChatRequest),
}

impl ClientFrame {
    /// Decode a text frame received from a client
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

// ── Relay → Client ──

/// A chat message as relayed to every member of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: ConnectionId,
    pub sender_name: String,
    pub room_name: String,
    pub content: String,
    pub message_type: MessageType,
    /// Assigned by the relay when the message is fanned out
    pub sent_at: DateTime<Utc>,
}

/// Relay → Client frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerFrame {
    /// Sent once to a client right after it connects
    #[serde(rename = "userID")]
    AssignedIdentity(ConnectionId),
    /// Someone else joined the recipient's room
    #[serde(rename = "join")]
    JoinNotice(String),
    /// Someone else left the recipient's room
    #[serde(rename = "leave")]
    LeaveNotice(String),
    #[serde(rename = "chat")]
    Chat(ChatMessage),
}

impl ServerFrame {
    pub fn joined(user_name: &str, room_name: &str) -> Self {
        Self::JoinNotice(format!("{} joined {}", user_name, room_name))
    }

    pub fn left(user_name: &str, room_name: &str) -> Self {
        Self::LeaveNotice(format!("{} left {}", user_name, room_name))
    }

    /// Wire name of this frame's event
    pub fn event(&self) -> &'static str {
        match self {
            Self::AssignedIdentity(_) => events::USER_ID,
            Self::JoinNotice(_) => events::JOIN,
            Self::LeaveNotice(_) => events::LEAVE,
            Self::Chat(_) => events::CHAT,
        }
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Well-known event names ──

pub mod events {
    pub const USER_ID: &str = "userID";
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const CHAT: &str = "chat";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_deserialize() {
        let json = r#"{"event":"join","data":{"userName":"Alice","roomName":"lobby"}}"#;
        let frame = ClientFrame::parse(json).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Join(JoinRequest {
                user_name: "Alice".to_string(),
                room_name: "lobby".to_string(),
            })
        );
    }

    #[test]
    fn test_chat_defaults_to_text() {
        let json = r#"{"event":"chat","data":{"content":"hi"}}"#;
        match ClientFrame::parse(json).unwrap() {
            ClientFrame::Chat(req) => {
                assert_eq!(req.content, "hi");
                assert_eq!(req.message_type, MessageType::Text);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_chat_file_type() {
        let json = r#"{"event":"chat","data":{"content":"https://files/x.png","messageType":"FILE"}}"#;
        match ClientFrame::parse(json).unwrap() {
            ClientFrame::Chat(req) => assert_eq!(req.message_type, MessageType::File),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(ClientFrame::parse(r#"{"event":"typing","data":{}}"#).is_err());
        assert!(ClientFrame::parse(r#"{"event":"join","data":{"userName":"Alice"}}"#).is_err());
        assert!(ClientFrame::parse("not json").is_err());
    }

    #[test]
    fn test_assigned_identity_serialize() {
        let id = ConnectionId::new();
        let json = ServerFrame::AssignedIdentity(id).encode().unwrap();
        assert!(json.contains("\"event\":\"userID\""));
        assert!(json.contains(&format!("\"data\":\"{}\"", id)));
    }

    #[test]
    fn test_notice_text() {
        assert_eq!(
            ServerFrame::joined("Bob", "lobby"),
            ServerFrame::JoinNotice("Bob joined lobby".to_string())
        );
        let json = ServerFrame::left("Bob", "lobby").encode().unwrap();
        assert_eq!(json, r#"{"event":"leave","data":"Bob left lobby"}"#);
    }

    #[test]
    fn test_chat_serialize_camel_case() {
        let frame = ServerFrame::Chat(ChatMessage {
            sender_id: ConnectionId::new(),
            sender_name: "Alice".to_string(),
            room_name: "lobby".to_string(),
            content: "hi".to_string(),
            message_type: MessageType::File,
            sent_at: Utc::now(),
        });
        assert_eq!(frame.event(), events::CHAT);
        let json = frame.encode().unwrap();
        assert!(json.contains("\"senderName\":\"Alice\""));
        assert!(json.contains("\"roomName\":\"lobby\""));
        assert!(json.contains("\"messageType\":\"FILE\""));
        assert!(json.contains("\"sentAt\""));
    }
}
