use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted message. `id` and `created_at` are assigned by the store at
/// persistence time; the record is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Total order within a conversation. Push arrival order is never
    /// authoritative; clients sort by this key.
    pub fn sort_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.id)
    }

    /// The other party of the conversation, seen from `me`.
    pub fn counterpart(&self, me: Uuid) -> Uuid {
        if self.sender_id == me {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Handshake frame. Must be the first frame on a new connection;
    /// the connection is not registered until the token verifies.
    #[serde(rename_all = "camelCase")]
    Connect { session_token: String },

    #[serde(rename_all = "camelCase")]
    Send { receiver_id: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    ConnectSuccess { user_id: String },

    Delivered { message: Message },

    DeliveryFailed { reason: String },

    Error { reason: String },
}
