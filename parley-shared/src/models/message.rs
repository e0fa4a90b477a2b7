use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on a message body, in characters.
pub const MAX_BODY_LEN: usize = 700;

/// A chat message tied to one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier for the message.
    pub id: Uuid,

    /// The user who sent the message.
    pub sender_id: Uuid,

    /// The user the message is addressed to.
    pub receiver_id: Uuid,

    /// The conversation this message belongs to.
    pub conversation_id: Uuid,

    /// Message body; empty is permitted.
    pub body: String,

    /// Whether the receiving participant has viewed the message.
    pub seen: bool,

    /// Creation time; consumers must treat this as the true order.
    pub created_at: DateTime<Utc>,

    /// Last mutation time (seen flips).
    pub updated_at: DateTime<Utc>,
}

/// Fields for a message about to be persisted.
///
/// The `seen` hint is computed by the caller from current room occupancy
/// at send time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub conversation_id: Uuid,
    pub body: String,
    pub seen: bool,
}

/// Response body for the unseen-messages query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnseenMessagesResponse {
    pub messages: Vec<Message>,
}
