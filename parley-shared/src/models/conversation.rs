use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Message, User};

/// A conversation between exactly two participants.
///
/// The unordered pair {creator, participant} is unique: at most one
/// conversation exists per pair of users regardless of who initiated it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// Unique identifier for the conversation.
    pub id: Uuid,

    /// The user who initiated the conversation.
    pub creator_id: Uuid,

    /// The other participant.
    pub participant_id: Uuid,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Last timestamp refresh.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether `user_id` is one of the two participants.
    pub fn includes(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id || self.participant_id == user_id
    }
}

/// A conversation with creator and participant resolved to full records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationWithUsers {
    pub id: Uuid,
    pub creator: User,
    pub participant: User,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationWithUsers {
    /// Whether `user_id` is one of the two participants.
    pub fn includes(&self, user_id: Uuid) -> bool {
        self.creator.id == user_id || self.participant.id == user_id
    }
}

/// Request structure for creating (or reusing) a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateConversationRequest {
    /// The other participant; the creator comes from the session.
    pub participant_id: Uuid,
}

/// Response body wrapping a single conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationResponse {
    pub conversation: ConversationWithUsers,
}

/// One entry of the conversations-by-recency view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationEntry {
    pub conversation: ConversationWithUsers,

    /// Most recent message involving the requesting user. A conversation
    /// only enters the view through a message, but the field stays
    /// optional so ordering never has to assume one exists.
    pub last_message: Option<Message>,
}

/// Response body for the conversation listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationEntry>,
}

/// Response body for the per-conversation message listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    pub conversation: Conversation,
}
