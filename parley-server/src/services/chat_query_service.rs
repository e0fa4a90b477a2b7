//! Read-side views over conversations and messages.
//!
//! The conversations-by-recency view is an explicit read-time join:
//! recent messages for the user, the distinct conversations they
//! reference, and each conversation's latest message, re-sorted by that
//! message's creation time. No materialized cache is maintained.

use shared::models::{Conversation, ConversationEntry, ConversationWithUsers, Message};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{
    ChatError, ChatResult, conversation_service::ConversationService,
    message_service::MessageService,
};

#[derive(Debug, Clone)]
pub struct ChatQueryService {
    conversations: ConversationService,
    messages: MessageService,
}

impl ChatQueryService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            conversations: ConversationService::new(pool.clone()),
            messages: MessageService::new(pool),
        }
    }

    /// Every conversation the user has exchanged messages in, each paired
    /// with its most recent message, sorted descending by that message's
    /// creation time.
    ///
    /// # Errors
    /// `NotFound` when the user does not resolve, or a database error.
    #[instrument(name = "chat.conversations_for_user", skip(self), err)]
    pub async fn conversations_for_user(&self, user_id: Uuid) -> ChatResult<Vec<ConversationEntry>> {
        self.conversations.find_user(user_id).await?;

        let recent = self.messages.list_for_user(user_id).await?;
        let ids = distinct_conversation_ids(&recent);
        let conversations = self.conversations.find_populated(&ids).await?;

        Ok(assemble_entries(conversations, &recent))
    }

    /// The full message list of one conversation, for a participant.
    ///
    /// # Errors
    /// `NotFound` when the user or conversation does not resolve,
    /// `Forbidden` when the caller is not one of the two participants
    /// (rendered as not-found at the boundary), or a database error.
    #[instrument(name = "chat.messages_for_participant", skip(self), err)]
    pub async fn messages_for_participant(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> ChatResult<(Vec<Message>, Conversation)> {
        self.conversations.find_user(user_id).await?;
        let conversation = self.conversations.find_by_id(conversation_id).await?;

        if !conversation.includes(user_id) {
            return Err(ChatError::Forbidden("user is not a participant".into()));
        }

        let messages = self.messages.list_by_conversation(conversation_id).await?;
        Ok((messages, conversation))
    }

    /// Unseen messages addressed to the user.
    ///
    /// # Errors
    /// `NotFound` when the user does not resolve, or a database error.
    pub async fn unseen_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Message>> {
        self.conversations.find_user(user_id).await?;
        self.messages.list_unseen(user_id).await
    }
}

/// Conversation ids referenced by `messages`, first appearance first.
fn distinct_conversation_ids(messages: &[Message]) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for message in messages {
        if !ids.contains(&message.conversation_id) {
            ids.push(message.conversation_id);
        }
    }
    ids
}

/// Pairs each conversation with its latest message from `recent` and
/// sorts descending by that message's creation time. Entries without a
/// matching message sort last; the comparison never panics on them.
fn assemble_entries(
    conversations: Vec<ConversationWithUsers>,
    recent: &[Message],
) -> Vec<ConversationEntry> {
    let mut entries: Vec<ConversationEntry> = conversations
        .into_iter()
        .map(|conversation| {
            let last_message = recent
                .iter()
                .filter(|message| message.conversation_id == conversation.id)
                .max_by_key(|message| message.created_at)
                .cloned();
            ConversationEntry {
                conversation,
                last_message,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        let a_at = a.last_message.as_ref().map(|m| m.created_at);
        let b_at = b.last_message.as_ref().map(|m| m.created_at);
        b_at.cmp(&a_at)
    });

    entries
}
