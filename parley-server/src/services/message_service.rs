//! Message store.
//!
//! Persists chat messages and answers the by-conversation, by-participant,
//! and seen-state queries. Listing order is descending `created_at`;
//! arrival order is never authoritative.

use shared::models::{MAX_BODY_LEN, Message, NewMessage};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{ChatError, ChatResult};

#[derive(Debug, Clone)]
pub struct MessageService {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    conversation_id: Uuid,
    body: String,
    seen: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            conversation_id: row.conversation_id,
            body: row.body,
            seen: row.seen,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, conversation_id, body, seen, created_at, updated_at";

impl MessageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists a new message. The caller supplies the `seen` hint
    /// computed from room occupancy at send time.
    ///
    /// # Errors
    /// `InvalidArgument` when the body exceeds [`MAX_BODY_LEN`], or a
    /// database error.
    #[instrument(name = "chat.append_message", skip(self, message), err)]
    pub async fn append(&self, message: NewMessage) -> ChatResult<Message> {
        if message.body.chars().count() > MAX_BODY_LEN {
            return Err(ChatError::InvalidArgument(format!(
                "message body exceeds {MAX_BODY_LEN} characters"
            )));
        }

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO messages (sender_id, receiver_id, conversation_id, body, seen)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(message.conversation_id)
        .bind(&message.body)
        .bind(message.seen)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// All messages in a conversation, newest first.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    pub async fn list_by_conversation(&self, conversation_id: Uuid) -> ChatResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// All messages the user sent or received, newest first.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    pub async fn list_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE sender_id = $1 OR receiver_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Unseen messages addressed to the user, in store-native order.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    pub async fn list_unseen(&self, user_id: Uuid) -> ChatResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE receiver_id = $1 AND seen = FALSE"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Marks every message in the conversation addressed to `receiver_id`
    /// as seen. Matching nothing is a no-op, not an error.
    ///
    /// # Errors
    /// Returns a database error if the update fails.
    #[instrument(name = "chat.mark_seen", skip(self), err)]
    pub async fn mark_seen(&self, conversation_id: Uuid, receiver_id: Uuid) -> ChatResult<u64> {
        let result = sqlx::query(
            "UPDATE messages
             SET seen = TRUE, updated_at = NOW()
             WHERE conversation_id = $1 AND receiver_id = $2 AND seen = FALSE",
        )
        .bind(conversation_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
