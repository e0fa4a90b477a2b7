//! Persistence seam for the real-time engine.
//!
//! The engine only needs two writes: append a message with its seen hint,
//! and flip seen-state in bulk. Hiding them behind a trait object keeps
//! the engine testable without a database.

use std::sync::Arc;

use async_trait::async_trait;
use shared::models::{Message, NewMessage};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ChatError, ChatResult, message_service::MessageService};

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persists a new message.
    async fn append(&self, message: NewMessage) -> ChatResult<Message>;

    /// Marks every message in the conversation addressed to the receiver
    /// as seen; returns the number of messages updated.
    async fn mark_seen(&self, conversation_id: Uuid, receiver_id: Uuid) -> ChatResult<u64>;
}

pub type SharedChatStore = Arc<dyn ChatStore>;

/// Postgres-backed store used by the running server.
#[derive(Clone)]
pub struct PgChatStore {
    pool: Option<PgPool>,
}

impl PgChatStore {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    fn messages(&self) -> ChatResult<MessageService> {
        self.pool
            .clone()
            .map(MessageService::new)
            .ok_or_else(|| ChatError::Unavailable("database pool not configured".into()))
    }
}

impl std::fmt::Debug for PgChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgChatStore")
            .field("pool", &self.pool.is_some())
            .finish()
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn append(&self, message: NewMessage) -> ChatResult<Message> {
        self.messages()?.append(message).await
    }

    async fn mark_seen(&self, conversation_id: Uuid, receiver_id: Uuid) -> ChatResult<u64> {
        self.messages()?.mark_seen(conversation_id, receiver_id).await
    }
}
