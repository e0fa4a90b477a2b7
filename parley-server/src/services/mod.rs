//! Persistence-facing services for the chat core.

pub mod chat_query_service;
pub mod chat_store;
pub mod conversation_service;
pub mod message_service;

use thiserror::Error;

/// Failures surfaced by the chat services.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

pub type ChatResult<T> = Result<T, ChatError>;
