//! Schema bootstrap and database probes.
//!
//! The schema ships with the binary and is applied statement by
//! statement at startup; every statement is idempotent, so re-running
//! against an existing database is safe.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

/// Applied in order at startup. The unordered-pair index makes the
/// one-conversation-per-pair rule hold regardless of who created it.
const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS pgcrypto",
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        followers UUID[] NOT NULL DEFAULT '{}',
        following UUID[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS conversations (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        creator_id UUID NOT NULL REFERENCES users(id),
        participant_id UUID NOT NULL REFERENCES users(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (creator_id <> participant_id)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS conversations_pair_idx
        ON conversations (LEAST(creator_id, participant_id), GREATEST(creator_id, participant_id))",
    "CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        sender_id UUID NOT NULL REFERENCES users(id),
        receiver_id UUID NOT NULL REFERENCES users(id),
        conversation_id UUID NOT NULL REFERENCES conversations(id),
        body TEXT NOT NULL CHECK (char_length(body) <= 700),
        seen BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS messages_conversation_idx
        ON messages (conversation_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS messages_unseen_idx
        ON messages (receiver_id) WHERE seen = FALSE",
];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database error executing schema statement {index}: {source}")]
    Sql {
        index: usize,
        #[source]
        source: sqlx::Error,
    },
}

/// Applies the embedded schema.
pub async fn run(pool: &PgPool) -> Result<(), BootstrapError> {
    info!(statements = SCHEMA.len(), "running database bootstrap");

    for (index, statement) in SCHEMA.iter().enumerate() {
        debug!(index, "executing schema statement");
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|source| BootstrapError::Sql { index, source })?;
    }

    Ok(())
}

/// Simple liveness check used during startup.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Readiness probe: the schema must be in place, not just the socket.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1 FROM messages LIMIT 1")
        .execute(pool)
        .await
        .map(|_| ())
}
