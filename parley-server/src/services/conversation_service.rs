//! Conversation directory.
//!
//! Creates and retrieves the single conversation between a pair of users.
//! Lookup treats the pair as unordered: a request from B to message A
//! reuses an existing A→B conversation instead of creating a duplicate.

use shared::models::{Conversation, ConversationWithUsers, User};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{ChatError, ChatResult};

#[derive(Debug, Clone)]
pub struct ConversationService {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    creator_id: Uuid,
    participant_id: Uuid,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            creator_id: row.creator_id,
            participant_id: row.participant_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    followers: Vec<Uuid>,
    following: Vec<Uuid>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            followers: row.followers,
            following: row.following,
        }
    }
}

// The two ORed orientations make the lookup direction-blind: a request
// from B to message A finds an existing A→B row.
const PAIR_LOOKUP: &str =
    "SELECT id, creator_id, participant_id, created_at, updated_at
     FROM conversations
     WHERE (creator_id = $1 AND participant_id = $2) OR (creator_id = $2 AND participant_id = $1)";

impl ConversationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolves a user id to its stored record.
    ///
    /// # Errors
    /// `NotFound` when the identity does not resolve, or a database error.
    pub async fn find_user(&self, user_id: Uuid) -> ChatResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, followers, following FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::from)
            .ok_or_else(|| ChatError::NotFound("user does not exist".into()))
    }

    /// Returns the conversation between `creator_id` and `participant_id`,
    /// creating it on first request. Idempotent for repeated calls with
    /// the pair in either order.
    ///
    /// # Errors
    /// `InvalidArgument` when both ids name the same user, `NotFound`
    /// when either identity does not resolve, or a database error.
    #[instrument(name = "chat.get_or_create_conversation", skip(self), err)]
    pub async fn get_or_create(
        &self,
        creator_id: Uuid,
        participant_id: Uuid,
    ) -> ChatResult<ConversationWithUsers> {
        if creator_id == participant_id {
            return Err(ChatError::InvalidArgument(
                "cannot open a conversation with yourself".into(),
            ));
        }

        let creator = self.find_user(creator_id).await?;
        let participant = self.find_user(participant_id).await?;

        let existing = sqlx::query_as::<_, ConversationRow>(PAIR_LOOKUP)
            .bind(creator_id)
            .bind(participant_id)
            .fetch_optional(&self.pool)
            .await?;

        let row = match existing {
            Some(row) => row,
            None => {
                sqlx::query_as::<_, ConversationRow>(
                    "INSERT INTO conversations (creator_id, participant_id)
                     VALUES ($1, $2)
                     RETURNING id, creator_id, participant_id, created_at, updated_at",
                )
                .bind(creator_id)
                .bind(participant_id)
                .fetch_one(&self.pool)
                .await?
            }
        };

        let (creator, participant) = orient_pair(row.creator_id, creator, participant);

        Ok(ConversationWithUsers {
            id: row.id,
            creator,
            participant,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Fetches a conversation by id.
    ///
    /// # Errors
    /// `NotFound` when no such conversation exists, or a database error.
    pub async fn find_by_id(&self, conversation_id: Uuid) -> ChatResult<Conversation> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, creator_id, participant_id, created_at, updated_at
             FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Conversation::from)
            .ok_or_else(|| ChatError::NotFound("conversation does not exist".into()))
    }

    /// Fetches the given conversations with both participants resolved,
    /// sorted descending by conversation creation time.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    pub async fn find_populated(&self, ids: &[Uuid]) -> ChatResult<Vec<ConversationWithUsers>> {
        #[derive(sqlx::FromRow)]
        struct PopulatedRow {
            id: Uuid,
            created_at: chrono::DateTime<chrono::Utc>,
            updated_at: chrono::DateTime<chrono::Utc>,
            creator_id: Uuid,
            creator_username: String,
            creator_email: String,
            creator_followers: Vec<Uuid>,
            creator_following: Vec<Uuid>,
            participant_id: Uuid,
            participant_username: String,
            participant_email: String,
            participant_followers: Vec<Uuid>,
            participant_following: Vec<Uuid>,
        }

        let rows = sqlx::query_as::<_, PopulatedRow>(
            "SELECT c.id, c.created_at, c.updated_at,
                    cu.id AS creator_id,
                    cu.username AS creator_username,
                    cu.email AS creator_email,
                    cu.followers AS creator_followers,
                    cu.following AS creator_following,
                    pu.id AS participant_id,
                    pu.username AS participant_username,
                    pu.email AS participant_email,
                    pu.followers AS participant_followers,
                    pu.following AS participant_following
             FROM conversations c
             JOIN users cu ON cu.id = c.creator_id
             JOIN users pu ON pu.id = c.participant_id
             WHERE c.id = ANY($1)
             ORDER BY c.created_at DESC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ConversationWithUsers {
                id: row.id,
                creator: User {
                    id: row.creator_id,
                    username: row.creator_username,
                    email: row.creator_email,
                    followers: row.creator_followers,
                    following: row.creator_following,
                },
                participant: User {
                    id: row.participant_id,
                    username: row.participant_username,
                    email: row.participant_email,
                    followers: row.participant_followers,
                    following: row.participant_following,
                },
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }
}

/// The stored pair may be reversed relative to the request; the caller
/// always sees themselves as the creator they asked with.
fn orient_pair(stored_creator_id: Uuid, requester: User, other: User) -> (User, User) {
    if stored_creator_id == requester.id {
        (requester, other)
    } else {
        (other, requester)
    }
}
