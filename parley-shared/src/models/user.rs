use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account.
///
/// Accounts are owned by the CRUD subsystem; the chat core only reads
/// identity and returns the full record when resolving conversation
/// participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// Display name.
    pub username: String,

    /// Contact address.
    pub email: String,

    /// Users following this account.
    pub followers: Vec<Uuid>,

    /// Accounts this user follows.
    pub following: Vec<Uuid>,
}
