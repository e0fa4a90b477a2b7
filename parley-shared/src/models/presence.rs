use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a connected user currently is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceState {
    /// The conversation the user has joined, if any.
    pub conversation_id: Option<Uuid>,
}

/// Point-in-time view of every connected user, broadcast as `user-data`.
///
/// A `BTreeMap` keeps the serialized roster stable across broadcasts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub users: BTreeMap<Uuid, PresenceState>,
}

impl PresenceSnapshot {
    /// Number of connected users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
