//! Process-wide presence directory.
//!
//! Maps each connected user to their current room and connection handle.
//! The registry is owned by the server process and injected where needed;
//! entries are transient and lost on restart by design. All mutation goes
//! through one async lock, so concurrent connect/disconnect for the same
//! user cannot race, and every read hands out a snapshot taken under the
//! lock.

use std::collections::HashMap;

use shared::models::{PresenceSnapshot, PresenceState, ServerEvent};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

/// Outbound half of one connection.
pub type ConnectionHandle = mpsc::Sender<ServerEvent>;

/// Identifies one connection lifetime for a user. A disconnect only
/// removes the entry when the session still matches, so a connection
/// that was superseded cannot tear down its replacement.
pub type SessionId = u64;

struct PresenceEntry {
    session: SessionId,
    conversation_id: Option<Uuid>,
    handle: ConnectionHandle,
}

struct Inner {
    next_session: SessionId,
    entries: HashMap<Uuid, PresenceEntry>,
}

pub struct PresenceRegistry {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for PresenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceRegistry").finish()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_session: 0,
                entries: HashMap::new(),
            }),
        }
    }

    /// Registers a connection for `user_id` in state connected-no-room.
    ///
    /// Returns the new session id and, when the user already had a live
    /// entry, the superseded connection's handle so the caller can notify
    /// it before it is dropped. Single active session per user.
    pub async fn connect(
        &self,
        user_id: Uuid,
        handle: ConnectionHandle,
    ) -> (SessionId, Option<ConnectionHandle>) {
        let mut guard = self.inner.lock().await;
        let session = guard.next_session;
        guard.next_session += 1;

        let evicted = guard
            .entries
            .insert(
                user_id,
                PresenceEntry {
                    session,
                    conversation_id: None,
                    handle,
                },
            )
            .map(|entry| entry.handle);

        (session, evicted)
    }

    /// Removes the user's entry if it still belongs to `session`.
    /// Returns whether an entry was removed.
    pub async fn disconnect(&self, user_id: Uuid, session: SessionId) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.entries.get(&user_id) {
            Some(entry) if entry.session == session => {
                guard.entries.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Moves the user into a conversation's room. Membership is a single
    /// owned relation, so switching rooms replaces the stale membership
    /// in the same atomic update. Returns false when the user is not
    /// connected.
    pub async fn join(&self, user_id: Uuid, conversation_id: Uuid) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.entries.get_mut(&user_id) {
            Some(entry) => {
                entry.conversation_id = Some(conversation_id);
                true
            }
            None => false,
        }
    }

    /// Clears the user's room association without removing the entry.
    pub async fn leave(&self, user_id: Uuid) {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.entries.get_mut(&user_id) {
            entry.conversation_id = None;
        }
    }

    /// The conversation the user is currently in, if any.
    pub async fn current_room(&self, user_id: Uuid) -> Option<Uuid> {
        let guard = self.inner.lock().await;
        guard
            .entries
            .get(&user_id)
            .and_then(|entry| entry.conversation_id)
    }

    /// Number of presence entries currently in the conversation's room.
    pub async fn occupancy(&self, conversation_id: Uuid) -> usize {
        let guard = self.inner.lock().await;
        guard
            .entries
            .values()
            .filter(|entry| entry.conversation_id == Some(conversation_id))
            .count()
    }

    /// Snapshot of the room's members and their handles, taken under the
    /// lock so fan-out works off a consistent membership view.
    pub async fn room_members(&self, conversation_id: Uuid) -> Vec<(Uuid, ConnectionHandle)> {
        let guard = self.inner.lock().await;
        guard
            .entries
            .iter()
            .filter(|(_, entry)| entry.conversation_id == Some(conversation_id))
            .map(|(user_id, entry)| (*user_id, entry.handle.clone()))
            .collect()
    }

    /// The connection handle of one user, if connected.
    pub async fn handle_of(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        let guard = self.inner.lock().await;
        guard.entries.get(&user_id).map(|entry| entry.handle.clone())
    }

    /// Handles of every connected user.
    pub async fn all_handles(&self) -> Vec<ConnectionHandle> {
        let guard = self.inner.lock().await;
        guard
            .entries
            .values()
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// Serializable view of the whole roster, broadcast as `user-data`.
    pub async fn snapshot(&self) -> PresenceSnapshot {
        let guard = self.inner.lock().await;
        PresenceSnapshot {
            users: guard
                .entries
                .iter()
                .map(|(user_id, entry)| {
                    (
                        *user_id,
                        PresenceState {
                            conversation_id: entry.conversation_id,
                        },
                    )
                })
                .collect(),
        }
    }
}
