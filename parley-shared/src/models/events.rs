//! The bidirectional real-time chat protocol.
//!
//! Events travel as JSON objects tagged by `event` with an optional `data`
//! payload, e.g. `{"event":"join-conversation","data":{...}}`. The engine
//! itself is transport-agnostic; the WebSocket handler only encodes and
//! decodes these frames.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Message, PresenceSnapshot};

/// Events a client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// First frame of a session; identifies the connecting user.
    UserConnected { user_id: Uuid },

    /// Enter a conversation's room, replacing any prior room.
    JoinConversation { conversation_id: Uuid },

    /// Acknowledge every message addressed to the caller in the current
    /// room.
    MessageSeen,

    /// The caller started composing.
    StartTyping,

    /// The caller stopped composing.
    StopTyping,

    /// Persist and fan out a new message.
    SendMessage {
        sender: Uuid,
        receiver: Uuid,
        conversation: Uuid,
        body: String,
    },

    /// Leave the conversation and end the session.
    LeftConversation { conversation_id: Uuid },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// The current presence roster.
    UserData { users: PresenceSnapshot },

    /// Signal to re-fetch the room's message list over HTTP.
    GetChatMessages,

    /// Another room member started or stopped composing.
    Typing { active: bool },

    /// A message was persisted and delivered to the room.
    MessageSent { message: Message },

    /// Best-effort aside to a single connection.
    Notice { message: String },

    /// Non-fatal failure surfaced to the room or connection.
    Error { message: String },
}
