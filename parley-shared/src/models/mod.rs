//! Domain models shared between the server and its clients.

pub mod conversation;
pub mod events;
pub mod message;
pub mod presence;
pub mod user;

pub use conversation::{
    Conversation, ConversationEntry, ConversationListResponse, ConversationResponse,
    ConversationWithUsers, CreateConversationRequest, MessageListResponse,
};
pub use events::{ClientEvent, ServerEvent};
pub use message::{MAX_BODY_LEN, Message, NewMessage, UnseenMessagesResponse};
pub use presence::{PresenceSnapshot, PresenceState};
pub use user::User;
