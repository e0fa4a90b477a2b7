pub mod chat;
pub mod socket;
