//! The real-time conversation/presence engine.

pub mod hub;
pub mod presence;
