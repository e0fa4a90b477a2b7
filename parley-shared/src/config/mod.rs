//! Application configuration.

pub mod server;
