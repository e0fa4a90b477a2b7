//! Shared models, wire events, and configuration for the Parley platform.

pub mod config;
pub mod models;
