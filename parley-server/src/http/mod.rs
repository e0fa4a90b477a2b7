//! HTTP error boundary.

pub mod error;
pub mod json;
pub mod problem;
