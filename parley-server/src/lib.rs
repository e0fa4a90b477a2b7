#![forbid(unsafe_code)]

//! Parley server library: HTTP surface, persistence services, and the
//! real-time conversation/presence engine.

pub mod app_state;
pub mod db;
pub mod handlers;
pub mod http;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod server;
pub mod services;
pub mod tracer;
