//! Session-cookie authentication.
//!
//! The gateway terminates login and forwards the caller's user id in a
//! session cookie. Routes behind this middleware can rely on
//! `RequestContext::user_id` being set; everything else is rejected
//! before reaching a handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;
use shared::config::server::Config;
use tracing::debug;
use uuid::Uuid;

use crate::http::error::{ApiError, AppResult};
use crate::middleware::request_context::RequestContext;

/// Rejects requests without a valid session cookie and records the
/// authenticated user on the request context.
pub async fn require_session(mut request: Request<Body>, next: Next) -> AppResult<Response> {
    let cookie_name = request
        .extensions()
        .get::<Arc<Config>>()
        .map(|config| config.chat.session_cookie_name.clone())
        .unwrap_or_else(|| "parley_session".to_string());

    let user_id = session_user_id(request.headers(), &cookie_name)
        .ok_or_else(|| ApiError::unauthorized("missing or invalid session cookie"))?;

    if let Some(context) = request.extensions_mut().get_mut::<RequestContext>() {
        context.user_id = Some(user_id);
    } else {
        request.extensions_mut().insert(RequestContext {
            request_id: String::new(),
            user_id: Some(user_id),
        });
    }

    debug!(%user_id, path = %request.uri().path(), "session accepted");
    Ok(next.run(request).await)
}

/// The session cookie's value is the caller's user id.
pub fn session_user_id(headers: &HeaderMap, cookie_name: &str) -> Option<Uuid> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    Cookie::split_parse(raw)
        .flatten()
        .find(|cookie| cookie.name() == cookie_name)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}
