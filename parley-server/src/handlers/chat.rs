//! HTTP chat surface: conversation creation and the read-side views.
//!
//! All routes sit behind the session middleware; the acting user always
//! comes from [`RequestContext`], never from the request body or path.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    http::json::ApiJson,
    middleware::request_context::RequestContext,
    services::{chat_query_service::ChatQueryService, conversation_service::ConversationService},
};
use shared::models::{
    ConversationListResponse, ConversationResponse, CreateConversationRequest, MessageListResponse,
    UnseenMessagesResponse,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat/create", post(create_conversation))
        .route("/api/chat/conversations", get(list_conversations))
        .route(
            "/api/chat/messages/{conversation_id}",
            get(conversation_messages),
        )
        .route("/api/chat/unseen/messages", get(unseen_messages))
}

/// Creates the conversation for {caller, participant} or returns the
/// existing one; the pair is unique regardless of direction. Replays
/// answer 201 with the same body either way.
#[instrument(skip(app_state, context, payload))]
async fn create_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    ApiJson(payload): ApiJson<CreateConversationRequest>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user(&context)?;
    let pool = require_pool(&app_state)?;
    let service = ConversationService::new(pool);

    let conversation = service.get_or_create(user_id, payload.participant_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse { conversation }),
    ))
}

/// The caller's conversations, each with its latest message, sorted by
/// that message's recency.
#[instrument(skip(app_state, context))]
async fn list_conversations(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
) -> AppResult<Json<ConversationListResponse>> {
    let user_id = require_user(&context)?;
    let pool = require_pool(&app_state)?;
    let service = ChatQueryService::new(pool);

    let conversations = service.conversations_for_user(user_id).await?;
    Ok(Json(ConversationListResponse { conversations }))
}

/// Full message list of one conversation. Non-participants get the same
/// 404 as a conversation that does not exist.
#[instrument(skip(app_state, context))]
async fn conversation_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<MessageListResponse>> {
    let user_id = require_user(&context)?;
    let pool = require_pool(&app_state)?;
    let service = ChatQueryService::new(pool);

    let (messages, conversation) = service
        .messages_for_participant(user_id, conversation_id)
        .await?;
    Ok(Json(MessageListResponse {
        messages,
        conversation,
    }))
}

/// Unseen messages addressed to the caller, across all conversations.
#[instrument(skip(app_state, context))]
async fn unseen_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
) -> AppResult<Json<UnseenMessagesResponse>> {
    let user_id = require_user(&context)?;
    let pool = require_pool(&app_state)?;
    let service = ChatQueryService::new(pool);

    let messages = service.unseen_for_user(user_id).await?;
    Ok(Json(UnseenMessagesResponse { messages }))
}

fn require_user(context: &RequestContext) -> AppResult<Uuid> {
    context
        .user_id
        .ok_or_else(|| ApiError::unauthorized("authentication required"))
}

fn require_pool(state: &AppState) -> AppResult<PgPool> {
    state.pool.clone().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "database_unavailable",
            "database pool not configured",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn require_user_rejects_anonymous_contexts() {
        let context = RequestContext::default();
        let error = require_user(&context).unwrap_err();
        assert_eq!(error.status(), StatusCode::UNAUTHORIZED);

        let context = RequestContext {
            request_id: "r-1".into(),
            user_id: Some(Uuid::new_v4()),
        };
        assert!(require_user(&context).is_ok());
    }

    #[test]
    fn require_pool_reports_unavailable_without_a_database() {
        let state = AppState::default();
        let error = require_pool(&state).unwrap_err();
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
