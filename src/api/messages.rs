//! Messages and notifications endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::message::{Message, MessageQuery, SendMessage},
};

use super::{AuthenticatedUser, PaginatedResponse};

#[derive(Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Serialize, ToSchema)]
pub struct MarkedRead {
    /// Number of messages that were unread
    pub updated: u64,
}

/// The caller's messages, newest first
#[utoipa::path(
    get,
    path = "/messages",
    tag = "messages",
    security(("bearer_auth" = [])),
    params(MessageQuery),
    responses(
        (status = 200, description = "Messages", body = PaginatedResponse<Message>)
    )
)]
pub async fn list_messages(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<MessageQuery>,
) -> AppResult<Json<PaginatedResponse<Message>>> {
    let (messages, total) = state.services.messages.list(claims.user_id, &query).await?;
    Ok(Json(PaginatedResponse::new(messages, total, query.pagination())))
}

/// Number of unread messages
#[utoipa::path(
    get,
    path = "/messages/unread-count",
    tag = "messages",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unread count", body = UnreadCount)
    )
)]
pub async fn unread_count(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UnreadCount>> {
    let unread = state.services.messages.unread_count(claims.user_id).await?;
    Ok(Json(UnreadCount { unread }))
}

/// Mark one message as read
#[utoipa::path(
    post,
    path = "/messages/{id}/read",
    tag = "messages",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message marked read", body = Message),
        (status = 404, description = "Message not found")
    )
)]
pub async fn mark_read(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Message>> {
    let message = state.services.messages.mark_read(id, claims.user_id).await?;
    Ok(Json(message))
}

/// Mark every message as read
#[utoipa::path(
    post,
    path = "/messages/read-all",
    tag = "messages",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Messages marked read", body = MarkedRead)
    )
)]
pub async fn mark_all_read(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<MarkedRead>> {
    let updated = state.services.messages.mark_all_read(claims.user_id).await?;
    Ok(Json(MarkedRead { updated }))
}

/// Send a message to a user
#[utoipa::path(
    post,
    path = "/messages",
    tag = "messages",
    security(("bearer_auth" = [])),
    request_body = SendMessage,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 403, description = "Staff only"),
        (status = 404, description = "Recipient not found")
    )
)]
pub async fn send_message(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(message): Json<SendMessage>,
) -> AppResult<(StatusCode, Json<Message>)> {
    claims.require_staff()?;
    message.validate()?;

    let sent = state.services.messages.send(claims.user_id, message).await?;
    Ok((StatusCode::CREATED, Json(sent)))
}

/// Delete one of the caller's messages
#[utoipa::path(
    delete,
    path = "/messages/{id}",
    tag = "messages",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Message ID")
    ),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 404, description = "Message not found")
    )
)]
pub async fn delete_message(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.messages.delete(id, claims.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
