//! Password reset endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::password_reset::{
        CompleteReset, CreateResetRequest, PasswordReset, PasswordResetView, ResetQuery,
        ResetStatusResponse, ResetSubmitted, ReviewResetRequest,
    },
};

use super::{AuthenticatedUser, PaginatedResponse};

/// Ask for a password reset
#[utoipa::path(
    post,
    path = "/password-resets",
    tag = "password-resets",
    request_body = CreateResetRequest,
    responses(
        (status = 202, description = "Request recorded; poll its status", body = ResetSubmitted),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn submit_request(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateResetRequest>,
) -> AppResult<(StatusCode, Json<ResetSubmitted>)> {
    request.validate()?;

    let submitted = state.services.password_resets.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(submitted)))
}

/// Poll a reset request
#[utoipa::path(
    get,
    path = "/password-resets/{id}/status",
    tag = "password-resets",
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Current status; carries the token once after approval", body = ResetStatusResponse)
    )
)]
pub async fn request_status(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ResetStatusResponse>> {
    let status = state.services.password_resets.status(id).await?;
    Ok(Json(status))
}

/// List reset requests
#[utoipa::path(
    get,
    path = "/password-resets",
    tag = "password-resets",
    security(("bearer_auth" = [])),
    params(ResetQuery),
    responses(
        (status = 200, description = "Reset requests", body = PaginatedResponse<PasswordResetView>),
        (status = 403, description = "Administrators only")
    )
)]
pub async fn list_requests(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ResetQuery>,
) -> AppResult<Json<PaginatedResponse<PasswordResetView>>> {
    let (requests, total) = state.services.password_resets.list(&claims, &query).await?;
    Ok(Json(PaginatedResponse::new(requests, total, query.pagination())))
}

/// Approve or reject a pending request
#[utoipa::path(
    patch,
    path = "/password-resets/{id}",
    tag = "password-resets",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    request_body = ReviewResetRequest,
    responses(
        (status = 200, description = "Request decided", body = PasswordReset),
        (status = 403, description = "Administrators only"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is no longer pending")
    )
)]
pub async fn decide_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(decision): Json<ReviewResetRequest>,
) -> AppResult<Json<PasswordReset>> {
    let request = state.services.password_resets.decide(&claims, id, decision).await?;
    Ok(Json(request))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/password-resets/complete",
    tag = "password-resets",
    request_body = CompleteReset,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid, used or expired token")
    )
)]
pub async fn complete_reset(
    State(state): State<crate::AppState>,
    Json(body): Json<CompleteReset>,
) -> AppResult<StatusCode> {
    body.validate()?;

    state.services.password_resets.complete(body).await?;
    Ok(StatusCode::NO_CONTENT)
}
