//! Borrowing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        borrowing::{BorrowingAction, BorrowingDetails, BorrowingQuery, CreateBorrowing, TransitionNote},
        Pagination,
    },
    AppState,
};

use super::{AuthenticatedUser, PaginatedResponse};

/// Request to borrow a book
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowing,
    responses(
        (status = 201, description = "Request filed as pending", body = BorrowingDetails),
        (status = 400, description = "Duration outside allowed range"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Already requested"),
        (status = 422, description = "Quota reached or unpaid fines")
    )
)]
pub async fn create_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBorrowing>,
) -> AppResult<(StatusCode, Json<BorrowingDetails>)> {
    let borrowing = state.services.borrowings.request(claims.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// The caller's borrowings
#[utoipa::path(
    get,
    path = "/borrowings/mine",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingQuery),
    responses(
        (status = 200, description = "Own borrowings", body = PaginatedResponse<BorrowingDetails>)
    )
)]
pub async fn my_borrowings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowingQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowingDetails>>> {
    let pagination = query.pagination();
    let (rows, total) = state
        .services
        .borrowings
        .list_for_user(claims.user_id, query)
        .await?;
    Ok(Json(PaginatedResponse::new(rows, total, pagination)))
}

/// All borrowings, filtered
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingQuery),
    responses(
        (status = 200, description = "Borrowings", body = PaginatedResponse<BorrowingDetails>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_borrowings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowingQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowingDetails>>> {
    claims.require_staff()?;

    let (rows, total) = state.services.borrowings.list(&query).await?;
    Ok(Json(PaginatedResponse::new(rows, total, query.pagination())))
}

/// Checked-out borrowings past their due date
#[utoipa::path(
    get,
    path = "/borrowings/overdue",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(Pagination),
    responses(
        (status = 200, description = "Overdue borrowings", body = PaginatedResponse<BorrowingDetails>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn overdue_borrowings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<BorrowingDetails>>> {
    claims.require_staff()?;

    let (rows, total) = state.services.borrowings.list_overdue(pagination).await?;
    Ok(Json(PaginatedResponse::new(rows, total, pagination)))
}

/// Get one borrowing
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrowing ID")
    ),
    responses(
        (status = 200, description = "Borrowing", body = BorrowingDetails),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state.services.borrowings.get(&claims, id).await?;
    Ok(Json(borrowing))
}

async fn transition(
    state: AppState,
    claims: crate::models::user::UserClaims,
    id: i32,
    action: BorrowingAction,
    reason: Option<String>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state
        .services
        .borrowings
        .apply(&claims, id, action, reason)
        .await?;
    Ok(Json(borrowing))
}

/// Cancel own pending or approved request
#[utoipa::path(
    post,
    path = "/borrowings/{id}/cancel",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    request_body(content = TransitionNote, description = "Optional reason"),
    responses(
        (status = 200, description = "Cancelled", body = BorrowingDetails),
        (status = 409, description = "Not cancellable in its current status")
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    note: Option<Json<TransitionNote>>,
) -> AppResult<Json<BorrowingDetails>> {
    let reason = note.and_then(|Json(n)| n.reason);
    transition(state, claims, id, BorrowingAction::Cancel, reason).await
}

/// Approve a pending request
#[utoipa::path(
    post,
    path = "/borrowings/{id}/approve",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Approved", body = BorrowingDetails),
        (status = 409, description = "Not pending"),
        (status = 422, description = "No copy available")
    )
)]
pub async fn approve(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingDetails>> {
    transition(state, claims, id, BorrowingAction::Approve, None).await
}

/// Reject a pending or approved request
#[utoipa::path(
    post,
    path = "/borrowings/{id}/reject",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    request_body(content = TransitionNote, description = "Optional reason"),
    responses(
        (status = 200, description = "Rejected", body = BorrowingDetails),
        (status = 409, description = "Not rejectable in its current status")
    )
)]
pub async fn reject(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    note: Option<Json<TransitionNote>>,
) -> AppResult<Json<BorrowingDetails>> {
    let reason = note.and_then(|Json(n)| n.reason);
    transition(state, claims, id, BorrowingAction::Reject, reason).await
}

/// Hand an approved book to the borrower
#[utoipa::path(
    post,
    path = "/borrowings/{id}/checkout",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Borrowed, due date set", body = BorrowingDetails),
        (status = 409, description = "Not approved")
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingDetails>> {
    transition(state, claims, id, BorrowingAction::Checkout, None).await
}

/// Announce a return
#[utoipa::path(
    post,
    path = "/borrowings/{id}/request-return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Return requested", body = BorrowingDetails),
        (status = 409, description = "Not borrowed")
    )
)]
pub async fn request_return(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingDetails>> {
    transition(state, claims, id, BorrowingAction::RequestReturn, None).await
}

/// Check a returned copy in and assess any fine
#[utoipa::path(
    post,
    path = "/borrowings/{id}/confirm-return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Returned", body = BorrowingDetails),
        (status = 409, description = "Not checked out")
    )
)]
pub async fn confirm_return(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingDetails>> {
    transition(state, claims, id, BorrowingAction::ConfirmReturn, None).await
}

/// Record payment of an assessed fine
#[utoipa::path(
    post,
    path = "/borrowings/{id}/pay-fine",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Fine settled", body = BorrowingDetails),
        (status = 422, description = "No unpaid fine")
    )
)]
pub async fn pay_fine(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state.services.borrowings.pay_fine(&claims, id).await?;
    Ok(Json(borrowing))
}
