//! Review endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        review::{Review, ReviewInput},
        Pagination,
    },
};

use super::{AuthenticatedUser, PaginatedResponse};

/// Reviews of a book, newest first
#[utoipa::path(
    get,
    path = "/books/{id}/reviews",
    tag = "reviews",
    params(
        ("id" = i32, Path, description = "Book ID"),
        Pagination
    ),
    responses(
        (status = 200, description = "Reviews", body = PaginatedResponse<Review>),
        (status = 404, description = "Book not found")
    )
)]
pub async fn list_reviews(
    State(state): State<crate::AppState>,
    Path(book_id): Path<i32>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<Review>>> {
    let (reviews, total) = state.services.reviews.list_for_book(book_id, &pagination).await?;
    Ok(Json(PaginatedResponse::new(reviews, total, pagination)))
}

/// Review a borrowed book
#[utoipa::path(
    post,
    path = "/books/{id}/reviews",
    tag = "reviews",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = ReviewInput,
    responses(
        (status = 201, description = "Review created", body = Review),
        (status = 409, description = "Book already reviewed"),
        (status = 422, description = "Book never borrowed")
    )
)]
pub async fn create_review(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(input): Json<ReviewInput>,
) -> AppResult<(StatusCode, Json<Review>)> {
    input.validate()?;

    let review = state.services.reviews.create(claims.user_id, book_id, input).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// Edit own review
#[utoipa::path(
    put,
    path = "/reviews/{id}",
    tag = "reviews",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Review ID")
    ),
    request_body = ReviewInput,
    responses(
        (status = 200, description = "Review updated", body = Review),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found")
    )
)]
pub async fn update_review(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(input): Json<ReviewInput>,
) -> AppResult<Json<Review>> {
    input.validate()?;

    let review = state.services.reviews.update(&claims, id, input).await?;
    Ok(Json(review))
}

/// Delete a review (author or staff)
#[utoipa::path(
    delete,
    path = "/reviews/{id}",
    tag = "reviews",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Review ID")
    ),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Review not found")
    )
)]
pub async fn delete_review(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.reviews.delete(&claims, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
