//! Book reviews

use crate::{
    error::{AppError, AppResult},
    models::{
        review::{Review, ReviewInput},
        user::UserClaims,
        Pagination,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct ReviewsService {
    repository: Repository,
}

impl ReviewsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_for_book(&self, book_id: i32, pagination: &Pagination) -> AppResult<(Vec<Review>, i64)> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.reviews.list_for_book(book_id, pagination).await
    }

    /// Only readers who actually held the book may review it, once
    pub async fn create(&self, user_id: i32, book_id: i32, input: ReviewInput) -> AppResult<Review> {
        self.repository.books.get_by_id(book_id).await?;

        if !self.repository.borrowings.has_borrowed(user_id, book_id).await? {
            return Err(AppError::BusinessRule(
                "You can only review books you have borrowed".to_string(),
            ));
        }

        let review = self.repository.reviews.create(user_id, book_id, &input).await?;
        tracing::info!(review_id = review.id, user_id, book_id, rating = review.rating, "review created");
        Ok(review)
    }

    pub async fn update(&self, claims: &UserClaims, id: i32, input: ReviewInput) -> AppResult<Review> {
        let review = self.repository.reviews.get_by_id(id).await?;
        if review.user_id != claims.user_id {
            return Err(AppError::Authorization("Only the author can edit a review".to_string()));
        }
        self.repository.reviews.update(id, &input).await
    }

    /// Authors delete their own reviews; staff moderate any
    pub async fn delete(&self, claims: &UserClaims, id: i32) -> AppResult<()> {
        let review = self.repository.reviews.get_by_id(id).await?;
        claims.require_self_or_staff(review.user_id)?;
        self.repository.reviews.delete(id).await?;
        tracing::info!(review_id = id, by = claims.user_id, "review deleted");
        Ok(())
    }
}
