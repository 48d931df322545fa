//! Reviews repository

use chrono::Utc;
use sqlx::{Pool, Postgres};

use super::is_unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::{review::{Review, ReviewInput}, Pagination},
};

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.book_id, r.rating, r.comment,
           COALESCE(NULLIF(TRIM(CONCAT_WS(' ', u.firstname, u.lastname)), ''), u.login) AS reviewer,
           r.created_at, r.updated_at
    FROM reviews r
    JOIN users u ON u.id = r.user_id
"#;

#[derive(Clone)]
pub struct ReviewsRepository {
    pool: Pool<Postgres>,
}

impl ReviewsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Review> {
        let query = format!("{} WHERE r.id = $1", REVIEW_SELECT);
        sqlx::query_as::<_, Review>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Review with id {} not found", id)))
    }

    /// Reviews of a book, newest first
    pub async fn list_for_book(&self, book_id: i32, pagination: &Pagination) -> AppResult<(Vec<Review>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE book_id = $1")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            "{} WHERE r.book_id = $1 ORDER BY r.created_at DESC, r.id DESC LIMIT {} OFFSET {}",
            REVIEW_SELECT,
            pagination.per_page(),
            pagination.offset()
        );
        let reviews = sqlx::query_as::<_, Review>(&query)
            .bind(book_id)
            .fetch_all(&self.pool)
            .await?;

        Ok((reviews, total))
    }

    pub async fn create(&self, user_id: i32, book_id: i32, input: &ReviewInput) -> AppResult<Review> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO reviews (user_id, book_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(input.rating)
        .bind(&input.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("You have already reviewed this book".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

        self.get_by_id(id).await
    }

    pub async fn update(&self, id: i32, input: &ReviewInput) -> AppResult<Review> {
        let result = sqlx::query(
            "UPDATE reviews SET rating = $1, comment = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(input.rating)
        .bind(&input.comment)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Review with id {} not found", id)));
        }
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Review with id {} not found", id)));
        }
        Ok(())
    }
}
