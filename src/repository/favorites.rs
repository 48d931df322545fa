//! Favorites repository

use sqlx::{Pool, Postgres};

use super::books::BOOK_DETAILS_SELECT;
use crate::{error::AppResult, models::book::BookDetails};

#[derive(Clone)]
pub struct FavoritesRepository {
    pool: Pool<Postgres>,
}

impl FavoritesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Add or remove a favorite; returns whether the book is now a favorite
    pub async fn toggle(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;

        if removed.rows_affected() > 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO favorites (user_id, book_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(book_id)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    /// Favorite books with availability, most recently added first
    pub async fn list(&self, user_id: i32) -> AppResult<Vec<BookDetails>> {
        let query = format!(
            r#"
            {}
            JOIN favorites f ON f.book_id = b.id
            WHERE f.user_id = $1
            ORDER BY f.created_at DESC
            "#,
            BOOK_DETAILS_SELECT
        );
        let books = sqlx::query_as::<_, BookDetails>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    pub async fn count(&self, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
