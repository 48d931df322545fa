//! Password reset requests repository

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::is_unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::password_reset::{PasswordReset, PasswordResetView, ResetQuery, ResetStatus, ResetToken},
};

#[derive(Clone)]
pub struct PasswordResetsRepository {
    pool: Pool<Postgres>,
}

impl PasswordResetsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Option<PasswordReset>> {
        let row = sqlx::query_as::<_, PasswordReset>("SELECT * FROM password_resets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_pending_for_user(&self, user_id: i32) -> AppResult<Option<PasswordReset>> {
        let row = sqlx::query_as::<_, PasswordReset>(
            "SELECT * FROM password_resets WHERE user_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_by_token_hash(&self, token_hash: &str) -> AppResult<Option<PasswordReset>> {
        let row = sqlx::query_as::<_, PasswordReset>(
            "SELECT * FROM password_resets WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert a pending request
    pub async fn create(&self, user_id: i32, reason: Option<&str>) -> AppResult<PasswordReset> {
        sqlx::query_as::<_, PasswordReset>(
            r#"
            INSERT INTO password_resets (id, user_id, status, reason)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(ResetStatus::Pending)
        .bind(reason)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("A reset request is already pending for this account".to_string())
            } else {
                AppError::Database(e)
            }
        })
    }

    /// Requests with the account they target, newest first
    pub async fn list(&self, query: &ResetQuery) -> AppResult<(Vec<PasswordResetView>, i64)> {
        let pagination = query.pagination();

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM password_resets WHERE ($1::varchar IS NULL OR status = $1)",
        )
        .bind(query.status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, PasswordResetView>(
            r#"
            SELECT pr.*, u.login AS user_login, u.email AS user_email
            FROM password_resets pr
            JOIN users u ON u.id = pr.user_id
            WHERE ($1::varchar IS NULL OR pr.status = $1)
            ORDER BY pr.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(query.status)
        .bind(pagination.per_page())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Approve or reject a request that is still pending.
    ///
    /// Returns `None` when the request is no longer pending.
    pub async fn decide(
        &self,
        id: Uuid,
        target: ResetStatus,
        note: Option<&str>,
        admin_id: i32,
        token: Option<&ResetToken>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<PasswordReset>> {
        let row = sqlx::query_as::<_, PasswordReset>(
            r#"
            UPDATE password_resets SET
                status = $2,
                admin_note = $3,
                handled_by = $4,
                handled_at = $5,
                token_hash = $6,
                token_expires_at = $7
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(target)
        .bind(note)
        .bind(admin_id)
        .bind(now)
        .bind(token.map(|t| t.hash.as_str()))
        .bind(token.map(|t| t.expires_at))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Consume an approved request and store the new password atomically
    pub async fn complete(
        &self,
        id: Uuid,
        user_id: i32,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            r#"
            UPDATE password_resets SET status = 'completed', completed_at = $2
            WHERE id = $1 AND status = 'approved' AND token_expires_at > $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() == 0 {
            return Err(AppError::BadRequest(
                "Reset token is no longer valid".to_string(),
            ));
        }

        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn count_pending(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM password_resets WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
