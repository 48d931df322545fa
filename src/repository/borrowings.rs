//! Borrowings repository: circulation records and their status changes

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, Pool, Postgres, Transaction};

use super::is_unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{Borrowing, BorrowingDetails, BorrowingQuery, BorrowingStatus},
        dashboard::TopBook,
    },
};

/// Borrowing columns joined with book and borrower names
const DETAILS_COLUMNS: &str = r#"
    br.*,
    b.title AS book_title,
    b.author AS book_author,
    u.login AS user_login,
    NULLIF(TRIM(CONCAT_WS(' ', u.firstname, u.lastname)), '') AS user_name
"#;

/// Reason recorded when a pending request times out
pub const PENDING_EXPIRED_REASON: &str = "Request expired before it was reviewed";
/// Reason recorded when an approved hold is not collected
pub const PICKUP_EXPIRED_REASON: &str = "Book was not picked up in time";

/// Columns set alongside a status change; `None` leaves the column untouched
#[derive(Debug, Default, Clone)]
pub struct TransitionFields {
    pub approved_at: Option<DateTime<Utc>>,
    pub borrowed_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub return_requested_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub fine_amount: Option<Decimal>,
    pub handled_by: Option<i32>,
}

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get borrowing by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>("SELECT * FROM borrowings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    /// Get borrowing with book and borrower names
    pub async fn get_details(&self, id: i32) -> AppResult<BorrowingDetails> {
        let query = format!(
            r#"
            SELECT {}
            FROM borrowings br
            JOIN books b ON b.id = br.book_id
            JOIN users u ON u.id = br.user_id
            WHERE br.id = $1
            "#,
            DETAILS_COLUMNS
        );
        sqlx::query_as::<_, BorrowingDetails>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing with id {} not found", id)))
    }

    /// List borrowings with filters and pagination, newest request first
    pub async fn list(&self, query: &BorrowingQuery) -> AppResult<(Vec<BorrowingDetails>, i64)> {
        let pagination = query.pagination();

        let mut conditions = Vec::new();
        let mut idx = 1;

        if query.status.is_some() {
            conditions.push(format!("br.status = ${}", idx));
            idx += 1;
        }
        if query.user_id.is_some() {
            conditions.push(format!("br.user_id = ${}", idx));
            idx += 1;
        }
        if query.book_id.is_some() {
            conditions.push(format!("br.book_id = ${}", idx));
        }
        if query.overdue.unwrap_or(false) {
            conditions.push(
                "br.status IN ('borrowed', 'return_requested') AND br.due_at < NOW()".to_string(),
            );
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_q = format!("SELECT COUNT(*) FROM borrowings br {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_q);
        if let Some(s) = query.status { count_builder = count_builder.bind(s); }
        if let Some(u) = query.user_id { count_builder = count_builder.bind(u); }
        if let Some(b) = query.book_id { count_builder = count_builder.bind(b); }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_q = format!(
            r#"
            SELECT {}
            FROM borrowings br
            JOIN books b ON b.id = br.book_id
            JOIN users u ON u.id = br.user_id
            {}
            ORDER BY br.requested_at DESC, br.id DESC
            LIMIT {} OFFSET {}
            "#,
            DETAILS_COLUMNS,
            where_clause,
            pagination.per_page(),
            pagination.offset()
        );
        let mut builder = sqlx::query_as::<_, BorrowingDetails>(&select_q);
        if let Some(s) = query.status { builder = builder.bind(s); }
        if let Some(u) = query.user_id { builder = builder.bind(u); }
        if let Some(b) = query.book_id { builder = builder.bind(b); }

        let rows = builder.fetch_all(&self.pool).await?;
        Ok((rows, total))
    }

    /// A user's borrowings that are not yet closed, oldest due first
    pub async fn list_open_for_user(&self, user_id: i32) -> AppResult<Vec<BorrowingDetails>> {
        let query = format!(
            r#"
            SELECT {}
            FROM borrowings br
            JOIN books b ON b.id = br.book_id
            JOIN users u ON u.id = br.user_id
            WHERE br.user_id = $1
              AND br.status = ANY($2)
            ORDER BY br.due_at NULLS LAST, br.requested_at
            "#,
            DETAILS_COLUMNS
        );
        let rows = sqlx::query_as::<_, BorrowingDetails>(&query)
            .bind(user_id)
            .bind(BorrowingStatus::names(&BorrowingStatus::OPEN))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Open borrowings counted against the user's quota
    pub async fn count_open_for_user(&self, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE user_id = $1 AND status = ANY($2)",
        )
        .bind(user_id)
        .bind(BorrowingStatus::names(&BorrowingStatus::OPEN))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Assessed fines not yet paid by the user
    pub async fn unpaid_fines_for_user(&self, user_id: i32) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(fine_amount), 0)
            FROM borrowings
            WHERE user_id = $1 AND status = 'returned' AND NOT fine_paid
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    /// Whether the user ever had this book in hand
    pub async fn has_borrowed(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrowings
                WHERE user_id = $1 AND book_id = $2
                  AND status IN ('borrowed', 'return_requested', 'returned')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Insert a pending request
    pub async fn create(&self, user_id: i32, book_id: i32, duration_days: i32) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>(
            r#"
            INSERT INTO borrowings (user_id, book_id, status, duration_days, requested_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(BorrowingStatus::Pending)
        .bind(duration_days)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("You already have an open request for this book".to_string())
            } else {
                AppError::Database(e)
            }
        })
    }

    /// Move a borrowing to `to` if it is still in one of `from`.
    ///
    /// Returns `None` when the row is missing or its status changed meanwhile.
    pub async fn apply_transition<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i32,
        from: &[BorrowingStatus],
        to: BorrowingStatus,
        fields: TransitionFields,
    ) -> AppResult<Option<Borrowing>> {
        let row = sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings SET
                status = $2,
                approved_at = COALESCE($3, approved_at),
                borrowed_at = COALESCE($4, borrowed_at),
                due_at = COALESCE($5, due_at),
                return_requested_at = COALESCE($6, return_requested_at),
                returned_at = COALESCE($7, returned_at),
                rejected_at = COALESCE($8, rejected_at),
                rejection_reason = COALESCE($9, rejection_reason),
                fine_amount = COALESCE($10, fine_amount),
                handled_by = COALESCE($11, handled_by)
            WHERE id = $1 AND status = ANY($12)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(fields.approved_at)
        .bind(fields.borrowed_at)
        .bind(fields.due_at)
        .bind(fields.return_requested_at)
        .bind(fields.returned_at)
        .bind(fields.rejected_at)
        .bind(fields.rejection_reason)
        .bind(fields.fine_amount)
        .bind(fields.handled_by)
        .bind(BorrowingStatus::names(from))
        .fetch_optional(executor)
        .await?;
        Ok(row)
    }

    /// Transition without extra locking
    pub async fn transition(
        &self,
        id: i32,
        from: &[BorrowingStatus],
        to: BorrowingStatus,
        fields: TransitionFields,
    ) -> AppResult<Option<Borrowing>> {
        Self::apply_transition(&self.pool, id, from, to, fields).await
    }

    /// Approve a pending request when a copy is free.
    ///
    /// The book row is locked so concurrent approvals cannot hand out the
    /// same copy twice.
    pub async fn approve(
        &self,
        id: i32,
        book_id: i32,
        fields: TransitionFields,
    ) -> AppResult<Option<Borrowing>> {
        let mut tx = self.pool.begin().await?;

        let (stock, reserved) = Self::lock_copies(&mut tx, book_id, id).await?;
        if reserved >= i64::from(stock) {
            return Err(AppError::BusinessRule(
                "No copy of this book is currently available".to_string(),
            ));
        }

        let updated = Self::apply_transition(
            &mut *tx,
            id,
            &[BorrowingStatus::Pending],
            BorrowingStatus::Approved,
            fields,
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Hand an approved hold over to the borrower.
    ///
    /// Stock may have been lowered since approval, so the copy count is
    /// checked again under the book row lock.
    pub async fn checkout(
        &self,
        id: i32,
        book_id: i32,
        fields: TransitionFields,
    ) -> AppResult<Option<Borrowing>> {
        let mut tx = self.pool.begin().await?;

        let (stock, reserved) = Self::lock_copies(&mut tx, book_id, id).await?;
        if reserved >= i64::from(stock) {
            return Err(AppError::BusinessRule(
                "No copy of this book is on the shelf for this hold".to_string(),
            ));
        }

        let updated = Self::apply_transition(
            &mut *tx,
            id,
            &[BorrowingStatus::Approved],
            BorrowingStatus::Borrowed,
            fields,
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Lock the book row; returns its stock and the copies held or out by
    /// borrowings other than `exclude_id`
    async fn lock_copies(
        tx: &mut Transaction<'_, Postgres>,
        book_id: i32,
        exclude_id: i32,
    ) -> AppResult<(i32, i64)> {
        let stock: i32 = sqlx::query_scalar("SELECT stock FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let reserved: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM borrowings
            WHERE book_id = $1 AND id <> $2
              AND status IN ('approved', 'borrowed', 'return_requested')
            "#,
        )
        .bind(book_id)
        .bind(exclude_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok((stock, reserved))
    }

    /// Mark an assessed fine as settled
    pub async fn mark_fine_paid(&self, id: i32, staff_id: i32) -> AppResult<Option<Borrowing>> {
        let row = sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings SET fine_paid = TRUE, handled_by = $2
            WHERE id = $1 AND status = 'returned' AND fine_amount > 0 AND NOT fine_paid
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Reject stale pending requests and uncollected holds in one statement
    pub async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        pending_cutoff: DateTime<Utc>,
        pickup_cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowingDetails>> {
        let query = format!(
            r#"
            WITH expired AS (
                UPDATE borrowings SET
                    status = 'rejected',
                    rejected_at = $1,
                    rejection_reason = CASE WHEN status = 'pending' THEN $4 ELSE $5 END
                WHERE (status = 'pending' AND requested_at < $2)
                   OR (status = 'approved' AND approved_at < $3)
                RETURNING *
            )
            SELECT {}
            FROM expired br
            JOIN books b ON b.id = br.book_id
            JOIN users u ON u.id = br.user_id
            "#,
            DETAILS_COLUMNS
        );
        let rows = sqlx::query_as::<_, BorrowingDetails>(&query)
            .bind(now)
            .bind(pending_cutoff)
            .bind(pickup_cutoff)
            .bind(PENDING_EXPIRED_REASON)
            .bind(PICKUP_EXPIRED_REASON)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Flag overdue loans that have not been notified yet and return them
    pub async fn claim_overdue_unnotified(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let query = format!(
            r#"
            WITH claimed AS (
                UPDATE borrowings SET overdue_notified = TRUE
                WHERE status IN ('borrowed', 'return_requested')
                  AND due_at < $1
                  AND NOT overdue_notified
                RETURNING *
            )
            SELECT {}
            FROM claimed br
            JOIN books b ON b.id = br.book_id
            JOIN users u ON u.id = br.user_id
            "#,
            DETAILS_COLUMNS
        );
        let rows = sqlx::query_as::<_, BorrowingDetails>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Borrowing count per status
    pub async fn count_by_status(&self) -> AppResult<Vec<(BorrowingStatus, i64)>> {
        let rows = sqlx::query_as::<_, (BorrowingStatus, i64)>(
            "SELECT status, COUNT(*) FROM borrowings GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Overdue loans, optionally for one user
    pub async fn count_overdue(&self, user_id: Option<i32>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM borrowings
            WHERE status IN ('borrowed', 'return_requested')
              AND due_at < NOW()
              AND ($1::int IS NULL OR user_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Sum of assessed fines not yet paid, library-wide
    pub async fn outstanding_fines(&self) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(fine_amount), 0) FROM borrowings WHERE status = 'returned' AND NOT fine_paid",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    /// Most borrowed books (loans that actually left the shelf)
    pub async fn top_books(&self, limit: i64) -> AppResult<Vec<TopBook>> {
        let rows = sqlx::query_as::<_, TopBook>(
            r#"
            SELECT b.id AS book_id, b.title, b.author, COUNT(*) AS loans
            FROM borrowings br
            JOIN books b ON b.id = br.book_id
            WHERE br.status IN ('borrowed', 'return_requested', 'returned')
            GROUP BY b.id, b.title, b.author
            ORDER BY loans DESC, b.title
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
