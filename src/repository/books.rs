//! Books repository for catalog operations

use chrono::Utc;
use sqlx::{Pool, Postgres};

use super::is_unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookDetails, BookQuery, CreateBook, UpdateBook},
};

/// Book columns plus availability, holds and rating aggregates.
///
/// Append `WHERE`, `ORDER BY` and `LIMIT` clauses as needed; the aggregates
/// are exposed as `o.out_count` and `o.holds` for filtering.
pub(crate) const BOOK_DETAILS_SELECT: &str = r#"
    SELECT b.*,
           (b.stock - COALESCE(o.out_count, 0))::bigint AS available,
           COALESCE(o.holds, 0)::bigint AS holds,
           r.average_rating,
           COALESCE(r.review_count, 0)::bigint AS review_count
    FROM books b
    LEFT JOIN LATERAL (
        SELECT COUNT(*) FILTER (WHERE br.status IN ('borrowed', 'return_requested')) AS out_count,
               COUNT(*) FILTER (WHERE br.status = 'approved') AS holds
        FROM borrowings br
        WHERE br.book_id = b.id
    ) o ON TRUE
    LEFT JOIN LATERAL (
        SELECT AVG(rv.rating)::float8 AS average_rating, COUNT(*) AS review_count
        FROM reviews rv
        WHERE rv.book_id = b.id
    ) r ON TRUE
"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

fn map_isbn_conflict(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict("A book with this ISBN already exists".to_string())
    } else {
        AppError::Database(e)
    }
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get book with availability and rating
    pub async fn get_details(&self, id: i32) -> AppResult<BookDetails> {
        let query = format!("{} WHERE b.id = $1", BOOK_DETAILS_SELECT);
        sqlx::query_as::<_, BookDetails>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Search the catalog with pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<BookDetails>, i64)> {
        let pagination = query.pagination();

        let mut conditions = Vec::new();
        let mut idx = 1;

        if query.q.is_some() {
            conditions.push(format!(
                "(b.title ILIKE ${0} OR b.author ILIKE ${0} OR b.isbn ILIKE ${0})",
                idx
            ));
            idx += 1;
        }
        if query.category.is_some() {
            conditions.push(format!("LOWER(b.category) = LOWER(${})", idx));
        }
        if query.available_only.unwrap_or(false) {
            conditions.push("b.stock - COALESCE(o.out_count, 0) > 0".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let pattern = query
            .q
            .as_ref()
            .map(|q| format!("%{}%", q.trim().replace('%', "\\%").replace('_', "\\_")));

        let count_query = format!(
            "SELECT COUNT(*) FROM ({} {}) AS matches",
            BOOK_DETAILS_SELECT, where_clause
        );
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(ref p) = pattern { count_builder = count_builder.bind(p); }
        if let Some(ref c) = query.category { count_builder = count_builder.bind(c); }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_query = format!(
            "{} {} ORDER BY b.title, b.id LIMIT {} OFFSET {}",
            BOOK_DETAILS_SELECT,
            where_clause,
            pagination.per_page(),
            pagination.offset()
        );
        let mut builder = sqlx::query_as::<_, BookDetails>(&select_query);
        if let Some(ref p) = pattern { builder = builder.bind(p); }
        if let Some(ref c) = query.category { builder = builder.bind(c); }
        let books = builder.fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Create a book; `isbn` must already be normalized
    pub async fn create(&self, data: &CreateBook, isbn: Option<String>) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                title, author, isbn, category, publisher,
                published_year, description, cover_url, stock
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.title.trim())
        .bind(data.author.trim())
        .bind(isbn)
        .bind(&data.category)
        .bind(&data.publisher)
        .bind(data.published_year)
        .bind(&data.description)
        .bind(&data.cover_url)
        .bind(data.stock.unwrap_or(1))
        .fetch_one(&self.pool)
        .await
        .map_err(map_isbn_conflict)
    }

    /// Update a book. Lowering `stock` below the copies out or on hold is refused.
    pub async fn update(&self, id: i32, data: &UpdateBook, isbn: Option<String>) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so concurrent checkouts see a consistent stock
        let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        // Approved holds count: each one is promised a copy at checkout
        if let Some(stock) = data.stock {
            let reserved: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM borrowings
                WHERE book_id = $1 AND status IN ('approved', 'borrowed', 'return_requested')
                "#,
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if i64::from(stock) < reserved {
                return Err(AppError::BusinessRule(format!(
                    "Stock cannot be lowered to {} while {} copies are checked out or on hold",
                    stock, reserved
                )));
            }
        }

        let mut sets = vec!["updated_at = $1".to_string()];
        let mut idx = 2;

        macro_rules! add_f {
            ($field:expr, $name:expr) => {
                if $field.is_some() { sets.push(format!("{} = ${}", $name, idx)); idx += 1; }
            };
        }

        add_f!(data.title, "title");
        add_f!(data.author, "author");
        add_f!(isbn, "isbn");
        add_f!(data.category, "category");
        add_f!(data.publisher, "publisher");
        add_f!(data.published_year, "published_year");
        add_f!(data.description, "description");
        add_f!(data.cover_url, "cover_url");
        add_f!(data.stock, "stock");

        let query = format!(
            "UPDATE books SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            idx
        );
        let mut builder = sqlx::query_as::<_, Book>(&query).bind(Utc::now());

        macro_rules! bind_f {
            ($field:expr) => {
                if let Some(ref v) = $field { builder = builder.bind(v); }
            };
        }

        bind_f!(data.title);
        bind_f!(data.author);
        bind_f!(isbn);
        bind_f!(data.category);
        bind_f!(data.publisher);
        bind_f!(data.published_year);
        bind_f!(data.description);
        bind_f!(data.cover_url);
        bind_f!(data.stock);

        let book = builder
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_isbn_conflict)?;

        tx.commit().await?;
        Ok(book)
    }

    /// Delete a book together with its closed borrowing history
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let open: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM borrowings
            WHERE book_id = $1
              AND status IN ('pending', 'approved', 'borrowed', 'return_requested')
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if open > 0 {
            return Err(AppError::Conflict(format!(
                "Book has {} open borrowing(s) and cannot be deleted",
                open
            )));
        }

        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Distinct non-empty categories
    pub async fn categories(&self) -> AppResult<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT category FROM books
            WHERE category IS NOT NULL AND category <> ''
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// (titles, copies) across the catalog
    pub async fn totals(&self) -> AppResult<(i64, i64)> {
        let totals = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(stock), 0)::bigint FROM books",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }
}
