//! Book (catalog entry) model

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::Pagination;

/// Book row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub publisher: Option<String>,
    pub published_year: Option<i32>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    /// Copies owned by the library
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book with computed circulation data
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub book: Book,
    /// stock minus copies currently out (borrowed or awaiting return)
    pub available: i64,
    /// Approved requests waiting for pickup
    pub holds: i64,
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

/// Catalog search parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Free text over title, author and ISBN
    pub q: Option<String>,
    pub category: Option<String>,
    /// Only books with at least one copy on the shelf
    pub available_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 512, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author is required"))]
    pub author: String,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, max = 9999, message = "Invalid publication year"))]
    pub published_year: Option<i32>,
    pub description: Option<String>,
    #[validate(url(message = "Invalid cover URL"))]
    pub cover_url: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
}

/// Update book request (all fields optional)
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 512, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, max = 9999, message = "Invalid publication year"))]
    pub published_year: Option<i32>,
    pub description: Option<String>,
    #[validate(url(message = "Invalid cover URL"))]
    pub cover_url: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
}

/// Favorite toggle result
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FavoriteStatus {
    pub book_id: i32,
    pub favorited: bool,
}

static ISBN_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]").unwrap());
static ISBN_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").unwrap());

/// Strip separators, upper-case the check digit and verify the checksum.
///
/// Returns the compact form stored in the database.
pub fn normalize_isbn(raw: &str) -> Result<String, String> {
    let compact = ISBN_SEPARATORS.replace_all(raw.trim(), "").to_uppercase();
    if !ISBN_SHAPE.is_match(&compact) {
        return Err(format!("'{}' is not an ISBN-10 or ISBN-13", raw));
    }

    let valid = if compact.len() == 10 {
        isbn10_checksum_ok(&compact)
    } else {
        isbn13_checksum_ok(&compact)
    };

    if valid {
        Ok(compact)
    } else {
        Err(format!("ISBN '{}' has an invalid check digit", raw))
    }
}

fn isbn10_checksum_ok(isbn: &str) -> bool {
    let sum: u32 = isbn
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let value = if c == 'X' { 10 } else { c.to_digit(10).unwrap_or(0) };
            value * (10 - i as u32)
        })
        .sum();
    sum % 11 == 0
}

fn isbn13_checksum_ok(isbn: &str) -> bool {
    let sum: u32 = isbn
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hyphenated_isbn13() {
        assert_eq!(normalize_isbn("978-0-306-40615-7").unwrap(), "9780306406157");
    }

    #[test]
    fn accepts_isbn10_with_x_check_digit() {
        assert_eq!(normalize_isbn("0-8044-2957-x").unwrap(), "080442957X");
        assert_eq!(normalize_isbn("0 306 40615 2").unwrap(), "0306406152");
    }

    #[test]
    fn rejects_bad_check_digit() {
        assert!(normalize_isbn("978-0-306-40615-8").is_err());
        assert!(normalize_isbn("0306406153").is_err());
    }

    #[test]
    fn rejects_wrong_shape() {
        assert!(normalize_isbn("12345").is_err());
        assert!(normalize_isbn("97803064061X7").is_err());
        assert!(normalize_isbn("").is_err());
    }
}
