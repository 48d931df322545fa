//! Book review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Review with the reviewer's public name
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Review {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    /// 1 to 5 stars
    pub rating: i16,
    pub comment: Option<String>,
    pub reviewer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create or edit review request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReviewInput {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(max = 2000, message = "Comment is limited to 2000 characters"))]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_one_to_five() {
        let ok = ReviewInput { rating: 5, comment: None };
        assert!(ok.validate().is_ok());
        let zero = ReviewInput { rating: 0, comment: None };
        assert!(zero.validate().is_err());
        let six = ReviewInput { rating: 6, comment: Some("great".into()) };
        assert!(six.validate().is_err());
    }

    #[test]
    fn long_comments_are_rejected() {
        let input = ReviewInput {
            rating: 3,
            comment: Some("x".repeat(2001)),
        };
        assert!(input.validate().is_err());
    }
}
