//! Dashboard aggregates

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::borrowing::BorrowingDetails;

/// A book ranked by number of loans
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TopBook {
    pub book_id: i32,
    pub title: String,
    pub author: String,
    pub loans: i64,
}

/// Library-wide figures for staff
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminDashboard {
    pub total_books: i64,
    pub total_copies: i64,
    pub copies_out: i64,
    /// Account count per role, in role order
    #[schema(value_type = Object)]
    pub users_by_role: IndexMap<String, i64>,
    /// Borrowing count per status, in lifecycle order
    #[schema(value_type = Object)]
    pub borrowings_by_status: IndexMap<String, i64>,
    pub overdue: i64,
    #[serde(with = "super::money")]
    #[schema(value_type = String, example = "12.50")]
    pub outstanding_fines: Decimal,
    pub pending_reset_requests: i64,
    pub top_books: Vec<TopBook>,
}

/// Personal figures for the signed-in user
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserDashboard {
    pub open_borrowings: Vec<BorrowingDetails>,
    pub overdue: i64,
    /// Assessed unpaid fines plus fines accruing on overdue loans
    #[serde(with = "super::money")]
    #[schema(value_type = String, example = "1.50")]
    pub fines_due: Decimal,
    pub unread_messages: i64,
    pub favorites: i64,
}
