//! Borrowing model and the circulation lifecycle
//!
//! ```text
//! pending ─approve─▶ approved ─checkout─▶ borrowed ─request_return─▶ return_requested
//!    │                  │                    │                              │
//!    └─reject/cancel────┴──▶ rejected        └────────confirm_return────────┴──▶ returned
//! ```
//!
//! Staff may also confirm a return straight from `borrowed` (desk check-in).

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::{money, Pagination};
use crate::error::AppError;

/// Borrowing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BorrowingStatus {
    Pending,
    Approved,
    Borrowed,
    ReturnRequested,
    Returned,
    Rejected,
}

impl BorrowingStatus {
    pub const ALL: [BorrowingStatus; 6] = [
        BorrowingStatus::Pending,
        BorrowingStatus::Approved,
        BorrowingStatus::Borrowed,
        BorrowingStatus::ReturnRequested,
        BorrowingStatus::Returned,
        BorrowingStatus::Rejected,
    ];

    /// Statuses that keep a physical copy away from the shelf
    pub const CHECKED_OUT: [BorrowingStatus; 2] =
        [BorrowingStatus::Borrowed, BorrowingStatus::ReturnRequested];

    /// Statuses counted against a user's borrowing quota
    pub const OPEN: [BorrowingStatus; 4] = [
        BorrowingStatus::Pending,
        BorrowingStatus::Approved,
        BorrowingStatus::Borrowed,
        BorrowingStatus::ReturnRequested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Pending => "pending",
            BorrowingStatus::Approved => "approved",
            BorrowingStatus::Borrowed => "borrowed",
            BorrowingStatus::ReturnRequested => "return_requested",
            BorrowingStatus::Returned => "returned",
            BorrowingStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BorrowingStatus::Returned | BorrowingStatus::Rejected)
    }

    pub fn is_checked_out(&self) -> bool {
        Self::CHECKED_OUT.contains(self)
    }

    /// Whether the lifecycle allows moving from `self` to `to`
    pub fn can_transition(&self, to: BorrowingStatus) -> bool {
        use BorrowingStatus::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Borrowed)
                | (Approved, Rejected)
                | (Borrowed, ReturnRequested)
                | (Borrowed, Returned)
                | (ReturnRequested, Returned)
        )
    }

    /// String forms of a status set, for `status = ANY($n)` binds
    pub fn names(statuses: &[BorrowingStatus]) -> Vec<String> {
        statuses.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl std::str::FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BorrowingStatus::Pending),
            "approved" => Ok(BorrowingStatus::Approved),
            "borrowed" => Ok(BorrowingStatus::Borrowed),
            "return_requested" => Ok(BorrowingStatus::ReturnRequested),
            "returned" => Ok(BorrowingStatus::Returned),
            "rejected" => Ok(BorrowingStatus::Rejected),
            _ => Err(format!("Invalid borrowing status: {}", s)),
        }
    }
}

impl_text_enum!(BorrowingStatus);

/// Who may trigger an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Owner,
    Staff,
}

/// A lifecycle action applied to an existing borrowing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowingAction {
    Cancel,
    Approve,
    Reject,
    Checkout,
    RequestReturn,
    ConfirmReturn,
}

impl BorrowingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingAction::Cancel => "cancel",
            BorrowingAction::Approve => "approve",
            BorrowingAction::Reject => "reject",
            BorrowingAction::Checkout => "checkout",
            BorrowingAction::RequestReturn => "request_return",
            BorrowingAction::ConfirmReturn => "confirm_return",
        }
    }

    pub fn actor(&self) -> Actor {
        match self {
            BorrowingAction::Cancel | BorrowingAction::RequestReturn => Actor::Owner,
            _ => Actor::Staff,
        }
    }

    /// Statuses the borrowing must currently be in
    pub fn allowed_from(&self) -> &'static [BorrowingStatus] {
        use BorrowingStatus::*;
        match self {
            BorrowingAction::Cancel => &[Pending, Approved],
            BorrowingAction::Approve => &[Pending],
            BorrowingAction::Reject => &[Pending, Approved],
            BorrowingAction::Checkout => &[Approved],
            BorrowingAction::RequestReturn => &[Borrowed],
            BorrowingAction::ConfirmReturn => &[Borrowed, ReturnRequested],
        }
    }

    pub fn target(&self) -> BorrowingStatus {
        match self {
            BorrowingAction::Cancel | BorrowingAction::Reject => BorrowingStatus::Rejected,
            BorrowingAction::Approve => BorrowingStatus::Approved,
            BorrowingAction::Checkout => BorrowingStatus::Borrowed,
            BorrowingAction::RequestReturn => BorrowingStatus::ReturnRequested,
            BorrowingAction::ConfirmReturn => BorrowingStatus::Returned,
        }
    }

    /// Validate that `current` accepts this action
    pub fn check(&self, current: BorrowingStatus) -> Result<(), AppError> {
        if self.allowed_from().contains(&current) && current.can_transition(self.target()) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "Cannot {} a borrowing that is {}",
                self.as_str().replace('_', " "),
                current
            )))
        }
    }
}

/// Check a requested loan duration against the configured bounds
pub fn validate_duration(days: i32, min: i32, max: i32) -> Result<(), AppError> {
    if (min..=max).contains(&days) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Borrow duration must be between {} and {} days (got {})",
            min, max, days
        )))
    }
}

/// Due date for a loan starting at `from`
pub fn due_date(from: DateTime<Utc>, duration_days: i32) -> DateTime<Utc> {
    from + Duration::days(i64::from(duration_days))
}

/// Whole days elapsed past `due_at` at instant `at`; partial days are not counted
pub fn days_overdue(due_at: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    if at <= due_at {
        0
    } else {
        (at - due_at).num_days()
    }
}

/// Fine owed for returning at `at` a loan due at `due_at`
pub fn compute_fine(due_at: DateTime<Utc>, at: DateTime<Utc>, fine_per_day: Decimal) -> Decimal {
    money::normalize(Decimal::from(days_overdue(due_at, at)) * fine_per_day)
}

/// Borrowing row from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrowing {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub status: BorrowingStatus,
    pub duration_days: i32,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub borrowed_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub return_requested_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Fine assessed when the copy came back
    #[serde(with = "super::money")]
    #[schema(value_type = String, example = "1.50")]
    pub fine_amount: Decimal,
    pub fine_paid: bool,
    pub overdue_notified: bool,
    pub handled_by: Option<i32>,
}

impl Borrowing {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_checked_out() && self.due_at.map(|d| d < now).unwrap_or(false)
    }

    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        match (self.status.is_checked_out(), self.due_at) {
            (true, Some(due)) => days_overdue(due, now),
            _ => 0,
        }
    }

    /// Assessed fine once returned, otherwise the fine accrued so far
    pub fn current_fine(&self, now: DateTime<Utc>, fine_per_day: Decimal) -> Decimal {
        match (self.status, self.due_at) {
            (BorrowingStatus::Returned, _) => money::normalize(self.fine_amount),
            (s, Some(due)) if s.is_checked_out() => compute_fine(due, now, fine_per_day),
            _ => money::normalize(Decimal::ZERO),
        }
    }

    pub fn has_unpaid_fine(&self) -> bool {
        self.fine_amount > Decimal::ZERO && !self.fine_paid
    }
}

/// Borrowing joined with book and borrower, plus computed overdue data
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowingDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub borrowing: Borrowing,
    pub book_title: String,
    pub book_author: String,
    pub user_login: String,
    pub user_name: Option<String>,
    #[sqlx(skip)]
    pub is_overdue: bool,
    #[sqlx(skip)]
    pub days_overdue: i64,
    #[sqlx(skip)]
    #[serde(with = "super::money")]
    #[schema(value_type = String, example = "0.00")]
    pub current_fine: Decimal,
}

impl BorrowingDetails {
    /// Fill the computed fields for instant `now`
    pub fn with_computed(mut self, now: DateTime<Utc>, fine_per_day: Decimal) -> Self {
        self.is_overdue = self.borrowing.is_overdue(now);
        self.days_overdue = self.borrowing.days_overdue(now);
        self.current_fine = self.borrowing.current_fine(now, fine_per_day);
        self
    }
}

/// Borrow request
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBorrowing {
    pub book_id: i32,
    /// Loan length in days; defaults to the library's default duration
    pub duration_days: Option<i32>,
}

/// Optional reason attached to reject/cancel
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TransitionNote {
    pub reason: Option<String>,
}

/// Staff listing filters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BorrowingQuery {
    pub status: Option<BorrowingStatus>,
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    /// Only checked-out borrowings past their due date
    pub overdue: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BorrowingQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}
