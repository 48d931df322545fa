//! Borrowing lifecycle: requests, staff decisions, returns and fines

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{messages::MessagesService, sweeper::SweepCutoffs};
use crate::{
    config::LibraryConfig,
    error::{AppError, AppResult},
    models::{
        borrowing::{
            compute_fine, due_date, validate_duration, Actor, Borrowing, BorrowingAction,
            BorrowingDetails, BorrowingQuery, CreateBorrowing,
        },
        message::{MessageKind, NewMessage},
        money,
        user::UserClaims,
        Pagination,
    },
    repository::{borrowings::TransitionFields, Repository},
};

/// Outcome of one sweeper pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_requests: usize,
    pub expired_holds: usize,
    pub overdue_notices: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone)]
pub struct BorrowingsService {
    repository: Repository,
    messages: MessagesService,
    rules: LibraryConfig,
}

impl BorrowingsService {
    pub fn new(repository: Repository, messages: MessagesService, rules: LibraryConfig) -> Self {
        Self { repository, messages, rules }
    }

    pub fn rules(&self) -> &LibraryConfig {
        &self.rules
    }

    fn computed(&self, details: BorrowingDetails, now: DateTime<Utc>) -> BorrowingDetails {
        details.with_computed(now, self.rules.fine_per_day)
    }

    fn computed_all(&self, rows: Vec<BorrowingDetails>) -> Vec<BorrowingDetails> {
        let now = Utc::now();
        rows.into_iter().map(|d| self.computed(d, now)).collect()
    }

    /// File a borrow request. It waits in `pending` even when no copy is
    /// free, acting as a reservation.
    pub async fn request(&self, user_id: i32, data: CreateBorrowing) -> AppResult<BorrowingDetails> {
        let days = data.duration_days.unwrap_or(self.rules.default_borrow_days);
        validate_duration(days, self.rules.min_borrow_days, self.rules.max_borrow_days)?;

        let user = self.repository.users.get_by_id(user_id).await?;
        if user.is_blocked() {
            return Err(AppError::Authorization("Account is blocked".to_string()));
        }

        self.repository.books.get_by_id(data.book_id).await?;

        let unpaid = self.repository.borrowings.unpaid_fines_for_user(user_id).await?;
        if unpaid > Decimal::ZERO {
            return Err(AppError::BusinessRule(format!(
                "Outstanding fines of {} must be paid before borrowing",
                money::normalize(unpaid)
            )));
        }

        let open = self.repository.borrowings.count_open_for_user(user_id).await?;
        if open >= self.rules.max_active_borrowings {
            return Err(AppError::BusinessRule(format!(
                "Borrowing limit reached ({} open borrowings)",
                self.rules.max_active_borrowings
            )));
        }

        let created = self
            .repository
            .borrowings
            .create(user_id, data.book_id, days)
            .await?;

        tracing::info!(
            borrowing_id = created.id,
            user_id,
            book_id = data.book_id,
            duration_days = days,
            "borrow requested"
        );

        let details = self.repository.borrowings.get_details(created.id).await?;
        Ok(self.computed(details, Utc::now()))
    }

    /// Get one borrowing; owners see their own, staff see all
    pub async fn get(&self, claims: &UserClaims, id: i32) -> AppResult<BorrowingDetails> {
        let details = self.repository.borrowings.get_details(id).await?;
        claims.require_self_or_staff(details.borrowing.user_id)?;
        Ok(self.computed(details, Utc::now()))
    }

    /// Staff listing with filters
    pub async fn list(&self, query: &BorrowingQuery) -> AppResult<(Vec<BorrowingDetails>, i64)> {
        let (rows, total) = self.repository.borrowings.list(query).await?;
        Ok((self.computed_all(rows), total))
    }

    /// The caller's own borrowings; any `user_id` filter is overridden
    pub async fn list_for_user(
        &self,
        user_id: i32,
        mut query: BorrowingQuery,
    ) -> AppResult<(Vec<BorrowingDetails>, i64)> {
        query.user_id = Some(user_id);
        self.list(&query).await
    }

    pub async fn list_overdue(&self, pagination: Pagination) -> AppResult<(Vec<BorrowingDetails>, i64)> {
        let query = BorrowingQuery {
            overdue: Some(true),
            page: pagination.page,
            per_page: pagination.per_page,
            ..Default::default()
        };
        self.list(&query).await
    }

    /// Apply a lifecycle action on behalf of `claims`
    pub async fn apply(
        &self,
        claims: &UserClaims,
        id: i32,
        action: BorrowingAction,
        reason: Option<String>,
    ) -> AppResult<BorrowingDetails> {
        let current = self.repository.borrowings.get_by_id(id).await?;

        match action.actor() {
            Actor::Owner if current.user_id != claims.user_id => {
                return Err(AppError::Authorization(
                    "Only the borrower can do this".to_string(),
                ))
            }
            Actor::Staff => claims.require_staff()?,
            Actor::Owner => {}
        }

        action.check(current.status)?;

        let now = Utc::now();
        let fields = transition_fields(action, &current, claims.user_id, reason, now, self.rules.fine_per_day);

        let updated = match action {
            BorrowingAction::Approve => {
                self.repository
                    .borrowings
                    .approve(id, current.book_id, fields)
                    .await?
            }
            BorrowingAction::Checkout => {
                self.repository
                    .borrowings
                    .checkout(id, current.book_id, fields)
                    .await?
            }
            _ => {
                self.repository
                    .borrowings
                    .transition(id, action.allowed_from(), action.target(), fields)
                    .await?
            }
        }
        .ok_or_else(|| {
            AppError::InvalidTransition(
                "Borrowing was changed by someone else, reload and retry".to_string(),
            )
        })?;

        tracing::info!(
            borrowing_id = id,
            user_id = updated.user_id,
            from = %current.status,
            to = %updated.status,
            action = action.as_str(),
            by = claims.user_id,
            "borrowing status changed"
        );

        let details = self.computed(self.repository.borrowings.get_details(id).await?, now);
        if let Some(notice) = self.transition_notice(action, &details) {
            self.messages.notify(notice).await;
        }
        Ok(details)
    }

    /// Settle the fine assessed on a returned borrowing
    pub async fn pay_fine(&self, claims: &UserClaims, id: i32) -> AppResult<BorrowingDetails> {
        claims.require_staff()?;
        let current = self.repository.borrowings.get_by_id(id).await?;

        if !current.has_unpaid_fine() {
            return Err(AppError::BusinessRule("This borrowing has no unpaid fine".to_string()));
        }

        self.repository
            .borrowings
            .mark_fine_paid(id, claims.user_id)
            .await?
            .ok_or_else(|| AppError::Conflict("Fine was already settled".to_string()))?;

        tracing::info!(borrowing_id = id, user_id = current.user_id, amount = %current.fine_amount, "fine paid");

        let details = self.repository.borrowings.get_details(id).await?;
        Ok(self.computed(details, Utc::now()))
    }

    /// Message sent to the borrower after a staff action
    fn transition_notice(&self, action: BorrowingAction, details: &BorrowingDetails) -> Option<NewMessage> {
        let b = &details.borrowing;
        let title = &details.book_title;
        let (subject, body) = match action {
            BorrowingAction::Approve => (
                "Borrow request approved".to_string(),
                format!(
                    "Your request for \"{}\" was approved. Please pick it up within {} hours.",
                    title, self.rules.pickup_window_hours
                ),
            ),
            BorrowingAction::Reject => (
                "Borrow request rejected".to_string(),
                match b.rejection_reason {
                    Some(ref reason) => format!("Your request for \"{}\" was rejected: {}", title, reason),
                    None => format!("Your request for \"{}\" was rejected.", title),
                },
            ),
            BorrowingAction::Checkout => (
                "Book checked out".to_string(),
                format!(
                    "You borrowed \"{}\". It is due on {}.",
                    title,
                    b.due_at.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
                ),
            ),
            BorrowingAction::ConfirmReturn if b.fine_amount > Decimal::ZERO => (
                "Return confirmed, fine due".to_string(),
                format!(
                    "\"{}\" was returned late. A fine of {} is due.",
                    title,
                    money::normalize(b.fine_amount)
                ),
            ),
            BorrowingAction::ConfirmReturn => (
                "Return confirmed".to_string(),
                format!("Thank you for returning \"{}\".", title),
            ),
            BorrowingAction::Cancel | BorrowingAction::RequestReturn => return None,
        };
        Some(NewMessage::notice(b.user_id, MessageKind::Borrowing, subject, body))
    }

    /// Cancel stale requests and holds, then notify new overdue loans
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let cutoffs = SweepCutoffs::at(now, &self.rules);
        let mut report = SweepReport::default();

        let expired = self
            .repository
            .borrowings
            .expire_stale(now, cutoffs.pending_before, cutoffs.pickup_before)
            .await?;

        for details in &expired {
            let from = if details.borrowing.approved_at.is_some() {
                report.expired_holds += 1;
                "approved"
            } else {
                report.expired_requests += 1;
                "pending"
            };
            tracing::info!(
                borrowing_id = details.borrowing.id,
                user_id = details.borrowing.user_id,
                from,
                to = "rejected",
                "borrowing expired"
            );
            let body = format!(
                "Your request for \"{}\" was cancelled: {}.",
                details.book_title,
                details.borrowing.rejection_reason.as_deref().unwrap_or("expired")
            );
            self.messages
                .notify(NewMessage::notice(
                    details.borrowing.user_id,
                    MessageKind::Borrowing,
                    "Borrow request cancelled",
                    body,
                ))
                .await;
        }

        let overdue = self.repository.borrowings.claim_overdue_unnotified(now).await?;
        for details in overdue {
            let details = self.computed(details, now);
            let body = format!(
                "\"{}\" was due on {}. A fine of {} per day applies until it is returned.",
                details.book_title,
                details
                    .borrowing
                    .due_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                self.rules.fine_per_day
            );
            self.messages
                .notify(NewMessage::notice(
                    details.borrowing.user_id,
                    MessageKind::Overdue,
                    "Book overdue",
                    body,
                ))
                .await;
            report.overdue_notices += 1;
        }

        Ok(report)
    }
}

/// Columns written alongside a status change
fn transition_fields(
    action: BorrowingAction,
    current: &Borrowing,
    actor_id: i32,
    reason: Option<String>,
    now: DateTime<Utc>,
    fine_per_day: Decimal,
) -> TransitionFields {
    let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    match action {
        BorrowingAction::Cancel => TransitionFields {
            rejected_at: Some(now),
            rejection_reason: Some(reason.unwrap_or_else(|| "Cancelled by user".to_string())),
            ..Default::default()
        },
        BorrowingAction::Approve => TransitionFields {
            approved_at: Some(now),
            handled_by: Some(actor_id),
            ..Default::default()
        },
        BorrowingAction::Reject => TransitionFields {
            rejected_at: Some(now),
            rejection_reason: reason,
            handled_by: Some(actor_id),
            ..Default::default()
        },
        BorrowingAction::Checkout => TransitionFields {
            borrowed_at: Some(now),
            due_at: Some(due_date(now, current.duration_days)),
            handled_by: Some(actor_id),
            ..Default::default()
        },
        BorrowingAction::RequestReturn => TransitionFields {
            return_requested_at: Some(now),
            ..Default::default()
        },
        BorrowingAction::ConfirmReturn => TransitionFields {
            returned_at: Some(now),
            fine_amount: Some(
                current
                    .due_at
                    .map(|due| compute_fine(due, now, fine_per_day))
                    .unwrap_or(Decimal::ZERO),
            ),
            handled_by: Some(actor_id),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::borrowing::BorrowingStatus;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
    }

    fn rate() -> Decimal {
        Decimal::new(50, 2)
    }

    fn borrowing(status: BorrowingStatus, due_at: Option<DateTime<Utc>>) -> Borrowing {
        Borrowing {
            id: 10,
            user_id: 3,
            book_id: 4,
            status,
            duration_days: 21,
            requested_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            approved_at: None,
            borrowed_at: None,
            due_at,
            return_requested_at: None,
            returned_at: None,
            rejected_at: None,
            rejection_reason: None,
            fine_amount: Decimal::ZERO,
            fine_paid: false,
            overdue_notified: false,
            handled_by: None,
        }
    }

    #[test]
    fn checkout_sets_due_date_from_requested_duration() {
        let current = borrowing(BorrowingStatus::Approved, None);
        let fields = transition_fields(BorrowingAction::Checkout, &current, 1, None, now(), rate());
        assert_eq!(fields.borrowed_at, Some(now()));
        assert_eq!(fields.due_at, Some(now() + Duration::days(21)));
        assert_eq!(fields.handled_by, Some(1));
    }

    #[test]
    fn late_return_assesses_fine() {
        let current = borrowing(BorrowingStatus::ReturnRequested, Some(now() - Duration::days(4)));
        let fields = transition_fields(BorrowingAction::ConfirmReturn, &current, 1, None, now(), rate());
        assert_eq!(fields.returned_at, Some(now()));
        assert_eq!(fields.fine_amount, Some(Decimal::new(200, 2)));
    }

    #[test]
    fn on_time_return_has_no_fine() {
        let current = borrowing(BorrowingStatus::Borrowed, Some(now() + Duration::days(2)));
        let fields = transition_fields(BorrowingAction::ConfirmReturn, &current, 1, None, now(), rate());
        assert_eq!(fields.fine_amount, Some(Decimal::ZERO));
    }

    #[test]
    fn cancel_records_default_reason() {
        let current = borrowing(BorrowingStatus::Pending, None);
        let fields = transition_fields(BorrowingAction::Cancel, &current, 3, Some("  ".to_string()), now(), rate());
        assert_eq!(fields.rejected_at, Some(now()));
        assert_eq!(fields.rejection_reason.as_deref(), Some("Cancelled by user"));
        assert_eq!(fields.handled_by, None);
    }

    #[test]
    fn reject_keeps_staff_reason() {
        let current = borrowing(BorrowingStatus::Pending, None);
        let fields = transition_fields(
            BorrowingAction::Reject,
            &current,
            2,
            Some("Damaged copy".to_string()),
            now(),
            rate(),
        );
        assert_eq!(fields.rejection_reason.as_deref(), Some("Damaged copy"));
        assert_eq!(fields.handled_by, Some(2));
    }

    #[test]
    fn empty_sweep_report() {
        assert!(SweepReport::default().is_empty());
        let report = SweepReport { overdue_notices: 1, ..Default::default() };
        assert!(!report.is_empty());
    }
}
