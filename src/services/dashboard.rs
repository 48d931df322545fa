//! Aggregate figures for staff and for individual readers

use chrono::Utc;
use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::{
    config::LibraryConfig,
    error::AppResult,
    models::{
        borrowing::BorrowingStatus,
        dashboard::{AdminDashboard, UserDashboard},
        user::Role,
    },
    repository::Repository,
};

const TOP_BOOKS_LIMIT: i64 = 10;

#[derive(Clone)]
pub struct DashboardService {
    repository: Repository,
    rules: LibraryConfig,
}

/// Fill every key in `order`, zero when missing from `counts`
fn ordered_counts<K: PartialEq + std::fmt::Display>(order: &[K], counts: &[(K, i64)]) -> IndexMap<String, i64> {
    order
        .iter()
        .map(|key| {
            let count = counts
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            (key.to_string(), count)
        })
        .collect()
}

impl DashboardService {
    pub fn new(repository: Repository, rules: LibraryConfig) -> Self {
        Self { repository, rules }
    }

    pub async fn admin(&self) -> AppResult<AdminDashboard> {
        let (total_books, total_copies) = self.repository.books.totals().await?;
        let by_status = self.repository.borrowings.count_by_status().await?;
        let by_role = self.repository.users.count_by_role().await?;

        let copies_out = by_status
            .iter()
            .filter(|(status, _)| status.is_checked_out())
            .map(|(_, n)| n)
            .sum();

        Ok(AdminDashboard {
            total_books,
            total_copies,
            copies_out,
            users_by_role: ordered_counts(&[Role::User, Role::Staff, Role::Admin], &by_role),
            borrowings_by_status: ordered_counts(&BorrowingStatus::ALL, &by_status),
            overdue: self.repository.borrowings.count_overdue(None).await?,
            outstanding_fines: self.repository.borrowings.outstanding_fines().await?,
            pending_reset_requests: self.repository.password_resets.count_pending().await?,
            top_books: self.repository.borrowings.top_books(TOP_BOOKS_LIMIT).await?,
        })
    }

    pub async fn for_user(&self, user_id: i32) -> AppResult<UserDashboard> {
        let now = Utc::now();
        let open_borrowings: Vec<_> = self
            .repository
            .borrowings
            .list_open_for_user(user_id)
            .await?
            .into_iter()
            .map(|d| d.with_computed(now, self.rules.fine_per_day))
            .collect();

        let overdue = open_borrowings.iter().filter(|d| d.is_overdue).count() as i64;
        let accruing: Decimal = open_borrowings.iter().map(|d| d.current_fine).sum();
        let assessed = self.repository.borrowings.unpaid_fines_for_user(user_id).await?;

        Ok(UserDashboard {
            open_borrowings,
            overdue,
            fines_due: assessed + accruing,
            unread_messages: self.repository.messages.unread_count(user_id).await?,
            favorites: self.repository.favorites.count(user_id).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_statuses_are_reported_as_zero_in_lifecycle_order() {
        let counts = vec![(BorrowingStatus::Returned, 7), (BorrowingStatus::Pending, 2)];
        let map = ordered_counts(&BorrowingStatus::ALL, &counts);

        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(
            keys,
            ["pending", "approved", "borrowed", "return_requested", "returned", "rejected"]
        );
        assert_eq!(map["pending"], 2);
        assert_eq!(map["returned"], 7);
        assert_eq!(map["approved"], 0);
    }

    #[test]
    fn roles_are_listed_from_least_to_most_privileged() {
        let map = ordered_counts(&[Role::User, Role::Staff, Role::Admin], &[(Role::Admin, 1)]);
        assert_eq!(map.keys().collect::<Vec<_>>(), ["user", "staff", "admin"]);
        assert_eq!(map["admin"], 1);
        assert_eq!(map["user"], 0);
    }
}
