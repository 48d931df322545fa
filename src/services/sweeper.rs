//! Background task cancelling stale borrowings and flagging overdue loans

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use super::borrowings::BorrowingsService;
use crate::config::LibraryConfig;

/// Instants before which open requests are considered stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepCutoffs {
    /// Pending requests filed before this are cancelled
    pub pending_before: DateTime<Utc>,
    /// Approved holds granted before this are cancelled
    pub pickup_before: DateTime<Utc>,
}

impl SweepCutoffs {
    pub fn at(now: DateTime<Utc>, rules: &LibraryConfig) -> Self {
        Self {
            pending_before: now - Duration::hours(rules.pending_expiry_hours),
            pickup_before: now - Duration::hours(rules.pickup_window_hours),
        }
    }
}

/// Run a sweep every `sweep_interval_seconds` until the runtime shuts down
pub fn spawn(service: BorrowingsService) -> JoinHandle<()> {
    let period = StdDuration::from_secs(service.rules().sweep_interval_seconds);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_seconds = period.as_secs(), "borrowing sweeper started");

        loop {
            ticker.tick().await;
            match service.sweep(Utc::now()).await {
                Ok(report) if report.is_empty() => tracing::debug!("sweep: nothing to do"),
                Ok(report) => tracing::info!(
                    expired_requests = report.expired_requests,
                    expired_holds = report.expired_holds,
                    overdue_notices = report.overdue_notices,
                    "sweep completed"
                ),
                Err(e) => tracing::error!(error = %e, "sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoffs_follow_configured_windows() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let cutoffs = SweepCutoffs::at(now, &LibraryConfig::default());
        assert_eq!(cutoffs.pending_before, Utc.with_ymd_and_hms(2024, 5, 7, 12, 0, 0).unwrap());
        assert_eq!(cutoffs.pickup_before, Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap());
    }

    #[test]
    fn shorter_windows_move_cutoffs_forward() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let rules = LibraryConfig {
            pending_expiry_hours: 1,
            pickup_window_hours: 2,
            ..LibraryConfig::default()
        };
        let cutoffs = SweepCutoffs::at(now, &rules);
        assert_eq!(cutoffs.pending_before, now - Duration::hours(1));
        assert_eq!(cutoffs.pickup_before, now - Duration::hours(2));
        assert!(cutoffs.pending_before > cutoffs.pickup_before);
    }
}
