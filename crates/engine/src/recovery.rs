//! Recovery scanner — catches up rows whose due time passed by more than one
//! full interval (ticks were missed, typically because the process was
//! offline) and tells the subscriber once, instead of replaying a backlog of
//! reminders.
//!
//! Runs once at boot and on a slow periodic cadence, independent of the
//! per-subscriber due-check tick. Transient failures are per-row and never
//! abort the sweep; a rejection blocks the subscriber and skips their
//! remaining rows.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use herald_common::channel::{Channel, Ledger, SendError};
use herald_common::error::AppError;
use herald_common::types::{RecoveryNotice, SubscriberStatus};

use crate::status::SubscriberStatusManager;
use crate::store::ScheduleStore;

/// Finds and fast-forwards schedule rows with missed cycles.
pub struct RecoveryScanner;

impl RecoveryScanner {
    /// Sweep all Connected subscribers' rows. A row qualifies when at least
    /// one full cycle was missed (`next_due + interval < now`). Each is
    /// fast-forwarded phase-locked to the next occurrence `>= now`, and a
    /// single catch-up notice is dispatched per row, worded by `format` so
    /// the subscriber can tell it apart from a normal reminder.
    ///
    /// Transient dispatch failures are logged per row and never abort the
    /// sweep. A rejection transitions the subscriber to Blocked (the same
    /// permanent signal the tick pipeline honors) and skips the rest of
    /// their rows; the other subscribers are still swept.
    pub async fn scan<C, L, F>(
        pool: &SqlitePool,
        channel: &C,
        ledger: &L,
        now: DateTime<Utc>,
        format: F,
    ) -> Result<Vec<RecoveryNotice>, AppError>
    where
        C: Channel,
        L: Ledger,
        F: Fn(&RecoveryNotice) -> String,
    {
        let subscribers = SubscriberStatusManager::connected(pool).await?;
        let mut notices = Vec::new();

        for subscriber in &subscribers {
            let due = ScheduleStore::find_due(pool, &subscriber.projects.0, now).await?;

            for row in due {
                if row.next_due + row.interval() >= now {
                    // Due, but not missed — the normal tick handles it.
                    continue;
                }

                let new_next_due = ScheduleStore::fast_forward(row.next_due, row.interval(), now);
                ScheduleStore::advance(pool, row.id, new_next_due, now).await?;

                let notice = RecoveryNotice {
                    row_id: row.id,
                    task_name: row.task_name.clone(),
                    project: row.project.clone(),
                    next_due: new_next_due,
                };

                tracing::info!(
                    subscriber = %subscriber.display_name,
                    task_name = %notice.task_name,
                    project = %notice.project,
                    next_due = %notice.next_due,
                    "Missed reminder recovered"
                );

                let mut blocked = false;
                match channel.send(&subscriber.recipient_id, &format(&notice)).await {
                    Ok(()) => {}
                    Err(SendError::Rejected(reason)) => {
                        tracing::warn!(
                            subscriber = %subscriber.display_name,
                            %reason,
                            "Recipient unreachable during recovery, blocking subscriber"
                        );
                        SubscriberStatusManager::transition(
                            pool,
                            ledger,
                            subscriber.id,
                            SubscriberStatus::Blocked,
                            now,
                        )
                        .await?;
                        blocked = true;
                    }
                    Err(SendError::Transient(reason)) => {
                        tracing::warn!(
                            subscriber = %subscriber.display_name,
                            row_id = %notice.row_id,
                            %reason,
                            "Recovery notice delivery failed"
                        );
                    }
                }

                notices.push(notice);
                if blocked {
                    break;
                }
            }
        }

        Ok(notices)
    }
}
