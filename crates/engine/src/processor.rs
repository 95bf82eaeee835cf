//! Per-tick reminder pipeline.
//!
//! For one subscriber's tick:
//! 1. Resolve the due row set (window-gated) via `DueSetResolver`
//! 2. Collapse due rows into per-task reminders via `ReminderGrouper`
//! 3. Dispatch each reminder through `DeliveryTracker`
//! 4. Advance rows — strictly after their attempt concluded, once the
//!    occurrence was dispatched (fresh send or a suppressed duplicate of
//!    one), so a crash between dispatch and advance re-reports the row as
//!    due (at-least-once bias)

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use herald_common::channel::{Channel, Ledger};
use herald_common::error::AppError;
use herald_common::types::{DeliveryWindow, GroupedReminder, Subscriber, SubscriberStatus};

use crate::grouper::ReminderGrouper;
use crate::resolver::DueSetResolver;
use crate::status::SubscriberStatusManager;
use crate::store::ScheduleStore;
use crate::tracker::{DeliveryTracker, Outcome};

/// Central per-tick processor that orchestrates the reminder pipeline.
pub struct ReminderProcessor {
    resolver: DueSetResolver,
}

impl ReminderProcessor {
    pub fn new(window: DeliveryWindow) -> Self {
        Self {
            resolver: DueSetResolver::new(window),
        }
    }

    /// Run one due-check tick for `subscriber`. Returns the number of
    /// reminders sent.
    ///
    /// A channel rejection transitions the subscriber to Blocked (once, via
    /// the status manager's dedup) and abandons the rest of the tick — the
    /// recipient is unreachable for every remaining reminder too. Transient
    /// failures leave their rows untouched so the next tick retries them;
    /// suppressed groups advance like sent ones, since their occurrence was
    /// already delivered.
    pub async fn run_tick<C, L, F>(
        &self,
        pool: &SqlitePool,
        channel: &C,
        ledger: &L,
        subscriber: &Subscriber,
        now: DateTime<Utc>,
        format: F,
    ) -> Result<u32, AppError>
    where
        C: Channel,
        L: Ledger,
        F: Fn(&GroupedReminder) -> String,
    {
        let due = self
            .resolver
            .resolve(pool, &subscriber.projects.0, now)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }

        tracing::info!(
            subscriber = %subscriber.display_name,
            due = due.len(),
            "Due rows found"
        );

        let groups = ReminderGrouper::group(&due);
        let mut sent = 0u32;

        for group in &groups {
            let members: Vec<_> = due
                .iter()
                .filter(|row| group.row_ids.contains(&row.id))
                .cloned()
                .collect();

            let outcome = DeliveryTracker::record_attempt(
                pool,
                channel,
                &subscriber.recipient_id,
                &members,
                &format(group),
                now,
            )
            .await?;

            match outcome {
                Outcome::Sent | Outcome::Suppressed => {
                    // Suppressed advances too: the unacknowledged delivery
                    // record proves this occurrence already went out (e.g. a
                    // crash landed between dispatch and advance), so leaving
                    // the row due would wedge it until the recovery sweep.
                    for row in &members {
                        let new_next_due =
                            ScheduleStore::fast_forward(row.next_due, row.interval(), now);
                        ScheduleStore::advance(pool, row.id, new_next_due, now).await?;
                    }
                    if outcome == Outcome::Sent {
                        sent += 1;
                    }
                }
                Outcome::Failed => {
                    // Row stays due; retried on a later tick.
                }
                Outcome::Rejected => {
                    SubscriberStatusManager::transition(
                        pool,
                        ledger,
                        subscriber.id,
                        SubscriberStatus::Blocked,
                        now,
                    )
                    .await?;
                    return Ok(sent);
                }
            }
        }

        Ok(sent)
    }
}
