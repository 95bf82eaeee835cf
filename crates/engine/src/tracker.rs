//! Delivery tracker — cool-down suppression and dispatch bookkeeping.
//!
//! Before a reminder goes out, each member row's delivery record is checked:
//! an unacknowledged record newer than the row's current `next_due` means
//! this due occurrence was already notified and the attempt is suppressed,
//! even when the poll tick fires again before the row is advanced.
//!
//! State lives in the `delivery_records` table (one record per row, replaced
//! on each attempt), so suppression survives process restarts.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use herald_common::channel::{Channel, SendError};
use herald_common::error::AppError;
use herald_common::types::ScheduleRow;

use crate::store::ScheduleStore;

/// Result of one notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Dispatched and recorded; the caller advances the rows.
    Sent,
    /// Cool-down: every member row already has an unacknowledged record for
    /// this occurrence. Nothing was dispatched or written.
    Suppressed,
    /// The channel reported the recipient unreachable. No record written;
    /// the caller transitions the subscriber to Blocked.
    Rejected,
    /// Transient channel failure after retries. No record written; the rows
    /// stay due and the next tick retries.
    Failed,
}

/// Tracks whether a notification for a schedule row was actually delivered.
pub struct DeliveryTracker;

impl DeliveryTracker {
    /// Attempt delivery of one outbound notification covering `rows`.
    ///
    /// Rows are not advanced here; the caller advances them on `Sent` and
    /// `Suppressed`, strictly after this call concludes.
    pub async fn record_attempt<C: Channel>(
        pool: &SqlitePool,
        channel: &C,
        recipient_id: &str,
        rows: &[ScheduleRow],
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Outcome, AppError> {
        let mut all_suppressed = !rows.is_empty();
        for row in rows {
            let suppressed = match ScheduleStore::delivery_record(pool, row.id).await? {
                Some(record) => record.sent_at > row.next_due && !record.acknowledged,
                None => false,
            };
            if !suppressed {
                all_suppressed = false;
                break;
            }
        }

        if all_suppressed {
            tracing::debug!(
                rows = rows.len(),
                recipient_id,
                "Attempt suppressed — occurrence already notified, awaiting advance"
            );
            return Ok(Outcome::Suppressed);
        }

        match channel.send(recipient_id, text).await {
            Ok(()) => {
                for row in rows {
                    ScheduleStore::record_sent(pool, row.id, now).await?;
                }
                Ok(Outcome::Sent)
            }
            Err(SendError::Rejected(reason)) => {
                tracing::warn!(recipient_id, %reason, "Recipient unreachable, delivery rejected");
                Ok(Outcome::Rejected)
            }
            Err(SendError::Transient(reason)) => {
                tracing::warn!(recipient_id, %reason, "Delivery failed after retries, row stays due");
                Ok(Outcome::Failed)
            }
        }
    }

    /// Explicit subscriber feedback for a row: resets the cool-down early so
    /// the next due occurrence is notified again. Distinct from passive read
    /// receipts, which this system does not observe.
    pub async fn acknowledge(pool: &SqlitePool, row_id: Uuid) -> Result<bool, AppError> {
        ScheduleStore::acknowledge(pool, row_id).await
    }
}
