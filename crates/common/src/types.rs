use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection state of a subscriber.
///
/// `Blocked` is entered when the notification channel reports the recipient
/// unreachable (e.g. the subscriber revoked access to the bot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Connected,
    Disconnected,
    Blocked,
}

impl std::fmt::Display for SubscriberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberStatus::Connected => write!(f, "connected"),
            SubscriberStatus::Disconnected => write!(f, "disconnected"),
            SubscriberStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// One recurring obligation: a project must have a maintenance task performed
/// on a fixed cadence. Subscriber-agnostic; subscribers map to rows through
/// their project set.
///
/// Only `next_due` and `last_attempt` change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub project: String,
    /// Case-insensitive identity; display casing is applied at grouping time.
    pub task_name: String,
    pub interval_minutes: i64,
    pub next_due: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
}

impl ScheduleRow {
    pub fn interval(&self) -> Duration {
        Duration::minutes(self.interval_minutes)
    }
}

/// A person receiving reminders over the notification channel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: Uuid,
    pub display_name: String,
    /// Channel-level address (e.g. a Telegram chat id).
    pub recipient_id: String,
    pub projects: sqlx::types::Json<Vec<String>>,
    pub status: SubscriberStatus,
    pub last_update: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

/// Outcome of the most recent notification attempt for one schedule row.
/// Replaced on each new attempt; never more than one per row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryRecord {
    pub row_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// One outbound notification covering every project where the same task is
/// due at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedReminder {
    /// Canonical display form (capitalized).
    pub task_name: String,
    /// Sorted, deduplicated union of the member rows' projects.
    pub projects: Vec<String>,
    /// Minimum interval across member rows; governs the "next reminder" text.
    pub interval_minutes: i64,
    /// Member row ids, sorted.
    pub row_ids: Vec<Uuid>,
}

impl GroupedReminder {
    pub fn interval(&self) -> Duration {
        Duration::minutes(self.interval_minutes)
    }
}

/// Catch-up notice for a row whose due time was missed by at least one full
/// cycle while the process was offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryNotice {
    pub row_id: Uuid,
    pub task_name: String,
    pub project: String,
    pub next_due: DateTime<Utc>,
}

/// Allowed delivery window: a time-of-day range evaluated in a fixed
/// timezone, optionally restricted to workdays.
///
/// When `start > end` the window wraps past midnight and covers
/// `[start, 24:00) ∪ [00:00, end]`. The shipped default (04:00–18:00) never
/// wraps, but the contract holds either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub workdays_only: bool,
    pub timezone: Tz,
}

impl DeliveryWindow {
    /// Whether `now` falls inside the window. Pure; mutates nothing.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);

        if self.workdays_only && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let t = local.time();
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}
