//! Integration tests for the scheduling core.
//!
//! `#[sqlx::test]` provisions an isolated in-memory SQLite database per test
//! and applies the workspace migrations, so the suite needs no external
//! services.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use herald_common::catalog::{CatalogSubscriber, TaskTemplate};
use herald_common::channel::{Channel, Ledger, SendError};
use herald_common::error::AppError;
use herald_common::types::{DeliveryWindow, GroupedReminder, RecoveryNotice, Subscriber, SubscriberStatus};
use herald_engine::processor::ReminderProcessor;
use herald_engine::recovery::RecoveryScanner;
use herald_engine::resolver::DueSetResolver;
use herald_engine::status::SubscriberStatusManager;
use herald_engine::store::ScheduleStore;
use herald_engine::tracker::{DeliveryTracker, Outcome};

// ============================================================
// Shared helpers
// ============================================================

/// Channel double: records deliveries, optionally rejecting or failing.
#[derive(Clone, Default)]
struct MockChannel {
    reject: Arc<AtomicBool>,
    fail: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockChannel {
    fn rejecting() -> Self {
        let channel = Self::default();
        channel.reject.store(true, Ordering::SeqCst);
        channel
    }

    fn failing() -> Self {
        let channel = Self::default();
        channel.fail.store(true, Ordering::SeqCst);
        channel
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Channel for MockChannel {
    fn send(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), SendError>> + Send {
        let this = self.clone();
        let recipient_id = recipient_id.to_string();
        let text = text.to_string();
        async move {
            if this.reject.load(Ordering::SeqCst) {
                return Err(SendError::Rejected("bot was blocked by the user".into()));
            }
            if this.fail.load(Ordering::SeqCst) {
                return Err(SendError::Transient("request timed out".into()));
            }
            this.sent.lock().unwrap().push((recipient_id, text));
            Ok(())
        }
    }
}

/// Ledger double: records transitions, optionally failing every call.
#[derive(Clone, Default)]
struct MockLedger {
    fail: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<(String, SubscriberStatus)>>>,
}

impl MockLedger {
    fn failing() -> Self {
        let ledger = Self::default();
        ledger.fail.store(true, Ordering::SeqCst);
        ledger
    }

    fn calls(&self) -> Vec<(String, SubscriberStatus)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Ledger for MockLedger {
    fn record_status(
        &self,
        display_name: &str,
        status: SubscriberStatus,
        _connected_at: Option<DateTime<Utc>>,
        _disconnected_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send {
        let this = self.clone();
        let display_name = display_name.to_string();
        async move {
            if this.fail.load(Ordering::SeqCst) {
                return Err(AppError::Ledger("spreadsheet unavailable".into()));
            }
            this.calls.lock().unwrap().push((display_name, status));
            Ok(())
        }
    }
}

fn t0() -> DateTime<Utc> {
    // A Wednesday, mid-morning.
    Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()
}

fn all_day_window() -> DeliveryWindow {
    DeliveryWindow {
        start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        workdays_only: false,
        timezone: chrono_tz::UTC,
    }
}

fn daily_task(name: &str) -> TaskTemplate {
    TaskTemplate {
        task_name: name.to_string(),
        interval_minutes: 24 * 60,
    }
}

fn format_reminder(group: &GroupedReminder) -> String {
    format!("TIME TO {}: {}", group.task_name.to_uppercase(), group.projects.join(", "))
}

fn format_notice(notice: &RecoveryNotice) -> String {
    format!("MISSED TASK {} ({})", notice.task_name.to_uppercase(), notice.project)
}

/// Create a Connected subscriber with the given projects and one daily
/// "Clean" row per project, initialized at `t0`.
async fn connect_subscriber(pool: &SqlitePool, projects: &[&str]) -> Subscriber {
    let ledger = MockLedger::default();
    let entry = CatalogSubscriber {
        display_name: "Ivanov".to_string(),
        recipient_id: "1001".to_string(),
        projects: projects.iter().map(|p| p.to_string()).collect(),
    };
    let subscriber = SubscriberStatusManager::upsert(pool, &entry, t0()).await.unwrap();
    SubscriberStatusManager::transition(pool, &ledger, subscriber.id, SubscriberStatus::Connected, t0())
        .await
        .unwrap();

    let created = ScheduleStore::initialize(
        pool,
        &subscriber.projects.0,
        &[daily_task("clean")],
        t0(),
    )
    .await
    .unwrap();
    assert_eq!(created as usize, projects.len());

    SubscriberStatusManager::find(pool, subscriber.id).await.unwrap()
}

// ============================================================
// ScheduleStore
// ============================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_initialize_creates_one_row_per_project_task(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha", "Beta"]).await;

    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, t0() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.task_name, "clean");
        assert_eq!(row.next_due, t0() + Duration::days(1));
        assert_eq!(row.last_attempt, t0());
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_initialize_replaces_prior_rows(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    // Re-activation replaces the project's rows instead of duplicating them.
    ScheduleStore::initialize(&pool, &subscriber.projects.0, &[daily_task("clean")], t0())
        .await
        .unwrap();

    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, t0() + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_due_before_due_time_is_empty(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, t0() + Duration::hours(23))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_advance_updates_due_and_attempt(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let now = t0() + Duration::days(1) + Duration::minutes(1);
    let row = ScheduleStore::find_due(&pool, &subscriber.projects.0, now)
        .await
        .unwrap()
        .remove(0);

    let new_next_due = ScheduleStore::fast_forward(row.next_due, row.interval(), now);
    ScheduleStore::advance(&pool, row.id, new_next_due, now).await.unwrap();

    let row = ScheduleStore::find_row(&pool, row.id).await.unwrap();
    assert_eq!(row.next_due, t0() + Duration::days(2));
    assert_eq!(row.last_attempt, now);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_advance_unknown_row_is_not_found(pool: SqlitePool) {
    let result = ScheduleStore::advance(&pool, Uuid::new_v4(), t0(), t0()).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// ============================================================
// DueSetResolver
// ============================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_resolver_empty_outside_window(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let window = DeliveryWindow {
        start: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        workdays_only: false,
        timezone: chrono_tz::UTC,
    };
    let resolver = DueSetResolver::new(window);

    // Row is overdue, but 02:00 is outside the window.
    let night = Utc.with_ymd_and_hms(2024, 1, 12, 2, 0, 0).unwrap();
    let rows = resolver.resolve(&pool, &subscriber.projects.0, night).await.unwrap();
    assert!(rows.is_empty());

    // Same rows, inside the window.
    let morning = Utc.with_ymd_and_hms(2024, 1, 12, 9, 30, 0).unwrap();
    let rows = resolver.resolve(&pool, &subscriber.projects.0, morning).await.unwrap();
    assert_eq!(rows.len(), 1);
}

// ============================================================
// DeliveryTracker
// ============================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_record_attempt_sent_then_suppressed(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let now = t0() + Duration::days(1) + Duration::minutes(1);
    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, now).await.unwrap();
    let channel = MockChannel::default();

    let first = DeliveryTracker::record_attempt(&pool, &channel, "1001", &rows, "reminder", now)
        .await
        .unwrap();
    assert_eq!(first, Outcome::Sent);

    // Tick fires again before the row is advanced: cool-down suppresses.
    let second = DeliveryTracker::record_attempt(
        &pool,
        &channel,
        "1001",
        &rows,
        "reminder",
        now + Duration::minutes(1),
    )
    .await
    .unwrap();
    assert_eq!(second, Outcome::Suppressed);
    assert_eq!(channel.sent().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_acknowledge_resets_cooldown(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let now = t0() + Duration::days(1) + Duration::minutes(1);
    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, now).await.unwrap();
    let channel = MockChannel::default();

    DeliveryTracker::record_attempt(&pool, &channel, "1001", &rows, "reminder", now)
        .await
        .unwrap();
    assert!(DeliveryTracker::acknowledge(&pool, rows[0].id).await.unwrap());

    let outcome = DeliveryTracker::record_attempt(
        &pool,
        &channel,
        "1001",
        &rows,
        "reminder",
        now + Duration::minutes(1),
    )
    .await
    .unwrap();
    assert_eq!(outcome, Outcome::Sent);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_transient_failure_leaves_row_due(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let now = t0() + Duration::days(1) + Duration::minutes(1);
    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, now).await.unwrap();
    let channel = MockChannel::default();
    channel.fail.store(true, Ordering::SeqCst);

    let outcome = DeliveryTracker::record_attempt(&pool, &channel, "1001", &rows, "reminder", now)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Failed);

    // No delivery record was written, so the next attempt dispatches.
    assert!(ScheduleStore::delivery_record(&pool, rows[0].id).await.unwrap().is_none());
}

// ============================================================
// SubscriberStatusManager
// ============================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_transition_deduplicates(pool: SqlitePool) {
    let ledger = MockLedger::default();
    let entry = CatalogSubscriber {
        display_name: "Petrov".to_string(),
        recipient_id: "2002".to_string(),
        projects: vec!["Gamma".to_string()],
    };
    let subscriber = SubscriberStatusManager::upsert(&pool, &entry, t0()).await.unwrap();

    let applied =
        SubscriberStatusManager::transition(&pool, &ledger, subscriber.id, SubscriberStatus::Connected, t0())
            .await
            .unwrap();
    assert!(applied);

    let repeated =
        SubscriberStatusManager::transition(&pool, &ledger, subscriber.id, SubscriberStatus::Connected, t0())
            .await
            .unwrap();
    assert!(!repeated);
    assert_eq!(ledger.calls().len(), 1);

    let stored = SubscriberStatusManager::find(&pool, subscriber.id).await.unwrap();
    assert_eq!(stored.status, SubscriberStatus::Connected);
    assert_eq!(stored.connected_at, Some(t0()));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_reconcile_refreshes_stored_subscribers(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;

    // Catalog edited while the process was down: new chat id, extra project,
    // plus a subscriber never seen before.
    let entries = vec![
        CatalogSubscriber {
            display_name: "Ivanov".to_string(),
            recipient_id: "9009".to_string(),
            projects: vec!["Alpha".to_string(), "Delta".to_string()],
        },
        CatalogSubscriber {
            display_name: "Sidorov".to_string(),
            recipient_id: "3003".to_string(),
            projects: vec!["Epsilon".to_string()],
        },
    ];
    SubscriberStatusManager::reconcile(&pool, &entries, t0() + Duration::days(1))
        .await
        .unwrap();

    // Stored fields refreshed, status left alone.
    let stored = SubscriberStatusManager::find(&pool, subscriber.id).await.unwrap();
    assert_eq!(stored.recipient_id, "9009");
    assert_eq!(stored.projects.0, vec!["Alpha".to_string(), "Delta".to_string()]);
    assert_eq!(stored.status, SubscriberStatus::Connected);

    // New catalog entries start Disconnected until activated.
    let new = SubscriberStatusManager::find_by_name(&pool, "Sidorov").await.unwrap().unwrap();
    assert_eq!(new.status, SubscriberStatus::Disconnected);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_ledger_failure_does_not_roll_back(pool: SqlitePool) {
    let ledger = MockLedger::failing();
    let entry = CatalogSubscriber {
        display_name: "Petrov".to_string(),
        recipient_id: "2002".to_string(),
        projects: vec!["Gamma".to_string()],
    };
    let subscriber = SubscriberStatusManager::upsert(&pool, &entry, t0()).await.unwrap();

    let applied =
        SubscriberStatusManager::transition(&pool, &ledger, subscriber.id, SubscriberStatus::Connected, t0())
            .await
            .unwrap();
    assert!(applied);

    let stored = SubscriberStatusManager::find(&pool, subscriber.id).await.unwrap();
    assert_eq!(stored.status, SubscriberStatus::Connected);
}

// ============================================================
// End-to-end scenarios
// ============================================================

#[sqlx::test(migrations = "../../migrations")]
async fn test_due_rows_grouped_and_advanced_one_interval(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha", "Beta"]).await;
    let channel = MockChannel::default();
    let ledger = MockLedger::default();
    let processor = ReminderProcessor::new(all_day_window());

    let now = t0() + Duration::days(1) + Duration::minutes(1);
    let sent = processor
        .run_tick(&pool, &channel, &ledger, &subscriber, now, format_reminder)
        .await
        .unwrap();

    // One grouped reminder for "Clean" covering both projects.
    assert_eq!(sent, 1);
    let deliveries = channel.sent();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, "1001");
    assert!(deliveries[0].1.contains("CLEAN"));
    assert!(deliveries[0].1.contains("Alpha, Beta"));

    // Both rows advanced by exactly one interval (not two).
    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, now + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.next_due, t0() + Duration::days(2));
        assert_eq!(row.last_attempt, now);
    }

    // An immediately repeated tick sends nothing more.
    let sent_again = processor
        .run_tick(&pool, &channel, &ledger, &subscriber, now + Duration::minutes(1), format_reminder)
        .await
        .unwrap();
    assert_eq!(sent_again, 0);
    assert_eq!(channel.sent().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_suppressed_tick_advances_already_dispatched_rows(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let channel = MockChannel::default();
    let ledger = MockLedger::default();
    let processor = ReminderProcessor::new(all_day_window());

    // Crash window: the delivery record was written but the process died
    // before the row advanced.
    let now = t0() + Duration::days(1) + Duration::minutes(1);
    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, now).await.unwrap();
    let outcome = DeliveryTracker::record_attempt(&pool, &channel, "1001", &rows, "reminder", now)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Sent);

    // The next tick dispatches nothing (suppressed) but still advances the
    // row past the already-delivered occurrence.
    let sent = processor
        .run_tick(&pool, &channel, &ledger, &subscriber, now + Duration::minutes(30), format_reminder)
        .await
        .unwrap();
    assert_eq!(sent, 0);
    assert_eq!(channel.sent().len(), 1);

    let row = ScheduleStore::find_row(&pool, rows[0].id).await.unwrap();
    assert_eq!(row.next_due, t0() + Duration::days(2));

    // Ticks for the rest of the day see nothing due.
    for hours in [1, 4, 7, 10] {
        let sent = processor
            .run_tick(&pool, &channel, &ledger, &subscriber, now + Duration::hours(hours), format_reminder)
            .await
            .unwrap();
        assert_eq!(sent, 0);
    }
    assert_eq!(channel.sent().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_recovery_after_three_days_offline(pool: SqlitePool) {
    let _subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let channel = MockChannel::default();
    let ledger = MockLedger::default();

    // Process comes back after three missed daily cycles.
    let now = t0() + Duration::days(3) + Duration::minutes(5);
    let notices = RecoveryScanner::scan(&pool, &channel, &ledger, now, format_notice).await.unwrap();

    // Exactly one consolidated notice, not three.
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].task_name, "clean");
    assert_eq!(notices[0].project, "Alpha");

    // Fast-forwarded phase-locked: at most one interval in the future.
    assert_eq!(notices[0].next_due, t0() + Duration::days(4));
    assert!(notices[0].next_due >= now);
    assert!(notices[0].next_due - now <= Duration::days(1));

    let deliveries = channel.sent();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].1.contains("MISSED"));

    // A second scan finds nothing left to recover.
    let again = RecoveryScanner::scan(&pool, &channel, &ledger, now + Duration::minutes(1), format_notice)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_recovery_ignores_rows_due_less_than_one_interval(pool: SqlitePool) {
    let _subscriber = connect_subscriber(&pool, &["Alpha"]).await;
    let channel = MockChannel::default();
    let ledger = MockLedger::default();

    // Due, but not missed: the normal tick owns this row.
    let now = t0() + Duration::days(1) + Duration::minutes(30);
    let notices = RecoveryScanner::scan(&pool, &channel, &ledger, now, format_notice).await.unwrap();
    assert!(notices.is_empty());
    assert!(channel.sent().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_recovery_dispatch_failure_still_advances_all_rows(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha", "Beta"]).await;
    let channel = MockChannel::failing();
    let ledger = MockLedger::default();

    let now = t0() + Duration::days(3) + Duration::minutes(5);
    let notices = RecoveryScanner::scan(&pool, &channel, &ledger, now, format_notice).await.unwrap();

    // Per-row transient failures never abort the sweep.
    assert_eq!(notices.len(), 2);
    let rows = ScheduleStore::find_due(&pool, &subscriber.projects.0, now + Duration::days(2))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.next_due, t0() + Duration::days(4));
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_recovery_rejection_blocks_subscriber(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha", "Beta"]).await;
    let channel = MockChannel::rejecting();
    let ledger = MockLedger::default();

    let now = t0() + Duration::days(3) + Duration::minutes(5);
    let notices = RecoveryScanner::scan(&pool, &channel, &ledger, now, format_notice).await.unwrap();

    // The first rejection blocks the subscriber and skips their second row.
    assert_eq!(notices.len(), 1);
    let stored = SubscriberStatusManager::find(&pool, subscriber.id).await.unwrap();
    assert_eq!(stored.status, SubscriberStatus::Blocked);
    assert_eq!(ledger.calls(), vec![("Ivanov".to_string(), SubscriberStatus::Blocked)]);

    // Blocked subscribers are no longer swept at all.
    let again = RecoveryScanner::scan(&pool, &channel, &ledger, now + Duration::minutes(1), format_notice)
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(ledger.calls().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_rejection_blocks_subscriber_exactly_once(pool: SqlitePool) {
    let subscriber = connect_subscriber(&pool, &["Alpha", "Beta"]).await;
    let channel = MockChannel::rejecting();
    let ledger = MockLedger::default();
    let processor = ReminderProcessor::new(all_day_window());

    let now = t0() + Duration::days(1) + Duration::minutes(1);
    let sent = processor
        .run_tick(&pool, &channel, &ledger, &subscriber, now, format_reminder)
        .await
        .unwrap();
    assert_eq!(sent, 0);

    let stored = SubscriberStatusManager::find(&pool, subscriber.id).await.unwrap();
    assert_eq!(stored.status, SubscriberStatus::Blocked);
    assert_eq!(ledger.calls(), vec![("Ivanov".to_string(), SubscriberStatus::Blocked)]);

    // Rows were never advanced, so a later tick still sees them as due —
    // but repeated rejection records no second transition.
    let sent = processor
        .run_tick(&pool, &channel, &ledger, &stored, now + Duration::minutes(30), format_reminder)
        .await
        .unwrap();
    assert_eq!(sent, 0);
    assert_eq!(ledger.calls().len(), 1);
}
