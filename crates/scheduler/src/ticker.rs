//! Periodic timers driving the scheduling core.
//!
//! Each active subscriber gets their own ticker; tickers run independently
//! and may overlap in wall-clock time, which is safe because row identity is
//! scoped by project and the store serializes writes. Cancellation is a
//! watch signal checked between ticks, so an in-flight tick always runs to
//! completion.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use herald_common::channel::{Channel, Ledger};
use herald_common::types::SubscriberStatus;
use herald_engine::processor::ReminderProcessor;
use herald_engine::recovery::RecoveryScanner;
use herald_engine::status::SubscriberStatusManager;
use herald_notifier::message;

/// Periodic due-check loop for one subscriber.
pub struct SubscriberTicker<C, L> {
    pool: SqlitePool,
    channel: Arc<C>,
    ledger: Arc<L>,
    processor: ReminderProcessor,
    subscriber_id: Uuid,
    tick_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<C: Channel, L: Ledger> SubscriberTicker<C, L> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        channel: Arc<C>,
        ledger: Arc<L>,
        processor: ReminderProcessor,
        subscriber_id: Uuid,
        tick_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            channel,
            ledger,
            processor,
            subscriber_id,
            tick_interval,
            shutdown,
        }
    }

    /// Tick until cancelled. Errors never exit the loop; a failed tick is
    /// logged and retried on the next one.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            subscriber_id = %self.subscriber_id,
            tick_interval_secs = self.tick_interval.as_secs(),
            "Subscriber ticker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick_once().await,
                _ = self.shutdown.changed() => break,
            }
        }

        tracing::info!(subscriber_id = %self.subscriber_id, "Subscriber ticker stopped");
    }

    async fn tick_once(&self) {
        let now = Utc::now();

        let subscriber = match SubscriberStatusManager::find(&self.pool, self.subscriber_id).await {
            Ok(subscriber) => subscriber,
            Err(e) => {
                tracing::error!(
                    subscriber_id = %self.subscriber_id,
                    error = %e,
                    "Tick skipped, subscriber not loadable"
                );
                return;
            }
        };

        // Blocked or deactivated between ticks: nothing to do until the
        // frontend re-activates them.
        if subscriber.status != SubscriberStatus::Connected {
            return;
        }

        let result = self
            .processor
            .run_tick(
                &self.pool,
                self.channel.as_ref(),
                self.ledger.as_ref(),
                &subscriber,
                now,
                |group| message::due_reminder(group, now),
            )
            .await;

        match result {
            Ok(sent) if sent > 0 => {
                tracing::info!(subscriber = %subscriber.display_name, sent, "Reminders dispatched");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    subscriber = %subscriber.display_name,
                    error = %e,
                    "Tick failed, retrying on the next one"
                );
            }
        }
    }
}

/// Missed-reminder recovery: one sweep at boot, then a slow periodic cadence
/// independent of the per-subscriber tickers. Returns when cancelled.
pub async fn run_recovery_loop<C: Channel, L: Ledger>(
    pool: SqlitePool,
    channel: Arc<C>,
    ledger: Arc<L>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                match RecoveryScanner::scan(&pool, channel.as_ref(), ledger.as_ref(), now, message::recovery_notice).await {
                    Ok(notices) if !notices.is_empty() => {
                        tracing::info!(recovered = notices.len(), "Missed reminders recovered");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Recovery sweep failed, retrying on the next pass");
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    tracing::info!("Recovery loop stopped");
}
