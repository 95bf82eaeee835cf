//! Ticker registry — the activation/deactivation flow.
//!
//! The conversational frontend (out of scope here) calls `activate` when a
//! specialist picks their identity and `deactivate` on an explicit stop.
//! Activation fully replaces the subscriber's schedule rows, sends the
//! schedule summary, and spawns their ticker; deactivation cancels the
//! ticker so no further ticks fire, letting in-flight dispatches finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use herald_common::catalog::{CatalogSubscriber, TaskTemplate};
use herald_common::channel::{Channel, Ledger};
use herald_common::error::AppError;
use herald_common::types::{DeliveryWindow, SubscriberStatus};
use herald_engine::grouper::ReminderGrouper;
use herald_engine::processor::ReminderProcessor;
use herald_engine::status::SubscriberStatusManager;
use herald_engine::store::ScheduleStore;
use herald_notifier::message;

use crate::ticker::SubscriberTicker;

struct TickerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns one cancellable ticker per active subscriber.
pub struct TickerRegistry<C, L> {
    pool: SqlitePool,
    channel: Arc<C>,
    ledger: Arc<L>,
    window: DeliveryWindow,
    tick_interval: Duration,
    tickers: Mutex<HashMap<Uuid, TickerHandle>>,
}

impl<C, L> TickerRegistry<C, L>
where
    C: Channel + 'static,
    L: Ledger + 'static,
{
    pub fn new(
        pool: SqlitePool,
        channel: Arc<C>,
        ledger: Arc<L>,
        window: DeliveryWindow,
        tick_interval: Duration,
    ) -> Self {
        Self {
            pool,
            channel,
            ledger,
            window,
            tick_interval,
            tickers: Mutex::new(HashMap::new()),
        }
    }

    /// Activate a subscriber: upsert from the catalog, replace their
    /// schedule rows, transition to Connected, send the schedule summary,
    /// and start their ticker. Re-activation restarts the schedule from now.
    pub async fn activate(
        &self,
        entry: &CatalogSubscriber,
        templates: &[TaskTemplate],
    ) -> Result<Uuid, AppError> {
        if templates.is_empty() {
            return Err(AppError::Config(format!(
                "task catalog is empty, not activating {}",
                entry.display_name
            )));
        }

        let now = Utc::now();
        let subscriber = SubscriberStatusManager::upsert(&self.pool, entry, now).await?;
        ScheduleStore::initialize(&self.pool, &subscriber.projects.0, templates, now).await?;
        SubscriberStatusManager::transition(
            &self.pool,
            self.ledger.as_ref(),
            subscriber.id,
            SubscriberStatus::Connected,
            now,
        )
        .await?;

        let rows = ScheduleStore::rows_for_projects(&self.pool, &subscriber.projects.0).await?;
        let summary = message::schedule_summary(&ReminderGrouper::group(&rows));
        if let Err(e) = self.channel.send(&subscriber.recipient_id, &summary).await {
            tracing::warn!(
                subscriber = %subscriber.display_name,
                error = %e,
                "Schedule summary delivery failed"
            );
        }

        self.spawn(subscriber.id);
        Ok(subscriber.id)
    }

    /// Restart the ticker of an already-Connected subscriber (process
    /// restart). Rows and status are left as stored.
    pub fn resume(&self, subscriber_id: Uuid) {
        self.spawn(subscriber_id);
    }

    /// Explicit stop: cancel the ticker and transition to Disconnected.
    /// Returns whether a status transition was applied.
    pub async fn deactivate(&self, subscriber_id: Uuid) -> Result<bool, AppError> {
        self.cancel(subscriber_id);
        SubscriberStatusManager::transition(
            &self.pool,
            self.ledger.as_ref(),
            subscriber_id,
            SubscriberStatus::Disconnected,
            Utc::now(),
        )
        .await
    }

    fn spawn(&self, subscriber_id: Uuid) {
        // A second activation replaces the previous ticker.
        self.cancel(subscriber_id);

        let (stop, shutdown) = watch::channel(false);
        let ticker = SubscriberTicker::new(
            self.pool.clone(),
            self.channel.clone(),
            self.ledger.clone(),
            ReminderProcessor::new(self.window),
            subscriber_id,
            self.tick_interval,
            shutdown,
        );
        let task = tokio::spawn(ticker.run());

        self.tickers
            .lock()
            .expect("ticker registry lock poisoned")
            .insert(subscriber_id, TickerHandle { stop, task });
    }

    fn cancel(&self, subscriber_id: Uuid) {
        let handle = self
            .tickers
            .lock()
            .expect("ticker registry lock poisoned")
            .remove(&subscriber_id);
        if let Some(handle) = handle {
            let _ = handle.stop.send(true);
        }
    }

    /// Stop every ticker and wait for in-flight ticks to complete.
    pub async fn shutdown(&self) {
        let handles: Vec<TickerHandle> = {
            let mut tickers = self
                .tickers
                .lock()
                .expect("ticker registry lock poisoned");
            tickers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let _ = handle.stop.send(true);
            let _ = handle.task.await;
        }
    }
}
