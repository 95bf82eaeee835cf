//! Subscriber status manager — owns `Subscriber` persistence and the
//! connect/disconnect/blocked state machine.
//!
//! Local state is the source of truth; the external ledger sync is
//! best-effort and never rolls back a local transition.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use herald_common::catalog::CatalogSubscriber;
use herald_common::channel::Ledger;
use herald_common::error::AppError;
use herald_common::types::{Subscriber, SubscriberStatus};

/// Service layer for subscriber persistence and status transitions.
pub struct SubscriberStatusManager;

impl SubscriberStatusManager {
    /// Insert a subscriber from the catalog, or refresh their recipient id
    /// and project set if they already exist. Status is untouched on update;
    /// new subscribers start Disconnected.
    pub async fn upsert(
        pool: &SqlitePool,
        entry: &CatalogSubscriber,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, AppError> {
        let projects = serde_json::to_string(&entry.projects)
            .map_err(|e| AppError::Internal(format!("projects not serializable: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO subscribers (id, display_name, recipient_id, projects, status, last_update)
            VALUES (?, ?, ?, ?, 'disconnected', ?)
            ON CONFLICT(display_name) DO UPDATE
                SET recipient_id = excluded.recipient_id, projects = excluded.projects
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.display_name)
        .bind(&entry.recipient_id)
        .bind(&projects)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_name(pool, &entry.display_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subscriber {}", entry.display_name)))
    }

    /// Refresh stored subscribers from the boot-time catalog: recipient id
    /// and project changes in the catalog files take effect on restart, not
    /// only on an explicit re-activation. Statuses are untouched; catalog
    /// entries never seen before are stored as Disconnected.
    pub async fn reconcile(
        pool: &SqlitePool,
        entries: &[CatalogSubscriber],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        for entry in entries {
            Self::upsert(pool, entry, now).await?;
        }
        Ok(())
    }

    pub async fn find(pool: &SqlitePool, id: Uuid) -> Result<Subscriber, AppError> {
        sqlx::query_as::<_, Subscriber>("SELECT * FROM subscribers WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subscriber {id}")))
    }

    pub async fn find_by_name(
        pool: &SqlitePool,
        display_name: &str,
    ) -> Result<Option<Subscriber>, AppError> {
        Ok(
            sqlx::query_as::<_, Subscriber>("SELECT * FROM subscribers WHERE display_name = ?")
                .bind(display_name)
                .fetch_optional(pool)
                .await?,
        )
    }

    /// All subscribers currently in `Connected` state, ordered by name.
    pub async fn connected(pool: &SqlitePool) -> Result<Vec<Subscriber>, AppError> {
        Ok(sqlx::query_as::<_, Subscriber>(
            "SELECT * FROM subscribers WHERE status = 'connected' ORDER BY display_name",
        )
        .fetch_all(pool)
        .await?)
    }

    /// Apply a status transition. No-ops (returns `false`) when `new_status`
    /// equals the recorded status, so repeated rejections or repeated /stop
    /// commands produce a single transition entry.
    ///
    /// On an applied transition the external ledger is invoked with the
    /// display name, status, and whichever of the connect/disconnect
    /// timestamps applies; a ledger failure is logged and does not roll the
    /// local transition back.
    pub async fn transition<L: Ledger>(
        pool: &SqlitePool,
        ledger: &L,
        subscriber_id: Uuid,
        new_status: SubscriberStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let subscriber = Self::find(pool, subscriber_id).await?;
        if subscriber.status == new_status {
            return Ok(false);
        }

        let connected_at = (new_status == SubscriberStatus::Connected).then_some(now);
        // Blocked is an involuntary disconnect; it carries the same timestamp.
        let disconnected_at = (new_status != SubscriberStatus::Connected).then_some(now);

        sqlx::query(
            r#"
            UPDATE subscribers
            SET status = ?,
                last_update = ?,
                connected_at = COALESCE(?, connected_at),
                disconnected_at = COALESCE(?, disconnected_at)
            WHERE id = ?
            "#,
        )
        .bind(new_status)
        .bind(now)
        .bind(connected_at)
        .bind(disconnected_at)
        .bind(subscriber_id)
        .execute(pool)
        .await?;

        tracing::info!(
            subscriber = %subscriber.display_name,
            from = %subscriber.status,
            to = %new_status,
            "Subscriber status transition"
        );

        if let Err(e) = ledger
            .record_status(&subscriber.display_name, new_status, connected_at, disconnected_at)
            .await
        {
            tracing::error!(
                subscriber = %subscriber.display_name,
                error = %e,
                "Status ledger sync failed; local transition stands"
            );
        }

        Ok(true)
    }
}
