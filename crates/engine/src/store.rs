//! Schedule store — owns all reads and writes of `ScheduleRow` and
//! `DeliveryRecord` state.
//!
//! Rows are subscriber-agnostic: one row per (project × catalog task).
//! Re-initializing a project set fully replaces its rows. Only `next_due`
//! and `last_attempt` are ever updated in place.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use herald_common::catalog::TaskTemplate;
use herald_common::error::AppError;
use herald_common::types::{DeliveryRecord, ScheduleRow};

/// Service layer for schedule row and delivery record persistence.
pub struct ScheduleStore;

impl ScheduleStore {
    /// Compute the phase-locked next occurrence: `next_due + k*interval` for
    /// the smallest `k >= 1` with the result `>= now`.
    ///
    /// Used for both the normal advance after a dispatched reminder and the
    /// recovery fast-forward, so a row never drifts off its original phase.
    pub fn fast_forward(
        next_due: DateTime<Utc>,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        debug_assert!(interval > Duration::zero());
        let mut next = next_due + interval;
        while next < now {
            next = next + interval;
        }
        next
    }

    /// Create one row per project × template with `next_due = now + interval`
    /// and `last_attempt = now`, replacing any prior rows for those projects.
    ///
    /// Returns the number of rows created. Idempotency is the caller's
    /// responsibility; this is expected once per subscriber activation.
    pub async fn initialize(
        pool: &SqlitePool,
        projects: &[String],
        templates: &[TaskTemplate],
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        if projects.is_empty() || templates.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;

        let placeholders = vec!["?"; projects.len()].join(", ");
        let delete_sql = format!("DELETE FROM schedule_rows WHERE project IN ({placeholders})");
        let mut delete = sqlx::query(&delete_sql);
        for project in projects {
            delete = delete.bind(project);
        }
        delete.execute(&mut *tx).await?;

        let mut created = 0u64;
        for project in projects {
            for template in templates {
                let next_due = now + Duration::minutes(template.interval_minutes);
                sqlx::query(
                    r#"
                    INSERT INTO schedule_rows (id, project, task_name, interval_minutes, next_due, last_attempt)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(project)
                .bind(&template.task_name)
                .bind(template.interval_minutes)
                .bind(next_due)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                created += 1;
            }
        }

        tx.commit().await?;

        tracing::info!(rows = created, projects = projects.len(), "Schedule rows initialized");
        Ok(created)
    }

    /// Rows with `project ∈ projects` and `next_due <= now`. Pure read.
    pub async fn find_due(
        pool: &SqlitePool,
        projects: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduleRow>, AppError> {
        if projects.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; projects.len()].join(", ");
        let sql = format!(
            "SELECT * FROM schedule_rows WHERE next_due <= ? AND project IN ({placeholders}) ORDER BY next_due, id"
        );
        let mut query = sqlx::query_as::<_, ScheduleRow>(&sql).bind(now);
        for project in projects {
            query = query.bind(project);
        }

        Ok(query.fetch_all(pool).await?)
    }

    /// Every row for `projects`, due or not. Used for the post-activation
    /// schedule summary.
    pub async fn rows_for_projects(
        pool: &SqlitePool,
        projects: &[String],
    ) -> Result<Vec<ScheduleRow>, AppError> {
        if projects.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; projects.len()].join(", ");
        let sql = format!(
            "SELECT * FROM schedule_rows WHERE project IN ({placeholders}) ORDER BY task_name, project"
        );
        let mut query = sqlx::query_as::<_, ScheduleRow>(&sql);
        for project in projects {
            query = query.bind(project);
        }

        Ok(query.fetch_all(pool).await?)
    }

    /// Fetch a single row by id.
    pub async fn find_row(pool: &SqlitePool, row_id: Uuid) -> Result<ScheduleRow, AppError> {
        sqlx::query_as::<_, ScheduleRow>("SELECT * FROM schedule_rows WHERE id = ?")
            .bind(row_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("schedule row {row_id}")))
    }

    /// Atomically update `next_due` and `last_attempt`. Called strictly after
    /// the notification attempt for the row has concluded, never before.
    pub async fn advance(
        pool: &SqlitePool,
        row_id: Uuid,
        new_next_due: DateTime<Utc>,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE schedule_rows SET next_due = ?, last_attempt = ? WHERE id = ?",
        )
        .bind(new_next_due)
        .bind(attempted_at)
        .bind(row_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("schedule row {row_id}")));
        }
        Ok(())
    }

    /// The latest delivery attempt for a row, if any.
    pub async fn delivery_record(
        pool: &SqlitePool,
        row_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, AppError> {
        Ok(
            sqlx::query_as::<_, DeliveryRecord>(
                "SELECT * FROM delivery_records WHERE row_id = ?",
            )
            .bind(row_id)
            .fetch_optional(pool)
            .await?,
        )
    }

    /// Record a successful dispatch: replaces (never appends) the row's
    /// delivery record with `sent_at = sent_at`, `acknowledged = false`.
    pub async fn record_sent(
        pool: &SqlitePool,
        row_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_records (row_id, sent_at, acknowledged)
            VALUES (?, ?, 0)
            ON CONFLICT(row_id) DO UPDATE SET sent_at = excluded.sent_at, acknowledged = 0
            "#,
        )
        .bind(row_id)
        .bind(sent_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a row's delivery record acknowledged (explicit subscriber
    /// feedback). Returns `false` if the row has no delivery record.
    pub async fn acknowledge(pool: &SqlitePool, row_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE delivery_records SET acknowledged = 1 WHERE row_id = ?")
            .bind(row_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
