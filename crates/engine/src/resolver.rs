//! Due-set resolver — gates due-row lookup behind the allowed delivery
//! window before touching storage.
//!
//! The window check is a pure gate: outside the window the resolver returns
//! an empty set without reading or mutating any row, so a tick that fires at
//! night costs nothing and changes nothing.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use herald_common::error::AppError;
use herald_common::types::{DeliveryWindow, ScheduleRow};

use crate::store::ScheduleStore;

/// Resolves which schedule rows are due for a subscriber's project set.
pub struct DueSetResolver {
    window: DeliveryWindow,
}

impl DueSetResolver {
    pub fn new(window: DeliveryWindow) -> Self {
        Self { window }
    }

    /// Due rows for `projects` at `now`, or an empty set when `now` falls
    /// outside the delivery window (time-of-day range in the configured
    /// timezone; weekends excluded when workday-only is set).
    pub async fn resolve(
        &self,
        pool: &SqlitePool,
        projects: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduleRow>, AppError> {
        if !self.window.contains(now) {
            tracing::debug!(%now, "Outside delivery window, skipping due check");
            return Ok(Vec::new());
        }

        ScheduleStore::find_due(pool, projects, now).await
    }
}
