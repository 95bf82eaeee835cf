//! Trait seams for the external collaborators the scheduling core consumes:
//! the notification channel and the status ledger. The engine is generic
//! over these so tests can substitute recording mocks.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::SubscriberStatus;

/// Failure modes of one dispatch to the notification channel.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// Permanent: the recipient is unreachable (revoked access, blocked the
    /// bot). Never retried for that row; converts to a Blocked transition.
    #[error("recipient unreachable: {0}")]
    Rejected(String),

    /// Network/rate-limit failure. Surfaced only after the channel's own
    /// bounded retries are exhausted; the attempt is skipped for this tick.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

/// Outbound notification channel.
pub trait Channel: Send + Sync {
    /// Deliver `text` to `recipient_id`. Implementations own their retry and
    /// backoff policy; `SendError::Transient` means retries are exhausted.
    fn send(
        &self,
        recipient_id: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// External status ledger (e.g. a spreadsheet row per status change).
/// Best-effort: callers log failures and keep local state authoritative.
pub trait Ledger: Send + Sync {
    fn record_status(
        &self,
        display_name: &str,
        status: SubscriberStatus,
        connected_at: Option<DateTime<Utc>>,
        disconnected_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), crate::error::AppError>> + Send;
}
