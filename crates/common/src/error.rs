use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Schedule/subscriber persistence unavailable. Fatal to the current
    /// operation only; the caller retries on the next tick.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The channel reported the recipient unreachable. Permanent signal;
    /// converts to a Blocked status transition.
    #[error("Channel rejected delivery: {0}")]
    ChannelRejected(String),

    /// Network/rate-limit failure after the channel's own retries were
    /// exhausted. The attempt is skipped; the row stays due.
    #[error("Channel transient failure: {0}")]
    ChannelTransient(String),

    /// Catalog malformed or missing. Skips initialization for the affected
    /// subscriber; never crashes the scheduler.
    #[error("Configuration error: {0}")]
    Config(String),

    /// External status ledger sync failed. Logged, never fatal.
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
