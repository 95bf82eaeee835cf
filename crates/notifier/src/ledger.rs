//! External status ledger — appends one row per status transition to a
//! Google Sheets range over the `values:append` REST call.
//!
//! Best-effort by contract: callers log failures and keep the local status
//! authoritative.

use std::future::Future;

use chrono::{DateTime, Utc};

use herald_common::channel::Ledger;
use herald_common::error::AppError;
use herald_common::types::SubscriberStatus;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// `Ledger` implementation over the Google Sheets API.
pub struct SheetsLedger {
    client: reqwest::Client,
    spreadsheet_id: String,
    range: String,
    access_token: String,
}

impl SheetsLedger {
    pub fn new(spreadsheet_id: String, range: String, access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            spreadsheet_id,
            range,
            access_token,
        }
    }
}

impl Ledger for SheetsLedger {
    fn record_status(
        &self,
        display_name: &str,
        status: SubscriberStatus,
        connected_at: Option<DateTime<Utc>>,
        disconnected_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send {
        let url = format!(
            "{SHEETS_API_BASE}/{}/values/{}:append?valueInputOption=USER_ENTERED",
            self.spreadsheet_id, self.range
        );
        let fmt = |at: Option<DateTime<Utc>>| {
            at.map(|at| at.format("%d.%m.%Y %H:%M").to_string())
                .unwrap_or_default()
        };
        let body = serde_json::json!({
            "values": [[display_name, status.to_string(), fmt(connected_at), fmt(disconnected_at)]],
        });

        async move {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await
                .map_err(|e| AppError::Ledger(e.to_string()))?;

            if !response.status().is_success() {
                let status_code = response.status();
                let detail = response.text().await.unwrap_or_default();
                return Err(AppError::Ledger(format!("HTTP {status_code}: {detail}")));
            }

            tracing::info!(range = %self.range, "Status appended to ledger");
            Ok(())
        }
    }
}

/// Static dispatch over the configured ledger backend.
pub enum AnyLedger {
    Sheets(SheetsLedger),
    Noop(NoopLedger),
}

impl Ledger for AnyLedger {
    fn record_status(
        &self,
        display_name: &str,
        status: SubscriberStatus,
        connected_at: Option<DateTime<Utc>>,
        disconnected_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send {
        async move {
            match self {
                AnyLedger::Sheets(ledger) => {
                    ledger
                        .record_status(display_name, status, connected_at, disconnected_at)
                        .await
                }
                AnyLedger::Noop(ledger) => {
                    ledger
                        .record_status(display_name, status, connected_at, disconnected_at)
                        .await
                }
            }
        }
    }
}

/// Ledger used when the spreadsheet integration is not configured.
pub struct NoopLedger;

impl Ledger for NoopLedger {
    fn record_status(
        &self,
        display_name: &str,
        status: SubscriberStatus,
        _connected_at: Option<DateTime<Utc>>,
        _disconnected_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send {
        tracing::debug!(display_name, %status, "Ledger not configured, status change not exported");
        async { Ok(()) }
    }
}
