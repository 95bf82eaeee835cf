use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::types::DeliveryWindow;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string
    pub database_url: String,

    /// Maximum number of SQLite connections in the pool (default: 5)
    pub db_max_connections: u32,

    /// Telegram bot token
    pub telegram_bot_token: Option<String>,

    /// Path to the subscriber catalog JSON file
    pub subscribers_file: String,

    /// Path to the task template catalog JSON file
    pub tasks_file: String,

    /// Lower bound of the delivery window, local wall clock (default: 04:00)
    pub window_start: NaiveTime,

    /// Upper bound of the delivery window, local wall clock (default: 18:00)
    pub window_end: NaiveTime,

    /// Suppress reminders on Saturday/Sunday (default: false)
    pub workdays_only: bool,

    /// Timezone the delivery window is evaluated in (default: Europe/Moscow)
    pub timezone: Tz,

    /// Per-subscriber due-check cadence in seconds (default: 1800)
    pub tick_interval_secs: u64,

    /// Missed-reminder recovery cadence in seconds (default: 3600)
    pub recovery_interval_secs: u64,

    /// Bounded retry count for transient channel failures (default: 3)
    pub channel_max_retries: u32,

    /// Google Sheets spreadsheet id for the status ledger (optional)
    pub spreadsheet_id: Option<String>,

    /// Sheet range the ledger appends to (default: Sheet1!A:D)
    pub sheet_range: String,

    /// OAuth access token for the Sheets API (optional)
    pub sheets_access_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://herald.db?mode=rwc".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            subscribers_file: std::env::var("SUBSCRIBERS_FILE")
                .unwrap_or_else(|_| "subscribers.json".to_string()),
            tasks_file: std::env::var("TASKS_FILE").unwrap_or_else(|_| "tasks.json".to_string()),
            window_start: parse_time("REMINDER_WINDOW_START", "04:00")?,
            window_end: parse_time("REMINDER_WINDOW_END", "18:00")?,
            workdays_only: std::env::var("REMINDER_WORKDAYS_ONLY")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REMINDER_WORKDAYS_ONLY must be true or false"))?,
            timezone: std::env::var("REMINDER_TIMEZONE")
                .unwrap_or_else(|_| "Europe/Moscow".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REMINDER_TIMEZONE must be a valid IANA timezone"))?,
            tick_interval_secs: std::env::var("TICK_INTERVAL_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TICK_INTERVAL_SECS must be a valid u64"))?,
            recovery_interval_secs: std::env::var("RECOVERY_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RECOVERY_INTERVAL_SECS must be a valid u64"))?,
            channel_max_retries: std::env::var("CHANNEL_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CHANNEL_MAX_RETRIES must be a valid u32"))?,
            spreadsheet_id: std::env::var("SPREADSHEET_ID").ok(),
            sheet_range: std::env::var("SHEET_RANGE")
                .unwrap_or_else(|_| "Sheet1!A:D".to_string()),
            sheets_access_token: std::env::var("SHEETS_ACCESS_TOKEN").ok(),
        })
    }

    /// The configured delivery window.
    pub fn delivery_window(&self) -> DeliveryWindow {
        DeliveryWindow {
            start: self.window_start,
            end: self.window_end,
            workdays_only: self.workdays_only,
            timezone: self.timezone,
        }
    }
}

fn parse_time(var: &str, default: &str) -> anyhow::Result<NaiveTime> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .map_err(|_| anyhow::anyhow!("{} must be HH:MM, got {:?}", var, raw))
}
