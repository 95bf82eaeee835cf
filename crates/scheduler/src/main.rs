use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use herald_common::catalog;
use herald_common::config::AppConfig;
use herald_common::db;
use herald_engine::status::SubscriberStatusManager;
use herald_notifier::ledger::{AnyLedger, NoopLedger, SheetsLedger};
use herald_notifier::telegram::TelegramChannel;
use herald_scheduler::registry::TickerRegistry;
use herald_scheduler::ticker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_scheduler=info,herald_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("RoutineHerald scheduler starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database and apply migrations
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let token = config
        .telegram_bot_token
        .clone()
        .context("TELEGRAM_BOT_TOKEN environment variable is required")?;
    let channel = Arc::new(TelegramChannel::new(token, config.channel_max_retries));

    let ledger = Arc::new(match (&config.spreadsheet_id, &config.sheets_access_token) {
        (Some(spreadsheet_id), Some(access_token)) => AnyLedger::Sheets(SheetsLedger::new(
            spreadsheet_id.clone(),
            config.sheet_range.clone(),
            access_token.clone(),
        )),
        _ => {
            tracing::info!("Status ledger not configured, transitions stay local");
            AnyLedger::Noop(NoopLedger)
        }
    });

    let registry = TickerRegistry::new(
        pool.clone(),
        channel.clone(),
        ledger.clone(),
        config.delivery_window(),
        Duration::from_secs(config.tick_interval_secs),
    );

    // The conversational frontend drives activation; at boot we reconcile
    // stored subscribers against the catalog (recipient id and project
    // edits land without a re-activation) and resume tickers for the ones
    // stored as Connected.
    let templates = catalog::load_task_templates(&config.tasks_file);
    let subscribers = catalog::load_subscribers(&config.subscribers_file);
    tracing::info!(
        templates = templates.len(),
        subscribers = subscribers.len(),
        "Catalog loaded"
    );
    SubscriberStatusManager::reconcile(&pool, &subscribers, chrono::Utc::now()).await?;

    for subscriber in SubscriberStatusManager::connected(&pool).await? {
        tracing::info!(subscriber = %subscriber.display_name, "Resuming ticker for connected subscriber");
        registry.resume(subscriber.id);
    }

    // Recovery runs once right away (boot catch-up) and then on its own slow
    // cadence, independent of the per-subscriber tickers.
    let (stop_recovery, recovery_shutdown) = tokio::sync::watch::channel(false);
    let recovery = tokio::spawn(ticker::run_recovery_loop(
        pool.clone(),
        channel.clone(),
        ledger.clone(),
        Duration::from_secs(config.recovery_interval_secs),
        recovery_shutdown,
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");

    let _ = stop_recovery.send(true);
    let _ = recovery.await;
    registry.shutdown().await;

    tracing::info!("RoutineHerald scheduler stopped.");
    Ok(())
}
