use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::repositories::accounts::Ledger;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Resets usage counters once per UTC day. The ledger records the last reset
/// date, so repeated ticks and restarts within a day are no-ops.
pub async fn start_daily_reset_task(ledger: Arc<dyn Ledger>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHECK_INTERVAL);

        loop {
            interval.tick().await;

            match run_daily_reset(ledger.as_ref(), Utc::now()).await {
                Ok(true) => log::info!("Daily usage reset."),
                Ok(false) => {}
                Err(e) => log::error!("Error resetting daily usage: {}", e),
            }
        }
    });

    log::info!("Daily reset task started");
}

pub async fn run_daily_reset(ledger: &dyn Ledger, now: DateTime<Utc>) -> Result<bool, anyhow::Error> {
    ledger.reset_daily_usage_once(now.date_naive()).await
}
