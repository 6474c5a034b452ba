//! Background scheduled tasks for the application.
//!
//! The only recurring job is the monthly price settlement. It is started once
//! from `main` and stopped through the returned handle during shutdown.

use crate::config::SyncConfig;
use crate::services::SyncService;
use crate::utils::next_month_start;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct SyncTaskHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl SyncTaskHandle {
    fn disabled() -> Self {
        Self {
            token: CancellationToken::new(),
            join: None,
        }
    }

    /// Cancel the task and wait for it to finish its current pass.
    pub async fn shutdown(self) {
        log::info!("Stopping monthly price settlement task");
        self.token.cancel();
        if let Some(join) = self.join
            && let Err(e) = join.await
        {
            log::error!("Monthly price settlement task ended abnormally: {e:?}");
        }
    }
}

/// Time left until 00:00 UTC on the first day of the next month.
pub fn until_next_month(now: DateTime<Utc>) -> std::time::Duration {
    let boundary = next_month_start(now.date_naive())
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now);
    (boundary - now).to_std().unwrap_or_default()
}

async fn run_settlement(service: &SyncService) {
    match service.sync_subscription_prices().await {
        Ok(n) if n > 0 => log::info!("Subscription prices settled: {n}"),
        Ok(_) => log::debug!("No subscription prices needed settling"),
        Err(e) => log::error!("Failed to settle subscription prices: {e:?}"),
    }
}

/// Spawn the monthly settlement loop.
///
/// Notes
/// - Settlement is idempotent, so an extra startup pass is harmless.
/// - Failures are logged and the loop keeps waiting for the next month.
pub fn spawn_monthly_sync(service: SyncService, config: &SyncConfig) -> SyncTaskHandle {
    if !config.enabled {
        log::info!("Monthly price settlement disabled by configuration");
        return SyncTaskHandle::disabled();
    }

    let token = CancellationToken::new();
    let shutdown = token.clone();
    let run_on_startup = config.run_on_startup;

    let join = tokio::spawn(async move {
        if run_on_startup {
            run_settlement(&service).await;
        }
        loop {
            let wait = until_next_month(Utc::now());
            log::debug!("Next price settlement in {}s", wait.as_secs());
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Monthly price settlement task shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => run_settlement(&service).await,
            }
        }
    });

    SyncTaskHandle {
        token,
        join: Some(join),
    }
}
