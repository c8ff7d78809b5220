//! Background cleanup of expired bearer sessions.
//!
//! Every granted sign-in writes an `auth_sessions` row. Lookups already ignore
//! expired rows; this task deletes them so the table stays bounded.

use anyhow::Result;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::HousekeepingConfig;
use crate::db::Store;

pub struct Housekeeper {
    store: Store,
    config: HousekeepingConfig,
}

impl Housekeeper {
    #[must_use]
    pub const fn new(store: Store, config: HousekeepingConfig) -> Self {
        Self { store, config }
    }

    /// Runs until the owning task is aborted.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Session housekeeping is disabled in config");
            return Ok(());
        }

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    /// Deletes every expired session and returns how many went.
    pub async fn prune_once(&self) -> Result<u64> {
        prune(&self.store).await
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let sched = JobScheduler::new().await?;

        let store = self.store.clone();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let store = store.clone();
            Box::pin(async move {
                if let Err(e) = prune(&store).await {
                    error!("Scheduled session prune failed: {}", e);
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Session housekeeping running with cron: {}", cron_expr);
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let minutes = u64::from(self.config.session_prune_interval_minutes);
        info!("Session housekeeping running every {} minutes", minutes);

        let mut ticker = interval(Duration::from_secs(minutes * 60));
        loop {
            ticker.tick().await;
            if let Err(e) = prune(&self.store).await {
                error!("Scheduled session prune failed: {}", e);
            }
        }
    }
}

async fn prune(store: &Store) -> Result<u64> {
    let pruned = store.prune_expired_sessions().await?;
    if pruned > 0 {
        info!(pruned, "Pruned expired sessions");
    }
    metrics::counter!("auth_sessions_pruned_total").increment(pruned);
    Ok(pruned)
}
