use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{JobRepository, RepositoryError};

/// Evicts finished jobs once their retention period has passed.
pub struct RetentionSweeper {
    job_repository: Arc<dyn JobRepository>,
    retention: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(job_repository: Arc<dyn JobRepository>, retention: Duration, interval: Duration) -> Self {
        Self {
            job_repository,
            retention,
            interval,
        }
    }

    pub async fn sweep(&self) -> Result<usize, RepositoryError> {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        self.job_repository.evict_terminal_before(cutoff).await
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            retention_secs = self.retention.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Retention sweeper started"
        );
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.sweep().await {
                    Ok(0) => {}
                    Ok(evicted) => tracing::debug!(evicted, "Evicted expired jobs"),
                    Err(e) => tracing::warn!(error = %e, "Retention sweep failed"),
                },
            }
        }
        tracing::info!("Retention sweeper stopped");
    }
}
