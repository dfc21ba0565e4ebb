use crate::services::share_service::ShareService;
use crate::utils::keyed_mutex::KeyedMutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Jobs claimed per poll
const JOBS_PER_TICK: u64 = 50;

/// Running jobs untouched for this long are assumed abandoned.
const STALE_JOB_MINUTES: i64 = 30;

pub struct BackgroundWorker {
    share_service: Arc<ShareService>,
    locks: KeyedMutex,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        share_service: Arc<ShareService>,
        locks: KeyedMutex,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            share_service,
            locks,
            poll_interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Background worker started (poll every {:?})",
            self.poll_interval
        );

        self.recover().await;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.poll_interval) => {
                    self.tick().await;
                }
            }
        }
    }

    async fn recover(&self) {
        if let Err(e) = self
            .share_service
            .recover_stale_jobs(chrono::Duration::minutes(STALE_JOB_MINUTES))
            .await
        {
            tracing::error!("Failed to requeue stale share jobs: {}", e);
        }
    }

    /// One polling round: drains due share jobs, then prunes idle locks.
    pub async fn tick(&self) {
        loop {
            match self.share_service.process_due_jobs(JOBS_PER_TICK).await {
                Ok(summary) => {
                    let handled = summary.completed + summary.retried + summary.failed;
                    if (handled as u64) < JOBS_PER_TICK {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to process share jobs: {}", e);
                    break;
                }
            }
        }

        self.recover().await;
        self.locks.cleanup();
    }
}
