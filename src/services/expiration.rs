use crate::config::ServiceConfig;
use crate::entities::{prelude::*, *};
use crate::services::file_service::purge_file;
use crate::services::storage::StorageService;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub files_removed: usize,
    pub files_failed: usize,
    pub links_removed: u64,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} files removed, {} failed, {} share links removed",
            self.files_removed, self.files_failed, self.links_removed
        )
    }
}

/// Daily removal of expired files and share links
pub struct ExpiryScheduler {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    config: ServiceConfig,
    shutdown: watch::Receiver<bool>,
}

impl ExpiryScheduler {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: ServiceConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            storage,
            config,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Expiry scheduler started, sweeping daily at {:02}:00 UTC",
            self.config.sweep_hour_utc
        );

        loop {
            let wait = until_next_sweep(Utc::now(), self.config.sweep_hour_utc);
            tracing::debug!("Next expiry sweep in {:?}", wait);

            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("Expiry scheduler shutting down");
                    break;
                }
                _ = sleep(wait) => {
                    self.run_sweep().await;
                }
            }
        }
    }

    pub async fn run_sweep(&self) -> SweepReport {
        self.run_sweep_at(Utc::now()).await
    }

    /// Remove everything that expired before `now`.
    ///
    /// Each file is handled on its own; a failure is logged and the next run picks it up again.
    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        tracing::info!("Running expiry sweep for items expired before {}", now);
        let mut report = SweepReport::default();

        match Files::find()
            .filter(files::Column::ExpiresAt.lt(now))
            .all(&self.db)
            .await
        {
            Ok(expired) => {
                for file in expired {
                    match purge_file(&self.db, self.storage.as_ref(), &file).await {
                        Ok(()) => {
                            tracing::info!("Expired file removed: {} ({})", file.id, file.object_name);
                            report.files_removed += 1;
                        }
                        Err(e) => {
                            tracing::error!("Failed to remove expired file {}: {}", file.id, e);
                            report.files_failed += 1;
                        }
                    }
                }
            }
            Err(e) => tracing::error!("Failed to list expired files: {}", e),
        }

        match ShareLinks::delete_many()
            .filter(share_links::Column::ExpiresAt.lt(now))
            .exec(&self.db)
            .await
        {
            Ok(res) => report.links_removed = res.rows_affected,
            Err(e) => tracing::error!("Failed to remove expired share links: {}", e),
        }

        tracing::info!("Expiry sweep completed: {}", report);
        report
    }
}

/// Time from `now` until the next `hour`:00 UTC, never zero
pub fn until_next_sweep(now: DateTime<Utc>, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let mut next = now.date_naive().and_time(at).and_utc();
    if next <= now {
        next += ChronoDuration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}
