use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::db::catalog_queries;
use crate::models::product::{SyncOutcome, Vendor};
use crate::services::fetcher::CatalogClient;

/// Ceiling on one full sync pass across all vendors.
const SYNC_RUN_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// How many vendors sync concurrently.
const MAX_CONCURRENT_VENDORS: usize = 3;

/// Cron-driven catalog ingestion across all active vendors.
pub struct SyncScheduler {
    db: PgPool,
    client: Arc<CatalogClient>,
    cron: String,
}

impl SyncScheduler {
    pub fn new(db: PgPool, client: CatalogClient, cron: String) -> Self {
        Self {
            db,
            client: Arc::new(client),
            cron,
        }
    }

    /// Register the sync job with the cron engine and start it. The returned
    /// scheduler handle keeps the cron alive; shut it down to stop.
    pub async fn start(self: Arc<Self>) -> Result<JobScheduler, JobSchedulerError> {
        let sched = JobScheduler::new().await?;

        let this = self.clone();
        let job = Job::new_async(self.cron.as_str(), move |_id, _lock| {
            let this = this.clone();
            Box::pin(async move {
                this.run_sync().await;
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        tracing::info!(cron = %self.cron, "sync scheduler started");
        Ok(sched)
    }

    /// One bounded sync pass. Used by the cron job and by one-shot mode.
    pub async fn run_sync(self: Arc<Self>) {
        if tokio::time::timeout(SYNC_RUN_TIMEOUT, self.clone().sync_all())
            .await
            .is_err()
        {
            tracing::error!("sync run exceeded the two hour limit and was cancelled");
        }
    }

    async fn sync_all(self: Arc<Self>) {
        let vendors = match catalog_queries::active_vendors(&self.db).await {
            Ok(vendors) => vendors,
            Err(e) => {
                tracing::error!(error = %e, "failed to load active vendors");
                return;
            }
        };

        if vendors.is_empty() {
            tracing::info!("no active vendors to sync");
            return;
        }

        tracing::info!(count = vendors.len(), "starting sync for all vendors");

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_VENDORS));
        let mut tasks = JoinSet::new();

        for vendor in vendors {
            let this = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return SyncOutcome::default(),
                };
                this.sync_vendor(vendor).await
            });
        }

        let mut found = 0;
        let mut created = 0;
        let mut updated = 0;
        let mut errors = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    found += outcome.products_found;
                    created += outcome.products_created;
                    updated += outcome.products_updated;
                    if outcome.error.is_some() {
                        errors += 1;
                    }
                }
                Err(e) => {
                    errors += 1;
                    tracing::error!(error = %e, "vendor sync task failed");
                }
            }
        }

        tracing::info!(found, created, updated, errors, "sync completed");
    }

    /// Sync one vendor's catalog. Failures are captured in the outcome and
    /// the sync log; they never abort the rest of the run.
    async fn sync_vendor(&self, vendor: Vendor) -> SyncOutcome {
        tracing::info!(vendor = %vendor.name, domain = %vendor.domain, "syncing vendor");

        let mut outcome = SyncOutcome::default();

        let log_id = match catalog_queries::create_sync_log(&self.db, vendor.id).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(vendor = %vendor.name, error = %e, "failed to create sync log");
                None
            }
        };

        match self.client.fetch_products(&vendor.domain).await {
            Ok(products) => {
                outcome.products_found = products.len() as i32;
                tracing::info!(vendor = %vendor.name, count = products.len(), "fetched products");

                for product in &products {
                    match catalog_queries::upsert_product(&self.db, vendor.id, product).await {
                        Ok((_, true)) => outcome.products_created += 1,
                        Ok((_, false)) => outcome.products_updated += 1,
                        Err(e) => {
                            tracing::error!(
                                vendor = %vendor.name,
                                product = %product.title,
                                error = %e,
                                "failed to upsert product"
                            );
                        }
                    }
                }

                if let Err(e) = catalog_queries::touch_vendor_last_synced(&self.db, vendor.id).await
                {
                    tracing::error!(vendor = %vendor.name, error = %e, "failed to update last_synced_at");
                }
            }
            Err(e) => {
                tracing::error!(vendor = %vendor.name, error = %e, "failed to fetch catalog");
                outcome.error = Some(e.to_string());
            }
        }

        if let Some(log_id) = log_id {
            if let Err(e) = catalog_queries::finish_sync_log(&self.db, log_id, &outcome).await {
                tracing::warn!(vendor = %vendor.name, error = %e, "failed to finalize sync log");
            }
        }

        tracing::info!(
            vendor = %vendor.name,
            created = outcome.products_created,
            updated = outcome.products_updated,
            "completed vendor sync"
        );

        outcome
    }
}
