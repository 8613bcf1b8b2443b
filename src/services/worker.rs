use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::queries;
use crate::models::classification::{ClassificationJob, ClassificationResult, ClassificationStatus};
use crate::services::classifier::HybridClassifier;
use crate::services::decision;
use crate::services::queue::JobQueue;

const IDLE_PAUSE: Duration = Duration::from_millis(100);
const ERROR_PAUSE: Duration = Duration::from_secs(1);
const RECOVERY_INTERVAL: Duration = Duration::from_secs(30);

type WorkerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Default)]
struct WorkerState {
    is_running: bool,
    processed: u64,
    failed: u64,
}

/// A fixed fan-out of cooperative consumers over the classification queue,
/// plus one stale-lease recovery ticker.
pub struct WorkerPool {
    config: AppConfig,
    queue: Arc<JobQueue>,
    classifier: Arc<HybridClassifier>,
    db: PgPool,
    state: Mutex<WorkerState>,
}

impl WorkerPool {
    pub fn new(
        config: AppConfig,
        queue: Arc<JobQueue>,
        classifier: Arc<HybridClassifier>,
        db: PgPool,
    ) -> Self {
        Self {
            config,
            queue,
            classifier,
            db,
            state: Mutex::new(WorkerState::default()),
        }
    }

    /// Run all worker tasks until the token is cancelled. Idempotent: a
    /// second call while running returns immediately.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        {
            let mut state = self.state.lock().await;
            if state.is_running {
                return;
            }
            state.is_running = true;
        }

        tracing::info!(workers = self.config.worker_count, "starting worker pool");

        let mut tasks = JoinSet::new();

        {
            let pool = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { pool.recovery_loop(cancel).await });
        }

        for worker_id in 0..self.config.worker_count {
            let pool = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { pool.process_loop(worker_id, cancel).await });
        }

        while tasks.join_next().await.is_some() {}

        self.state.lock().await.is_running = false;
        tracing::info!("worker pool stopped");
    }

    /// Process-wide (processed, failed) counters.
    pub async fn stats(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.processed, state.failed)
    }

    async fn process_loop(&self, worker_id: usize, cancel: CancellationToken) {
        tracing::info!(worker_id, "worker started");

        loop {
            if cancel.is_cancelled() {
                tracing::info!(worker_id, "worker stopping");
                return;
            }

            match self.process_one().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(IDLE_PAUSE).await,
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "error processing job");
                    tokio::time::sleep(ERROR_PAUSE).await;
                }
            }
        }
    }

    /// Process a single job. `Ok(true)` if a job was handled (even if it
    /// failed and went to the failed queue), `Ok(false)` if the queue was
    /// empty. A per-job failure never takes the worker down.
    async fn process_one(&self) -> WorkerResult<bool> {
        let Some(mut job) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        tracing::debug!(job_id = %job.id, product_id = %job.product_id, "processing job");
        let started = Instant::now();

        // A malformed product id is a job failure, not a worker crash.
        let product_id = match Uuid::parse_str(&job.product_id) {
            Ok(id) => id,
            Err(_) => {
                self.queue.fail(&mut job, "invalid product id").await?;
                self.mark_failed().await;
                return Ok(true);
            }
        };

        // Cache probe: an already-classified image short-circuits the vision
        // call, rebound to the product this job is about.
        if let Some(mut cached) = self.queue.get_cached_result(&job.image_url).await {
            tracing::debug!(job_id = %job.id, "cache hit, using cached result");
            cached.product_id = product_id;
            if let Err(e) = self.save_result(product_id, &cached).await {
                self.queue.fail(&mut job, &e.to_string()).await?;
                self.mark_failed().await;
                return Ok(true);
            }
            self.queue.complete(&job).await?;
            self.mark_processed().await;
            return Ok(true);
        }

        // Dedup lock. Losing the race means another worker owns this product;
        // drop the job and let lease recovery requeue it if that worker dies.
        if !self.queue.acquire_lock(&job.product_id).await? {
            tracing::debug!(
                job_id = %job.id,
                product_id = %job.product_id,
                "product locked by another worker, dropping job"
            );
            return Ok(true);
        }

        let outcome = self.classify_and_persist(&mut job, product_id).await;
        if let Err(e) = self.queue.release_lock(&job.product_id).await {
            tracing::warn!(product_id = %job.product_id, error = %e, "failed to release lock");
        }
        outcome?;

        histogram!("classification_processing_seconds").record(started.elapsed().as_secs_f64());
        Ok(true)
    }

    async fn classify_and_persist(
        &self,
        job: &mut ClassificationJob,
        product_id: Uuid,
    ) -> WorkerResult<()> {
        // Title lookup is best-effort; vision-only classification still works.
        let title = match queries::get_product_summary(&self.db, product_id).await {
            Ok(Some(product)) => product.title,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(product_id = %product_id, error = %e, "failed to load product title");
                String::new()
            }
        };

        let classify = async {
            if title.is_empty() {
                self.classifier.classify(&job.image_url).await
            } else {
                self.classifier.classify_with_title(&job.image_url, &title).await
            }
        };

        let mut result = match tokio::time::timeout(self.config.processing_timeout(), classify).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(job_id = %job.id, error = %e, "classification failed");
                self.queue.fail(job, &e.to_string()).await?;
                self.mark_failed().await;
                return Ok(());
            }
            Err(_) => {
                tracing::error!(job_id = %job.id, "classification timed out");
                self.queue.fail(job, "classification timed out").await?;
                self.mark_failed().await;
                return Ok(());
            }
        };

        result.id = Uuid::new_v4();
        result.product_id = product_id;

        if result.overall_score < self.config.confidence_threshold {
            result.needs_review = true;
            result.status = ClassificationStatus::Review;
            self.queue.send_to_review(job).await?;
            tracing::info!(
                job_id = %job.id,
                confidence = result.overall_score,
                threshold = self.config.confidence_threshold,
                "low confidence, sent to review"
            );
        } else {
            result.status = ClassificationStatus::Completed;
        }

        if let Err(e) = self.save_result(product_id, &result).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to save result");
            self.queue.fail(job, &e.to_string()).await?;
            return Ok(());
        }

        if let Err(e) = self.queue.cache_result(&job.image_url, &result).await {
            tracing::warn!(job_id = %job.id, error = %e, "failed to cache result");
        }

        self.queue.complete(job).await?;
        self.mark_processed().await;

        tracing::info!(
            job_id = %job.id,
            category = result.category.as_slug(),
            confidence = result.overall_score,
            status = result.status.as_str(),
            "job completed"
        );

        Ok(())
    }

    async fn save_result(&self, product_id: Uuid, result: &ClassificationResult) -> WorkerResult<()> {
        queries::save_classification(&self.db, result).await?;
        queries::update_product_type(&self.db, product_id, decision::product_type_for(result.category))
            .await?;
        Ok(())
    }

    async fn recovery_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(RECOVERY_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    match self.queue.recover_stale_jobs().await {
                        Ok(recovered) if recovered > 0 => {
                            tracing::info!(count = recovered, "recovered stale jobs");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "failed to recover stale jobs"),
                    }
                }
            }
        }
    }

    async fn mark_processed(&self) {
        self.state.lock().await.processed += 1;
        counter!("classifier_jobs_processed_total").increment(1);
    }

    async fn mark_failed(&self) {
        self.state.lock().await.failed += 1;
        counter!("classifier_jobs_failed_total").increment(1);
    }
}
