use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::models::classification::{ClassificationJob, ClassificationResult, ClassificationStats};

// Queue keys
const PENDING_QUEUE_KEY: &str = "classifier:queue:pending";
const PROCESSING_QUEUE_KEY: &str = "classifier:queue:processing";
const FAILED_QUEUE_KEY: &str = "classifier:queue:failed";
const REVIEW_QUEUE_KEY: &str = "classifier:queue:review";
const COMPLETED_SET_KEY: &str = "classifier:completed";

// Cache and lock keys
const IMAGE_CACHE_PREFIX: &str = "classifier:cache:image:";
const LOCK_PREFIX: &str = "classifier:lock:";

// TTLs
const CACHE_TTL_SECS: u64 = 24 * 60 * 60;
const PROCESSING_TTL_SECS: i64 = 5 * 60;
const LOCK_TTL_SECS: u64 = 30;
const COMPLETED_RETENTION_SECS: i64 = 7 * 24 * 60 * 60;

/// Composite sorted-set score: priority dominates, and within a priority band
/// earlier jobs rank higher so the queue never starves old work.
pub fn queue_score(priority: i32, created_at: &DateTime<Utc>) -> f64 {
    priority as f64 * 1e12 - created_at.timestamp_nanos_opt().unwrap_or_default() as f64
}

fn cache_key(image_url: &str) -> String {
    let mut id = Uuid::new_v5(&Uuid::NAMESPACE_URL, image_url.as_bytes())
        .simple()
        .to_string();
    id.truncate(16);
    format!("{IMAGE_CACHE_PREFIX}{id}")
}

/// Redis-backed priority queue with leases, a per-image result cache, and
/// per-product locks.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Check Redis connectivity (for health checks and startup).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Add a job to the pending queue. Assigns the job id and creation instant
    /// if the caller left them empty.
    pub async fn enqueue(&self, job: &mut ClassificationJob) -> Result<(), QueueError> {
        if job.id.is_empty() {
            job.id = Uuid::new_v4().to_string();
        }
        job.created_at = Utc::now();

        let payload = serde_json::to_string(job)?;
        let score = queue_score(job.priority, &job.created_at);

        let mut conn = self.conn().await?;
        redis::cmd("ZADD")
            .arg(PENDING_QUEUE_KEY)
            .arg(score)
            .arg(&payload)
            .query_async::<()>(&mut conn)
            .await?;

        tracing::debug!(
            job_id = %job.id,
            product_id = %job.product_id,
            priority = job.priority,
            "job enqueued"
        );

        Ok(())
    }

    /// Add many jobs in one pipelined round trip.
    pub async fn enqueue_batch(&self, jobs: &mut [ClassificationJob]) -> Result<(), QueueError> {
        let mut pipe = redis::pipe();
        for job in jobs.iter_mut() {
            if job.id.is_empty() {
                job.id = Uuid::new_v4().to_string();
            }
            job.created_at = Utc::now();

            let payload = serde_json::to_string(job)?;
            let score = queue_score(job.priority, &job.created_at);
            pipe.cmd("ZADD")
                .arg(PENDING_QUEUE_KEY)
                .arg(score)
                .arg(payload)
                .ignore();
        }

        let mut conn = self.conn().await?;
        pipe.query_async::<()>(&mut conn).await?;

        tracing::info!(count = jobs.len(), "batch enqueued");
        Ok(())
    }

    /// Pop the highest-scoring pending job and move it into the processing set
    /// under a lease that expires `PROCESSING_TTL_SECS` from now.
    pub async fn dequeue(&self) -> Result<Option<ClassificationJob>, QueueError> {
        let mut conn = self.conn().await?;

        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMAX")
            .arg(PENDING_QUEUE_KEY)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let Some((payload, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let job: ClassificationJob = serde_json::from_str(&payload)?;

        let lease_deadline = (Utc::now().timestamp() + PROCESSING_TTL_SECS) as f64;
        let processing_payload = serde_json::to_string(&job)?;
        redis::cmd("ZADD")
            .arg(PROCESSING_QUEUE_KEY)
            .arg(lease_deadline)
            .arg(&processing_payload)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(Some(job))
    }

    /// Remove a finished job from processing and remember its id.
    pub async fn complete(&self, job: &ClassificationJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;

        let mut conn = self.conn().await?;
        redis::pipe()
            .cmd("ZREM")
            .arg(PROCESSING_QUEUE_KEY)
            .arg(&payload)
            .ignore()
            .cmd("SADD")
            .arg(COMPLETED_SET_KEY)
            .arg(&job.id)
            .ignore()
            .cmd("EXPIRE")
            .arg(COMPLETED_SET_KEY)
            .arg(COMPLETED_RETENTION_SECS)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    /// Move a job to the failed set. The queue does not retry failed jobs;
    /// re-classification is an explicit API action.
    pub async fn fail(&self, job: &mut ClassificationJob, reason: &str) -> Result<(), QueueError> {
        // Serialize before bumping attempts: the processing member was stored
        // with the pre-failure attempt count.
        let processing_payload = serde_json::to_string(job)?;
        job.attempts += 1;
        let failed_payload = serde_json::to_string(job)?;

        tracing::warn!(
            job_id = %job.id,
            product_id = %job.product_id,
            attempts = job.attempts,
            reason,
            "job moved to failed queue"
        );

        let mut conn = self.conn().await?;
        redis::pipe()
            .cmd("ZREM")
            .arg(PROCESSING_QUEUE_KEY)
            .arg(&processing_payload)
            .ignore()
            .cmd("ZADD")
            .arg(FAILED_QUEUE_KEY)
            .arg(Utc::now().timestamp() as f64)
            .arg(&failed_payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    /// Park a low-confidence job in the review queue.
    pub async fn send_to_review(&self, job: &ClassificationJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;

        let mut conn = self.conn().await?;
        redis::cmd("ZADD")
            .arg(REVIEW_QUEUE_KEY)
            .arg(Utc::now().timestamp() as f64)
            .arg(&payload)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    /// Look up a previously classified image. Misses and undecodable entries
    /// both read as a miss.
    pub async fn get_cached_result(&self, image_url: &str) -> Option<ClassificationResult> {
        let mut conn = self.conn().await.ok()?;
        let data: Option<Vec<u8>> = conn.get(cache_key(image_url)).await.ok()?;
        serde_json::from_slice(&data?).ok()
    }

    /// Cache a classification result against its image URL for 24 hours.
    pub async fn cache_result(
        &self,
        image_url: &str,
        result: &ClassificationResult,
    ) -> Result<(), QueueError> {
        let data = serde_json::to_vec(result)?;
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(cache_key(image_url), data, CACHE_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Take the per-product lock. Set-if-absent with a 30 second TTL; the
    /// holder that loses a crashed worker's race simply waits out the TTL.
    pub async fn acquire_lock(&self, product_id: &str) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(format!("{LOCK_PREFIX}{product_id}"))
            .arg("locked")
            .arg("NX")
            .arg("EX")
            .arg(LOCK_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    pub async fn release_lock(&self, product_id: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(format!("{LOCK_PREFIX}{product_id}")).await?;
        Ok(())
    }

    /// Move expired processing entries back to pending, one priority lower so
    /// a poison job cannot block the head of the queue. Returns how many jobs
    /// were re-enqueued; undecodable entries are dropped from processing.
    pub async fn recover_stale_jobs(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn().await?;
        let now = Utc::now().timestamp() as f64;

        let stale: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(PROCESSING_QUEUE_KEY)
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await?;

        if stale.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        let mut recovered = 0i64;
        for payload in &stale {
            pipe.cmd("ZREM").arg(PROCESSING_QUEUE_KEY).arg(payload).ignore();

            let mut job: ClassificationJob = match serde_json::from_str(payload) {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable processing entry");
                    continue;
                }
            };

            job.attempts += 1;
            let score = queue_score(job.priority - 1, &job.created_at);
            let requeued = serde_json::to_string(&job)?;
            pipe.cmd("ZADD").arg(PENDING_QUEUE_KEY).arg(score).arg(requeued).ignore();
            recovered += 1;
        }

        pipe.query_async::<()>(&mut conn).await?;

        tracing::info!(count = recovered, "recovered stale jobs");
        Ok(recovered)
    }

    /// Bucket depths for `/stats`.
    pub async fn stats(&self) -> Result<ClassificationStats, QueueError> {
        let mut conn = self.conn().await?;

        let (pending, processing, failed, review, completed): (i64, i64, i64, i64, i64) =
            redis::pipe()
                .cmd("ZCARD")
                .arg(PENDING_QUEUE_KEY)
                .cmd("ZCARD")
                .arg(PROCESSING_QUEUE_KEY)
                .cmd("ZCARD")
                .arg(FAILED_QUEUE_KEY)
                .cmd("ZCARD")
                .arg(REVIEW_QUEUE_KEY)
                .cmd("SCARD")
                .arg(COMPLETED_SET_KEY)
                .query_async(&mut conn)
                .await?;

        Ok(ClassificationStats {
            total_processed: completed,
            pending_jobs: pending,
            processing_jobs: processing,
            failed_jobs: failed,
            review_queue: review,
            ..ClassificationStats::default()
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn higher_priority_scores_higher() {
        let now = Utc::now();
        assert!(queue_score(5, &now) > queue_score(3, &now));
        assert!(queue_score(1, &now) > queue_score(0, &now));
    }

    #[test]
    fn earlier_job_wins_within_priority_band() {
        let earlier = Utc::now();
        let later = earlier + Duration::seconds(1);
        assert!(queue_score(5, &earlier) > queue_score(5, &later));
    }

    #[test]
    fn recovery_demotion_ranks_below_fresh_jobs() {
        let now = Utc::now();
        // A recovered job at priority - 1 must not outrank a live job that was
        // enqueued at the original priority at the same instant.
        assert!(queue_score(4, &now) < queue_score(5, &now));
    }

    #[test]
    fn cache_key_is_stable_and_url_scoped() {
        let a = cache_key("https://cdn.example.com/a.jpg");
        let b = cache_key("https://cdn.example.com/b.jpg");
        assert_eq!(a, cache_key("https://cdn.example.com/a.jpg"));
        assert_ne!(a, b);
        let hash = a.strip_prefix(IMAGE_CACHE_PREFIX).unwrap();
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
