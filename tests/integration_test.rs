//! Integration tests against live Redis and PostgreSQL instances.
//!
//! Requirements:
//! 1. PostgreSQL reachable via DATABASE_URL (migrations are applied here)
//! 2. Redis reachable via REDIS_URL (default redis://127.0.0.1:6379)
//!
//! Run with: cargo test --test integration_test -- --ignored

use catalog_classifier::{
    config::AppConfig,
    db::{self, catalog_queries, queries},
    models::classification::{ClassificationJob, ClassificationStatus},
    models::product::{StorefrontImage, StorefrontProduct, StorefrontVariant, TagField},
    services::classifier::HybridClassifier,
    services::queue::{queue_score, JobQueue},
    services::vision::VisionClient,
    services::worker::WorkerPool,
};
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

fn test_job(priority: i32) -> ClassificationJob {
    ClassificationJob {
        id: String::new(),
        product_id: Uuid::new_v4().to_string(),
        image_url: format!("https://cdn.example.com/{}.jpg", Uuid::new_v4()),
        priority,
        created_at: Utc::now(),
        attempts: 0,
    }
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_enqueue_dequeue_complete_flow() {
    let queue = JobQueue::new(&redis_url()).expect("Failed to initialize queue");
    queue.health_check().await.expect("Redis unreachable");

    let mut job = test_job(5);
    queue.enqueue(&mut job).await.expect("Failed to enqueue");
    assert!(!job.id.is_empty(), "enqueue must assign a job id");

    let dequeued = queue
        .dequeue()
        .await
        .expect("Failed to dequeue")
        .expect("No job in queue");
    assert_eq!(dequeued.id, job.id);

    // The dequeued job holds a lease in the processing set.
    let stats = queue.stats().await.expect("Failed to get stats");
    assert!(stats.processing_jobs >= 1);

    queue.complete(&dequeued).await.expect("Failed to complete");
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_priority_ordering() {
    let queue = JobQueue::new(&redis_url()).expect("Failed to initialize queue");

    let mut low = test_job(1);
    let mut high = test_job(9);
    queue.enqueue(&mut low).await.expect("Failed to enqueue");
    queue.enqueue(&mut high).await.expect("Failed to enqueue");

    let first = queue.dequeue().await.expect("dequeue failed").expect("queue empty");
    let second = queue.dequeue().await.expect("dequeue failed").expect("queue empty");
    assert_eq!(first.id, high.id, "higher priority must dequeue first");
    assert_eq!(second.id, low.id);

    queue.complete(&first).await.expect("Failed to complete");
    queue.complete(&second).await.expect("Failed to complete");
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_fifo_within_priority_band() {
    let queue = JobQueue::new(&redis_url()).expect("Failed to initialize queue");

    let mut first = test_job(5);
    let mut second = test_job(5);
    queue.enqueue(&mut first).await.expect("Failed to enqueue");
    queue.enqueue(&mut second).await.expect("Failed to enqueue");

    let dequeued = queue.dequeue().await.expect("dequeue failed").expect("queue empty");
    assert_eq!(dequeued.id, first.id, "earlier job must win within a band");

    let rest = queue.dequeue().await.expect("dequeue failed").expect("queue empty");
    queue.complete(&dequeued).await.expect("Failed to complete");
    queue.complete(&rest).await.expect("Failed to complete");
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_lock_exclusivity() {
    let queue = JobQueue::new(&redis_url()).expect("Failed to initialize queue");
    let product_id = Uuid::new_v4().to_string();

    assert!(queue.acquire_lock(&product_id).await.expect("lock failed"));
    assert!(
        !queue.acquire_lock(&product_id).await.expect("lock failed"),
        "second acquisition must lose the race"
    );

    queue.release_lock(&product_id).await.expect("release failed");
    assert!(
        queue.acquire_lock(&product_id).await.expect("lock failed"),
        "lock must be free after release"
    );
    queue.release_lock(&product_id).await.expect("release failed");
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_cache_roundtrip_with_rebind() {
    let queue = JobQueue::new(&redis_url()).expect("Failed to initialize queue");

    let image_url = format!("https://cdn.example.com/{}.jpg", Uuid::new_v4());
    let result = sample_result(&image_url);
    queue.cache_result(&image_url, &result).await.expect("cache failed");

    let mut cached = queue
        .get_cached_result(&image_url)
        .await
        .expect("expected cache hit");
    assert_eq!(cached.image_url, image_url);
    assert_eq!(cached.category, result.category);
    assert_eq!(cached.overall_score, result.overall_score);

    // Rebinding to the current product is the caller's contract.
    let new_product = Uuid::new_v4();
    cached.product_id = new_product;
    assert_eq!(cached.product_id, new_product);

    // A different URL is a different cache entry.
    let miss_url = format!("https://cdn.example.com/{}.jpg", Uuid::new_v4());
    assert!(queue.get_cached_result(&miss_url).await.is_none());
}

fn sample_result(image_url: &str) -> catalog_classifier::models::classification::ClassificationResult {
    use catalog_classifier::models::classification::*;
    let now = Utc::now();
    ClassificationResult {
        id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        image_url: image_url.to_string(),
        category: Category::Jeans,
        category_score: 0.93,
        sub_category: String::new(),
        sub_category_score: 0.93,
        gender: Gender::Unisex,
        gender_score: 0.0,
        style: Style::Casual,
        style_score: 0.0,
        season: Season::AllSeason,
        season_score: 0.0,
        primary_color: "black".to_string(),
        secondary_color: String::new(),
        tertiary_color: String::new(),
        status: ClassificationStatus::Completed,
        overall_score: 0.465,
        needs_review: false,
        reviewed_at: None,
        reviewed_by: None,
        processed_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_stale_lease_recovery() {
    let queue = JobQueue::new(&redis_url()).expect("Failed to initialize queue");

    // Plant a processing entry whose lease expired ten seconds ago.
    let job = ClassificationJob {
        id: Uuid::new_v4().to_string(),
        product_id: Uuid::new_v4().to_string(),
        image_url: format!("https://cdn.example.com/{}.jpg", Uuid::new_v4()),
        priority: 5,
        created_at: Utc::now(),
        attempts: 0,
    };
    let payload = serde_json::to_string(&job).expect("serialize");

    let client = redis::Client::open(redis_url().as_str()).expect("redis client");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("redis connection");
    redis::cmd("ZADD")
        .arg("classifier:queue:processing")
        .arg((Utc::now().timestamp() - 10) as f64)
        .arg(&payload)
        .query_async::<()>(&mut conn)
        .await
        .expect("seed processing entry");

    let recovered = queue.recover_stale_jobs().await.expect("recovery failed");
    assert!(recovered >= 1);

    // The job is back in pending, demoted one priority, attempts bumped.
    let mut requeued = job.clone();
    requeued.attempts = 1;
    let requeued_payload = serde_json::to_string(&requeued).expect("serialize");
    let score: Option<f64> = redis::cmd("ZSCORE")
        .arg("classifier:queue:pending")
        .arg(&requeued_payload)
        .query_async(&mut conn)
        .await
        .expect("zscore");
    let score = score.expect("recovered job must be back in pending");
    let expected = queue_score(job.priority - 1, &job.created_at);
    assert!((score - expected).abs() < 1e6, "score {score} != expected {expected}");

    // Cleanup
    redis::cmd("ZREM")
        .arg("classifier:queue:pending")
        .arg(&requeued_payload)
        .query_async::<()>(&mut conn)
        .await
        .expect("cleanup");
}

fn sample_storefront_product(external_id: i64) -> StorefrontProduct {
    StorefrontProduct {
        id: external_id,
        title: "Vintage Jeans Baggy".to_string(),
        handle: "vintage-jeans-baggy".to_string(),
        body_html: "<p>Washed denim</p>".to_string(),
        vendor: "Test Vendor".to_string(),
        product_type: String::new(),
        tags: TagField::Joined("denim, new".to_string()),
        variants: vec![
            StorefrontVariant {
                id: 11,
                title: "S".to_string(),
                sku: Some("VJB-S".to_string()),
                price: "89.90".to_string(),
                compare_at_price: Some("120.00".to_string()),
                inventory_quantity: 3,
                option1: Some("S".to_string()),
                option2: None,
                option3: None,
                available: true,
            },
            StorefrontVariant {
                id: 12,
                title: "M".to_string(),
                sku: Some("VJB-M".to_string()),
                price: "99.90".to_string(),
                compare_at_price: None,
                inventory_quantity: 0,
                option1: Some("M".to_string()),
                option2: None,
                option3: None,
                available: false,
            },
        ],
        images: vec![StorefrontImage {
            id: 21,
            src: "https://cdn.example.com/vjb.jpg".to_string(),
            alt: Some("front".to_string()),
            width: Some(1200),
            height: Some(1600),
            position: 1,
        }],
        published_at: None,
    }
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_upsert_idempotence_and_projections() {
    let pool = db::init_pool(&database_url()).await.expect("db pool");
    db::run_migrations(&pool).await.expect("migrations");

    let slug = format!("test-vendor-{}", Uuid::new_v4());
    let vendor_id: Uuid =
        sqlx::query_scalar("INSERT INTO vendors (name, slug, domain) VALUES ($1, $2, $3) RETURNING id")
            .bind("Test Vendor")
            .bind(&slug)
            .bind("test-vendor.example.com")
            .fetch_one(&pool)
            .await
            .expect("create vendor");

    let product = sample_storefront_product(9001);

    let (id_first, created_first) = catalog_queries::upsert_product(&pool, vendor_id, &product)
        .await
        .expect("first upsert");
    assert!(created_first, "first upsert must create");

    let (id_second, created_second) = catalog_queries::upsert_product(&pool, vendor_id, &product)
        .await
        .expect("second upsert");
    assert_eq!(id_first, id_second, "upsert must be keyed by (vendor_id, external_id)");
    assert!(!created_second, "second upsert must update");

    // Denormalized projections
    let row = sqlx::query(
        "SELECT price_min::float8 AS price_min, price_max::float8 AS price_max, is_available \
         FROM products WHERE id = $1",
    )
    .bind(id_first)
    .fetch_one(&pool)
    .await
    .expect("read product");
    use sqlx::Row;
    let price_min: f64 = row.get("price_min");
    let price_max: f64 = row.get("price_max");
    let is_available: bool = row.get("is_available");
    assert!((price_min - 89.90).abs() < 1e-9);
    assert!((price_max - 99.90).abs() < 1e-9);
    assert!(is_available, "one available variant makes the product available");

    // Children are replaced, not accumulated.
    let variant_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM product_variants WHERE product_id = $1")
            .bind(id_first)
            .fetch_one(&pool)
            .await
            .expect("count variants");
    assert_eq!(variant_count, 2);

    sqlx::query("DELETE FROM vendors WHERE id = $1")
        .bind(vendor_id)
        .execute(&pool)
        .await
        .expect("cleanup vendor");
}

/// Full pipeline against a fake vision endpoint: a cold image triggers one
/// model call; a second submission of the same image is served from cache.
#[tokio::test]
#[ignore] // Requires Redis and PostgreSQL
async fn test_worker_end_to_end_with_fake_vision() {
    let pool = db::init_pool(&database_url()).await.expect("db pool");
    db::run_migrations(&pool).await.expect("migrations");

    // Fake vision service that counts /classify calls.
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = axum::Router::new()
        .route(
            "/classify",
            axum::routing::post(move |_body: axum::Json<serde_json::Value>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    axum::Json(serde_json::json!({
                        "labels": [{"name": "jeans", "score": 0.93}],
                        "process_time_ms": 12.0,
                    }))
                }
            }),
        )
        .route("/health", axum::routing::get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let model_url = format!("http://{}", listener.local_addr().expect("addr"));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake vision server");
    });

    let config = AppConfig {
        server_port: 0,
        database_url: database_url(),
        redis_url: redis_url(),
        redis_password: String::new(),
        worker_count: 1,
        batch_size: 10,
        processing_timeout_sec: 10,
        model_service_url: model_url.clone(),
        // (0.93 + 0.93 + 0 + 0) / 4 with secondary labels disabled.
        confidence_threshold: 0.40,
        rate_limit_rps: 1,
        rate_limit_burst: 1,
        enable_secondary_labels: false,
        run_once: false,
        debug: false,
        sync_cron: "0 0 */6 * * *".to_string(),
        user_agent: "test".to_string(),
    };

    let queue = Arc::new(JobQueue::new(&config.redis_connection_url()).expect("queue"));
    let vision = VisionClient::new(&model_url).expect("vision client");
    let classifier = Arc::new(HybridClassifier::new(vision, false));
    let worker = Arc::new(WorkerPool::new(
        config,
        queue.clone(),
        classifier,
        pool.clone(),
    ));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.clone().run(cancel.clone()));

    let product_id = Uuid::new_v4();
    let image_url = format!("https://cdn.example.com/e2e-{}.jpg", Uuid::new_v4());

    let mut job = ClassificationJob {
        id: String::new(),
        product_id: product_id.to_string(),
        image_url: image_url.clone(),
        priority: 5,
        created_at: Utc::now(),
        attempts: 0,
    };
    queue.enqueue(&mut job).await.expect("enqueue");

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one vision call for a cold image");

    let result = queries::get_classification_by_product(&pool, product_id)
        .await
        .expect("query result")
        .expect("result persisted");
    assert_eq!(result.status, ClassificationStatus::Completed);
    assert!(!result.needs_review);

    // Same image again, different product: cache short-circuits the model.
    let second_product = Uuid::new_v4();
    let mut second = ClassificationJob {
        id: String::new(),
        product_id: second_product.to_string(),
        image_url: image_url.clone(),
        priority: 5,
        created_at: Utc::now(),
        attempts: 0,
    };
    queue.enqueue(&mut second).await.expect("enqueue second");

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "cached image must not trigger another vision call"
    );
    let rebound = queries::get_classification_by_product(&pool, second_product)
        .await
        .expect("query result")
        .expect("cached result rebound to second product");
    assert_eq!(rebound.product_id, second_product);
    assert_eq!(rebound.image_url, image_url);

    let (processed, failed) = worker.stats().await;
    assert!(processed >= 2);
    assert_eq!(failed, 0);

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    // Cleanup
    for pid in [product_id, second_product] {
        sqlx::query("DELETE FROM product_classifications WHERE product_id = $1")
            .bind(pid)
            .execute(&pool)
            .await
            .expect("cleanup");
    }
}
