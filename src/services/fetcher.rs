use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::Client;

use crate::models::product::{CatalogPage, StorefrontProduct};

const PAGE_LIMIT: usize = 250;
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate-limited client for vendor catalog endpoints. Every request waits for
/// a token; transient upstream errors are retried with quadratic backoff.
pub struct CatalogClient {
    http: Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl CatalogClient {
    pub fn new(user_agent: &str, requests_per_second: u32, burst: u32) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Http)?;

        let rps = NonZeroU32::new(requests_per_second.max(1))
            .unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(rps).allow_burst(burst));

        Ok(Self { http, limiter })
    }

    /// Fetch the full catalog of a storefront, page by page. Stops when a
    /// page comes back short.
    pub async fn fetch_products(&self, domain: &str) -> Result<Vec<StorefrontProduct>, FetchError> {
        let mut all_products = Vec::new();
        let mut page = 1u32;

        loop {
            self.limiter.until_ready().await;

            let url = format!("https://{domain}/products.json?limit={PAGE_LIMIT}&page={page}");
            let products = self.fetch_page(&url).await.map_err(|source| FetchError::Page {
                page,
                source: Box::new(source),
            })?;

            if products.is_empty() {
                break;
            }

            let count = products.len();
            all_products.extend(products);

            if count < PAGE_LIMIT {
                break;
            }
            page += 1;
        }

        Ok(all_products)
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<StorefrontProduct>, FetchError> {
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = Duration::from_secs(u64::from(attempt * attempt));
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .http
                .get(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(FetchError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(FetchError::Status(status.as_u16()));
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let page: CatalogPage = response.json().await.map_err(FetchError::Http)?;
            return Ok(page.products);
        }

        Err(FetchError::RetriesExhausted(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status code {0}")]
    Status(u16),

    #[error("all retries failed: {0}")]
    RetriesExhausted(String),

    #[error("failed to fetch page {page}: {source}")]
    Page {
        page: u32,
        source: Box<FetchError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn products_json(count: usize) -> serde_json::Value {
        let products: Vec<_> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "id": i as i64,
                    "title": format!("Product {i}"),
                    "handle": format!("product-{i}"),
                })
            })
            .collect();
        serde_json::json!({ "products": products })
    }

    #[tokio::test]
    async fn fetch_page_decodes_products() {
        let base = serve(Router::new().route(
            "/products.json",
            get(|| async { Json(products_json(3)) }),
        ))
        .await;

        let client = CatalogClient::new("test-agent", 100, 100).unwrap();
        let products = client
            .fetch_page(&format!("{base}/products.json"))
            .await
            .unwrap();
        assert_eq!(products.len(), 3);
        assert_eq!(products[0].title, "Product 0");
    }

    #[tokio::test]
    async fn fetch_page_retries_server_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/products.json",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
                    } else {
                        Ok(Json(products_json(1)))
                    }
                }
            }),
        ))
        .await;

        let client = CatalogClient::new("test-agent", 100, 100).unwrap();
        let products = client
            .fetch_page(&format!("{base}/products.json"))
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2, "one failure, one retry");
    }

    #[tokio::test]
    async fn fetch_page_does_not_retry_client_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let base = serve(Router::new().route(
            "/products.json",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::NOT_FOUND
                }
            }),
        ))
        .await;

        let client = CatalogClient::new("test-agent", 100, 100).unwrap();
        let err = client
            .fetch_page(&format!("{base}/products.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
        assert_eq!(hits.load(Ordering::SeqCst), 1, "4xx must not be retried");
    }
}
