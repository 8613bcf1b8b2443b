use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Candidate labels for zero-shot category classification.
pub const CATEGORY_LABELS: &[&str] = &[
    "a t-shirt",
    "a shirt",
    "a polo shirt",
    "a tank top",
    "a hoodie",
    "a sweatshirt",
    "a crewneck",
    "a zip-up hoodie",
    "a sweater",
    "a cardigan",
    "a knit sweater",
    "a jacket",
    "a coat",
    "a bomber jacket",
    "a windbreaker",
    "a puffer jacket",
    "jeans",
    "pants",
    "cargo pants",
    "joggers",
    "trousers",
    "shorts",
    "swim shorts",
    "sneakers",
    "boots",
    "sandals",
    "loafers",
    "shoes",
    "a bag",
    "a backpack",
    "a hat",
    "a cap",
    "a belt",
    "jewelry",
    "a wallet",
    "socks",
    "a scarf",
    "a dress",
];

pub const GENDER_LABELS: &[&str] = &[
    "menswear, men's clothing",
    "womenswear, women's clothing",
    "unisex clothing",
    "children's clothing, kids wear",
];

pub const STYLE_LABELS: &[&str] = &[
    "casual style clothing",
    "formal style clothing",
    "sportswear, athletic clothing",
    "streetwear style clothing",
    "vintage style clothing",
    "minimalist style clothing",
];

pub const SEASON_LABELS: &[&str] = &[
    "summer clothing, lightweight",
    "winter clothing, warm, heavy",
    "spring or fall clothing, mid-season",
    "all-season clothing, versatile",
];

pub const COLOR_LABELS: &[&str] = &[
    "black",
    "white",
    "gray",
    "navy blue",
    "blue",
    "light blue",
    "red",
    "burgundy",
    "pink",
    "orange",
    "yellow",
    "green",
    "olive",
    "brown",
    "beige",
    "cream",
    "purple",
    "multicolor",
];

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    image_url: &'a str,
    labels: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    labels: Vec<Prediction>,
    #[serde(default)]
    #[allow(dead_code)]
    process_time_ms: Option<f64>,
}

/// One scored label from the model service.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub name: String,
    pub score: f64,
}

/// Client for the zero-shot vision model service.
pub struct VisionClient {
    base_url: String,
    http: Client,
}

impl VisionClient {
    pub fn new(base_url: &str) -> Result<Self, VisionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(VisionError::Http)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Score an image against a candidate label set. Returns predictions
    /// sorted by descending score.
    pub async fn classify_labels(
        &self,
        image_url: &str,
        labels: &[&str],
    ) -> Result<Vec<Prediction>, VisionError> {
        let url = format!("{}/classify", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&ClassifyRequest { image_url, labels })
            .send()
            .await
            .map_err(VisionError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let mut parsed: ClassifyResponse = response.json().await.map_err(VisionError::Http)?;
        parsed
            .labels
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok(parsed.labels)
    }

    /// Verify the model service is up.
    pub async fn health_check(&self) -> Result<(), VisionError> {
        let url = format!("{}/health", self.base_url);
        let response = self.http.get(&url).send().await.map_err(VisionError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::Status {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model service returned {status}: {body}")]
    Status { status: u16, body: String },
}
