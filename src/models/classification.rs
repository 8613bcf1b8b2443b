use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical product category. The slugs are what the store persists and the
/// API exposes; `Other` is the fallback for anything the model cannot place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Blazer,
    DenimJacket,
    Dresses,
    Hoodie,
    Jacket,
    Jeans,
    LongPants,
    Polo,
    Shirt,
    Shorts,
    Skirt,
    SportsJacket,
    Sweater,
    TShirt,
    Shoes,
    Accessories,
    Other,
}

impl Category {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Category::Blazer => "blazer",
            Category::DenimJacket => "denim-jacket",
            Category::Dresses => "dresses",
            Category::Hoodie => "hoodie",
            Category::Jacket => "jacket",
            Category::Jeans => "jeans",
            Category::LongPants => "long-pants",
            Category::Polo => "polo",
            Category::Shirt => "shirt",
            Category::Shorts => "shorts",
            Category::Skirt => "skirt",
            Category::SportsJacket => "sports-jacket",
            Category::Sweater => "sweater",
            Category::TShirt => "t-shirt",
            Category::Shoes => "shoes",
            Category::Accessories => "accessories",
            Category::Other => "other",
        }
    }

    pub fn from_slug(slug: &str) -> Self {
        match slug {
            "blazer" => Category::Blazer,
            "denim-jacket" => Category::DenimJacket,
            "dresses" => Category::Dresses,
            "hoodie" => Category::Hoodie,
            "jacket" => Category::Jacket,
            "jeans" => Category::Jeans,
            "long-pants" => Category::LongPants,
            "polo" => Category::Polo,
            "shirt" => Category::Shirt,
            "shorts" => Category::Shorts,
            "skirt" => Category::Skirt,
            "sports-jacket" => Category::SportsJacket,
            "sweater" => Category::Sweater,
            "t-shirt" => Category::TShirt,
            "shoes" => Category::Shoes,
            "accessories" => Category::Accessories,
            _ => Category::Other,
        }
    }
}

/// Gender detected from the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unisex,
    Kids,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unisex => "unisex",
            Gender::Kids => "kids",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "male" => Gender::Male,
            "female" => Gender::Female,
            "kids" => Gender::Kids,
            _ => Gender::Unisex,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Casual,
    Formal,
    Sport,
    Streetwear,
    Vintage,
    Minimalist,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Casual => "casual",
            Style::Formal => "formal",
            Style::Sport => "sport",
            Style::Streetwear => "streetwear",
            Style::Vintage => "vintage",
            Style::Minimalist => "minimalist",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "formal" => Style::Formal,
            "sport" => Style::Sport,
            "streetwear" => Style::Streetwear,
            "vintage" => Style::Vintage,
            "minimalist" => Style::Minimalist,
            _ => Style::Casual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Season {
    Summer,
    Winter,
    MidSeason,
    AllSeason,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Summer => "summer",
            Season::Winter => "winter",
            Season::MidSeason => "mid-season",
            Season::AllSeason => "all-season",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "summer" => Season::Summer,
            "winter" => Season::Winter,
            "mid-season" => Season::MidSeason,
            _ => Season::AllSeason,
        }
    }
}

/// Processing status of a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Low confidence, waiting on a human reviewer.
    Review,
}

impl ClassificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationStatus::Pending => "pending",
            ClassificationStatus::Processing => "processing",
            ClassificationStatus::Completed => "completed",
            ClassificationStatus::Failed => "failed",
            ClassificationStatus::Review => "review",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "processing" => ClassificationStatus::Processing,
            "completed" => ClassificationStatus::Completed,
            "failed" => ClassificationStatus::Failed,
            "review" => ClassificationStatus::Review,
            _ => ClassificationStatus::Pending,
        }
    }
}

/// A job in the classification queue. Serialized as JSON into Redis; the
/// serialized payload is the sorted-set member, so every field is part of the
/// job's identity except `attempts`, which recovery bumps before re-insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationJob {
    #[serde(default)]
    pub id: String,
    pub product_id: String,
    pub image_url: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: i32,
}

/// The persisted outcome of classifying one product image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub id: Uuid,
    pub product_id: Uuid,
    pub image_url: String,

    pub category: Category,
    pub category_score: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_category: String,
    pub sub_category_score: f64,

    pub gender: Gender,
    pub gender_score: f64,
    pub style: Style,
    pub style_score: f64,
    pub season: Season,
    pub season_score: f64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub primary_color: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secondary_color: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tertiary_color: String,

    pub status: ClassificationStatus,
    pub overall_score: f64,
    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Queue and processing statistics for `/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationStats {
    pub total_processed: i64,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub failed_jobs: i64,
    pub review_queue: i64,
    pub avg_confidence: f64,
    pub avg_processing_ms: f64,
}

/// Body of `POST /api/v1/classify`.
#[derive(Debug, Deserialize)]
pub struct SubmitClassificationRequest {
    pub product_id: String,
    pub image_url: String,
    #[serde(default)]
    pub priority: i32,
}

/// Body of `POST /api/v1/classify/batch`.
#[derive(Debug, Deserialize)]
pub struct BatchClassificationRequest {
    pub items: Vec<ClassificationItem>,
}

#[derive(Debug, Deserialize)]
pub struct ClassificationItem {
    pub product_id: String,
    pub image_url: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct BatchClassificationResponse {
    pub job_id: String,
    pub total_items: usize,
    pub status: String,
    pub message: String,
}

/// Partial field map accepted by `PUT /api/v1/results/:id`. Only the fields a
/// reviewer may correct; everything else is owned by the pipeline.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateClassificationRequest {
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub gender: Option<String>,
    pub style: Option<String>,
    pub season: Option<String>,
    pub primary_color: Option<String>,
}
