use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A storefront we ingest from. Created administratively; the scheduler only
/// ever bumps `last_synced_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The `tags` field on the catalog wire format is a comma-joined string on
/// some storefronts and a list of strings on others. Accept both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagField {
    Joined(String),
    List(Vec<String>),
}

impl Default for TagField {
    fn default() -> Self {
        TagField::List(Vec::new())
    }
}

impl TagField {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            TagField::Joined(s) => {
                if s.is_empty() {
                    Vec::new()
                } else {
                    s.split(", ").map(str::to_string).collect()
                }
            }
            TagField::List(v) => v.clone(),
        }
    }
}

/// One product as returned by `GET https://{domain}/products.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontProduct {
    pub id: i64,
    pub title: String,
    pub handle: String,
    #[serde(default)]
    pub body_html: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub tags: TagField,
    #[serde(default)]
    pub variants: Vec<StorefrontVariant>,
    #[serde(default)]
    pub images: Vec<StorefrontImage>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontVariant {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sku: Option<String>,
    /// Prices come over the wire as decimal strings.
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub compare_at_price: Option<String>,
    #[serde(default)]
    pub inventory_quantity: i32,
    #[serde(default)]
    pub option1: Option<String>,
    #[serde(default)]
    pub option2: Option<String>,
    #[serde(default)]
    pub option3: Option<String>,
    #[serde(default)]
    pub available: bool,
}

impl StorefrontVariant {
    pub fn price_value(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn compare_at_price_value(&self) -> Option<f64> {
        self.compare_at_price
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontImage {
    pub id: i64,
    pub src: String,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub position: i32,
}

/// One page of the paged catalog endpoint.
#[derive(Debug, Deserialize)]
pub struct CatalogPage {
    pub products: Vec<StorefrontProduct>,
}

impl StorefrontProduct {
    /// Min/max price over all variants. Zero for a variantless product.
    pub fn price_range(&self) -> (f64, f64) {
        let mut min = 0.0;
        let mut max = 0.0;
        for (i, v) in self.variants.iter().enumerate() {
            let price = v.price_value();
            if i == 0 || price < min {
                min = price;
            }
            if i == 0 || price > max {
                max = price;
            }
        }
        (min, max)
    }

    /// Highest compare-at price across variants, if any variant carries one.
    pub fn compare_at_price(&self) -> Option<f64> {
        self.variants
            .iter()
            .filter_map(StorefrontVariant::compare_at_price_value)
            .fold(None, |acc, cap| match acc {
                Some(prev) if prev >= cap => Some(prev),
                _ => Some(cap),
            })
    }

    /// A product is available if any of its variants is.
    pub fn is_available(&self) -> bool {
        self.variants.iter().any(|v| v.available)
    }
}

/// Per-vendor outcome of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub products_found: i32,
    pub products_created: i32,
    pub products_updated: i32,
    pub error: Option<String>,
}

/// Minimal product projection the classifier side needs.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub title: String,
    pub image_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(price: &str, available: bool) -> StorefrontVariant {
        StorefrontVariant {
            id: 1,
            title: String::new(),
            sku: None,
            price: price.to_string(),
            compare_at_price: None,
            inventory_quantity: 0,
            option1: None,
            option2: None,
            option3: None,
            available,
        }
    }

    #[test]
    fn tags_accept_joined_string() {
        let tags: TagField = serde_json::from_str(r#""streetwear, new, ss25""#).unwrap();
        assert_eq!(tags.to_vec(), vec!["streetwear", "new", "ss25"]);
    }

    #[test]
    fn tags_accept_list() {
        let tags: TagField = serde_json::from_str(r#"["streetwear", "new"]"#).unwrap();
        assert_eq!(tags.to_vec(), vec!["streetwear", "new"]);
    }

    #[test]
    fn empty_tags_string_yields_no_tags() {
        let tags: TagField = serde_json::from_str(r#""""#).unwrap();
        assert!(tags.to_vec().is_empty());
    }

    #[test]
    fn price_range_spans_variants() {
        let product = StorefrontProduct {
            id: 1,
            title: "Tee".into(),
            handle: "tee".into(),
            body_html: String::new(),
            vendor: String::new(),
            product_type: String::new(),
            tags: TagField::default(),
            variants: vec![variant("49.90", false), variant("39.90", true), variant("59.00", false)],
            images: vec![],
            published_at: None,
        };
        let (min, max) = product.price_range();
        assert_eq!(min, 39.90);
        assert_eq!(max, 59.00);
        assert!(product.is_available());
    }

    #[test]
    fn availability_is_false_when_no_variant_available() {
        let product = StorefrontProduct {
            id: 1,
            title: "Tee".into(),
            handle: "tee".into(),
            body_html: String::new(),
            vendor: String::new(),
            product_type: String::new(),
            tags: TagField::default(),
            variants: vec![variant("10.00", false), variant("12.00", false)],
            images: vec![],
            published_at: None,
        };
        assert!(!product.is_available());
    }
}
