use chrono::Utc;
use uuid::Uuid;

use crate::models::classification::{
    ClassificationResult, ClassificationStatus, Gender, Season, Style,
};
use crate::services::decision;
use crate::services::vision::{
    VisionClient, VisionError, CATEGORY_LABELS, COLOR_LABELS, GENDER_LABELS, SEASON_LABELS,
    STYLE_LABELS,
};

/// Combines the zero-shot vision model with the title lexicon to produce one
/// confidence-scored result per image.
pub struct HybridClassifier {
    vision: VisionClient,
    secondary_labels: bool,
}

impl HybridClassifier {
    pub fn new(vision: VisionClient, secondary_labels: bool) -> Self {
        Self {
            vision,
            secondary_labels,
        }
    }

    pub async fn health_check(&self) -> Result<(), VisionError> {
        self.vision.health_check().await
    }

    /// Vision-only classification of an image.
    pub async fn classify(&self, image_url: &str) -> Result<ClassificationResult, VisionError> {
        let predictions = self.vision.classify_labels(image_url, CATEGORY_LABELS).await?;
        let (category, category_score) = decision::map_vision_label(&predictions);

        let now = Utc::now();
        let mut result = ClassificationResult {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            image_url: image_url.to_string(),
            category,
            category_score,
            sub_category: String::new(),
            sub_category_score: category_score,
            gender: Gender::Unisex,
            gender_score: 0.0,
            style: Style::Casual,
            style_score: 0.0,
            season: Season::AllSeason,
            season_score: 0.0,
            primary_color: String::new(),
            secondary_color: String::new(),
            tertiary_color: String::new(),
            status: ClassificationStatus::Processing,
            overall_score: 0.0,
            needs_review: false,
            reviewed_at: None,
            reviewed_by: None,
            processed_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        if self.secondary_labels {
            self.classify_secondary(image_url, &mut result).await;
        }

        result.overall_score = (result.category_score
            + result.sub_category_score
            + result.gender_score
            + result.style_score)
            / 4.0;

        Ok(result)
    }

    /// Hybrid classification: vision first, then the title lexicon gets the
    /// final word on the category.
    pub async fn classify_with_title(
        &self,
        image_url: &str,
        title: &str,
    ) -> Result<ClassificationResult, VisionError> {
        let mut result = self.classify(image_url).await?;

        let decided = decision::decide_category(result.category, title);
        if decided != result.category {
            tracing::info!(
                title,
                vision_category = result.category.as_slug(),
                vision_score = result.category_score,
                final_category = decided.as_slug(),
                "category overridden by title analysis"
            );
            result.category = decided;
        }

        Ok(result)
    }

    /// Secondary attribute passes. Each one is best-effort; a failed call
    /// leaves the default in place rather than failing the job.
    async fn classify_secondary(&self, image_url: &str, result: &mut ClassificationResult) {
        match self.vision.classify_labels(image_url, GENDER_LABELS).await {
            Ok(preds) => {
                (result.gender, result.gender_score) = decision::map_gender(&preds);
            }
            Err(e) => tracing::warn!(error = %e, "gender classification failed"),
        }

        match self.vision.classify_labels(image_url, STYLE_LABELS).await {
            Ok(preds) => {
                (result.style, result.style_score) = decision::map_style(&preds);
            }
            Err(e) => tracing::warn!(error = %e, "style classification failed"),
        }

        match self.vision.classify_labels(image_url, SEASON_LABELS).await {
            Ok(preds) => {
                (result.season, result.season_score) = decision::map_season(&preds);
            }
            Err(e) => tracing::warn!(error = %e, "season classification failed"),
        }

        match self.vision.classify_labels(image_url, COLOR_LABELS).await {
            Ok(preds) => {
                (result.primary_color, result.secondary_color, result.tertiary_color) =
                    decision::map_colors(&preds);
            }
            Err(e) => tracing::warn!(error = %e, "color detection failed"),
        }
    }
}
