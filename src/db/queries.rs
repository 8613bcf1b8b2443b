use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::classification::{
    Category, ClassificationResult, ClassificationStatus, Gender, Season, Style,
    UpdateClassificationRequest,
};
use crate::models::product::ProductSummary;

// Score columns are DECIMAL(5,4); cast to float8 on the way out so rows decode
// straight into f64.
const RESULT_COLUMNS: &str = "id, product_id, image_url, \
     category, category_score::float8 AS category_score, \
     sub_category, sub_category_score::float8 AS sub_category_score, \
     gender, gender_score::float8 AS gender_score, \
     style, style_score::float8 AS style_score, \
     season, season_score::float8 AS season_score, \
     primary_color, secondary_color, tertiary_color, \
     status, overall_score::float8 AS overall_score, needs_review, \
     reviewed_at, reviewed_by, processed_at, created_at, updated_at";

fn result_from_row(row: &PgRow) -> Result<ClassificationResult, sqlx::Error> {
    let category: String = row.try_get("category")?;
    let gender: Option<String> = row.try_get("gender")?;
    let style: Option<String> = row.try_get("style")?;
    let season: Option<String> = row.try_get("season")?;
    let status: Option<String> = row.try_get("status")?;

    Ok(ClassificationResult {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        image_url: row.try_get("image_url")?,
        category: Category::from_slug(&category),
        category_score: row.try_get::<Option<f64>, _>("category_score")?.unwrap_or(0.0),
        sub_category: row.try_get::<Option<String>, _>("sub_category")?.unwrap_or_default(),
        sub_category_score: row
            .try_get::<Option<f64>, _>("sub_category_score")?
            .unwrap_or(0.0),
        gender: Gender::from_str_or_default(gender.as_deref().unwrap_or_default()),
        gender_score: row.try_get::<Option<f64>, _>("gender_score")?.unwrap_or(0.0),
        style: Style::from_str_or_default(style.as_deref().unwrap_or_default()),
        style_score: row.try_get::<Option<f64>, _>("style_score")?.unwrap_or(0.0),
        season: Season::from_str_or_default(season.as_deref().unwrap_or_default()),
        season_score: row.try_get::<Option<f64>, _>("season_score")?.unwrap_or(0.0),
        primary_color: row.try_get::<Option<String>, _>("primary_color")?.unwrap_or_default(),
        secondary_color: row
            .try_get::<Option<String>, _>("secondary_color")?
            .unwrap_or_default(),
        tertiary_color: row
            .try_get::<Option<String>, _>("tertiary_color")?
            .unwrap_or_default(),
        status: ClassificationStatus::from_str_or_default(status.as_deref().unwrap_or_default()),
        overall_score: row.try_get::<Option<f64>, _>("overall_score")?.unwrap_or(0.0),
        needs_review: row.try_get::<Option<bool>, _>("needs_review")?.unwrap_or(false),
        reviewed_at: row.try_get("reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        processed_at: row.try_get("processed_at")?,
        created_at: row
            .try_get::<Option<DateTime<Utc>>, _>("created_at")?
            .unwrap_or_else(Utc::now),
        updated_at: row
            .try_get::<Option<DateTime<Utc>>, _>("updated_at")?
            .unwrap_or_else(Utc::now),
    })
}

/// Insert or replace the classification for a product. Keyed by the
/// `product_id` unique constraint, so re-classification overwrites in place.
pub async fn save_classification(
    pool: &PgPool,
    result: &ClassificationResult,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO product_classifications (
            id, product_id, image_url,
            category, category_score, sub_category, sub_category_score,
            gender, gender_score, style, style_score, season, season_score,
            primary_color, secondary_color, tertiary_color,
            status, overall_score, needs_review, processed_at, created_at, updated_at
        ) VALUES (
            $1, $2, $3, $4, $5::float8, $6, $7::float8, $8, $9::float8, $10, $11::float8,
            $12, $13::float8, $14, $15, $16, $17, $18::float8, $19, $20, $21, $22
        )
        ON CONFLICT (product_id) DO UPDATE SET
            image_url = EXCLUDED.image_url,
            category = EXCLUDED.category,
            category_score = EXCLUDED.category_score,
            sub_category = EXCLUDED.sub_category,
            sub_category_score = EXCLUDED.sub_category_score,
            gender = EXCLUDED.gender,
            gender_score = EXCLUDED.gender_score,
            style = EXCLUDED.style,
            style_score = EXCLUDED.style_score,
            season = EXCLUDED.season,
            season_score = EXCLUDED.season_score,
            primary_color = EXCLUDED.primary_color,
            secondary_color = EXCLUDED.secondary_color,
            tertiary_color = EXCLUDED.tertiary_color,
            status = EXCLUDED.status,
            overall_score = EXCLUDED.overall_score,
            needs_review = EXCLUDED.needs_review,
            processed_at = EXCLUDED.processed_at,
            updated_at = NOW()
        "#,
    )
    .bind(result.id)
    .bind(result.product_id)
    .bind(&result.image_url)
    .bind(result.category.as_slug())
    .bind(result.category_score)
    .bind(&result.sub_category)
    .bind(result.sub_category_score)
    .bind(result.gender.as_str())
    .bind(result.gender_score)
    .bind(result.style.as_str())
    .bind(result.style_score)
    .bind(result.season.as_str())
    .bind(result.season_score)
    .bind(&result.primary_color)
    .bind(&result.secondary_color)
    .bind(&result.tertiary_color)
    .bind(result.status.as_str())
    .bind(result.overall_score)
    .bind(result.needs_review)
    .bind(result.processed_at)
    .bind(result.created_at)
    .bind(result.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Project the decided category onto the product row's `product_type`.
pub async fn update_product_type(
    pool: &PgPool,
    product_id: Uuid,
    product_type: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE products SET product_type = $1, updated_at = NOW() WHERE id = $2")
        .bind(product_type)
        .bind(product_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn get_classification(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<ClassificationResult>, sqlx::Error> {
    let sql = format!("SELECT {RESULT_COLUMNS} FROM product_classifications WHERE id = $1");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(result_from_row).transpose()
}

pub async fn get_classification_by_product(
    pool: &PgPool,
    product_id: Uuid,
) -> Result<Option<ClassificationResult>, sqlx::Error> {
    let sql = format!("SELECT {RESULT_COLUMNS} FROM product_classifications WHERE product_id = $1");
    let row = sqlx::query(&sql).bind(product_id).fetch_optional(pool).await?;
    row.as_ref().map(result_from_row).transpose()
}

/// Paginated listing, optionally filtered by status. Returns the page and the
/// total count for the filter.
pub async fn list_classifications(
    pool: &PgPool,
    limit: i64,
    offset: i64,
    status: Option<&str>,
) -> Result<(Vec<ClassificationResult>, i64), sqlx::Error> {
    let (total, rows) = match status {
        Some(status) => {
            let total: i64 =
                sqlx::query("SELECT COUNT(*) FROM product_classifications WHERE status = $1")
                    .bind(status)
                    .fetch_one(pool)
                    .await?
                    .try_get(0)?;
            let sql = format!(
                "SELECT {RESULT_COLUMNS} FROM product_classifications \
                 WHERE status = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
            );
            let rows = sqlx::query(&sql)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?;
            (total, rows)
        }
        None => {
            let total: i64 = sqlx::query("SELECT COUNT(*) FROM product_classifications")
                .fetch_one(pool)
                .await?
                .try_get(0)?;
            let sql = format!(
                "SELECT {RESULT_COLUMNS} FROM product_classifications \
                 ORDER BY created_at DESC LIMIT $1 OFFSET $2"
            );
            let rows = sqlx::query(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?;
            (total, rows)
        }
    };

    let results = rows
        .iter()
        .map(result_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((results, total))
}

pub async fn get_review_queue(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ClassificationResult>, i64), sqlx::Error> {
    list_classifications(pool, limit, offset, Some(ClassificationStatus::Review.as_str())).await
}

/// Mark a reviewed classification as approved. Returns the number of rows
/// touched so callers can 404 on an unknown id.
pub async fn approve_classification(
    pool: &PgPool,
    id: Uuid,
    reviewer_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE product_classifications SET
            status = 'completed',
            needs_review = FALSE,
            reviewed_at = NOW(),
            reviewed_by = $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(reviewer_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Apply a reviewer's partial correction. Only the allowlisted columns can be
/// touched; the SET clause is assembled from that fixed list, never from
/// request keys.
pub async fn update_classification(
    pool: &PgPool,
    id: Uuid,
    updates: &UpdateClassificationRequest,
) -> Result<u64, sqlx::Error> {
    let fields: [(&str, Option<&str>); 6] = [
        ("category", updates.category.as_deref()),
        ("sub_category", updates.sub_category.as_deref()),
        ("gender", updates.gender.as_deref()),
        ("style", updates.style.as_deref()),
        ("season", updates.season.as_deref()),
        ("primary_color", updates.primary_color.as_deref()),
    ];

    let mut sets = Vec::new();
    let mut values = Vec::new();
    for (column, value) in fields {
        if let Some(value) = value {
            values.push(value);
            sets.push(format!("{column} = ${}", values.len()));
        }
    }

    if sets.is_empty() {
        return Ok(0);
    }
    sets.push("updated_at = NOW()".to_string());

    let sql = format!(
        "UPDATE product_classifications SET {} WHERE id = ${}",
        sets.join(", "),
        values.len() + 1
    );

    let mut query = sqlx::query(&sql);
    for value in values {
        query = query.bind(value);
    }
    let result = query.bind(id).execute(pool).await?;

    Ok(result.rows_affected())
}

/// Products that have no classification row yet, with their first image.
/// Imageless products are skipped; there is nothing to classify.
pub async fn products_without_classification(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<ProductSummary>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.title,
            COALESCE(
                (SELECT src FROM product_images WHERE product_id = p.id ORDER BY position LIMIT 1),
                ''
            ) AS image_url
        FROM products p
        LEFT JOIN product_classifications pc ON p.id = pc.product_id
        WHERE pc.id IS NULL
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut products = Vec::with_capacity(rows.len());
    for row in rows {
        let summary = ProductSummary {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            image_url: row.try_get("image_url")?,
        };
        if !summary.image_url.is_empty() {
            products.push(summary);
        }
    }

    Ok(products)
}

/// Title and first image for a single product. Used by the worker to feed the
/// hybrid classifier; best-effort at the call site.
pub async fn get_product_summary(
    pool: &PgPool,
    product_id: Uuid,
) -> Result<Option<ProductSummary>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT p.id, p.title,
            COALESCE(
                (SELECT src FROM product_images WHERE product_id = p.id ORDER BY position LIMIT 1),
                ''
            ) AS image_url
        FROM products p
        WHERE p.id = $1
        "#,
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(ProductSummary {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            image_url: row.try_get("image_url")?,
        })
    })
    .transpose()
}

/// Store-side averages for `/stats`: mean confidence over all results and
/// mean wall-clock from row creation to processing.
pub async fn stats_averages(pool: &PgPool) -> Result<(f64, f64), sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(AVG(overall_score), 0)::float8 AS avg_confidence,
            COALESCE(
                AVG(EXTRACT(EPOCH FROM (processed_at - created_at)) * 1000.0)
                    FILTER (WHERE processed_at IS NOT NULL),
                0
            )::float8 AS avg_processing_ms
        FROM product_classifications
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok((row.try_get("avg_confidence")?, row.try_get("avg_processing_ms")?))
}
