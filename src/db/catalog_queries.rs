use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::product::{StorefrontProduct, SyncOutcome, Vendor};

/// All vendors the scheduler should sync, ordered by name.
pub async fn active_vendors(pool: &PgPool) -> Result<Vec<Vendor>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, slug, domain, is_active, last_synced_at, created_at, updated_at
        FROM vendors
        WHERE is_active = TRUE
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Vendor {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                domain: row.try_get("domain")?,
                is_active: row.try_get("is_active")?,
                last_synced_at: row.try_get("last_synced_at")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

/// Insert or update a product from the catalog wire format, replacing its
/// variants and images wholesale inside one transaction. Returns the row id
/// and whether the row was freshly created (`xmax = 0` distinguishes an
/// insert from a conflict-update).
pub async fn upsert_product(
    pool: &PgPool,
    vendor_id: Uuid,
    product: &StorefrontProduct,
) -> Result<(Uuid, bool), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let (price_min, price_max) = product.price_range();
    let compare_at_price = product.compare_at_price();
    let is_available = product.is_available();
    let tags = product.tags.to_vec();

    let row = sqlx::query(
        r#"
        INSERT INTO products (vendor_id, external_id, title, slug, description, product_type,
                              vendor, tags, price_min, price_max, compare_at_price,
                              is_available, published_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::float8, $10::float8, $11::float8, $12, $13, NOW())
        ON CONFLICT (vendor_id, external_id) DO UPDATE SET
            title = EXCLUDED.title,
            slug = EXCLUDED.slug,
            description = EXCLUDED.description,
            product_type = EXCLUDED.product_type,
            vendor = EXCLUDED.vendor,
            tags = EXCLUDED.tags,
            price_min = EXCLUDED.price_min,
            price_max = EXCLUDED.price_max,
            compare_at_price = EXCLUDED.compare_at_price,
            is_available = EXCLUDED.is_available,
            published_at = EXCLUDED.published_at,
            updated_at = NOW()
        RETURNING id, (xmax = 0) AS created
        "#,
    )
    .bind(vendor_id)
    .bind(product.id)
    .bind(&product.title)
    .bind(&product.handle)
    .bind(&product.body_html)
    .bind(&product.product_type)
    .bind(&product.vendor)
    .bind(&tags)
    .bind(price_min)
    .bind(price_max)
    .bind(compare_at_price)
    .bind(is_available)
    .bind(product.published_at)
    .fetch_one(&mut *tx)
    .await?;

    let product_id: Uuid = row.try_get("id")?;
    let created: bool = row.try_get("created")?;

    // Replace dependent rows; a partial variant set must never survive.
    sqlx::query("DELETE FROM product_variants WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM product_images WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

    for variant in &product.variants {
        sqlx::query(
            r#"
            INSERT INTO product_variants (product_id, external_id, title, sku, price,
                                          compare_at_price, inventory_quantity,
                                          option1, option2, option3, is_available)
            VALUES ($1, $2, $3, $4, $5::float8, $6::float8, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product_id)
        .bind(variant.id)
        .bind(&variant.title)
        .bind(&variant.sku)
        .bind(variant.price_value())
        .bind(variant.compare_at_price_value())
        .bind(variant.inventory_quantity)
        .bind(&variant.option1)
        .bind(&variant.option2)
        .bind(&variant.option3)
        .bind(variant.available)
        .execute(&mut *tx)
        .await?;
    }

    for image in &product.images {
        sqlx::query(
            r#"
            INSERT INTO product_images (product_id, external_id, src, alt_text, width, height, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product_id)
        .bind(image.id)
        .bind(&image.src)
        .bind(&image.alt)
        .bind(image.width)
        .bind(image.height)
        .bind(image.position)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((product_id, created))
}

pub async fn touch_vendor_last_synced(pool: &PgPool, vendor_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE vendors SET last_synced_at = NOW(), updated_at = NOW() WHERE id = $1")
        .bind(vendor_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Open a sync-log row in `running` state; one per vendor per sync attempt.
pub async fn create_sync_log(pool: &PgPool, vendor_id: Uuid) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query("INSERT INTO sync_logs (vendor_id, status) VALUES ($1, 'running') RETURNING id")
        .bind(vendor_id)
        .fetch_one(pool)
        .await?;
    row.try_get("id")
}

/// Finalize a sync-log row with the counts and terminal status.
pub async fn finish_sync_log(
    pool: &PgPool,
    log_id: Uuid,
    outcome: &SyncOutcome,
) -> Result<(), sqlx::Error> {
    let status = if outcome.error.is_some() { "failed" } else { "completed" };

    sqlx::query(
        r#"
        UPDATE sync_logs
        SET status = $1, products_found = $2, products_created = $3, products_updated = $4,
            error_message = $5, completed_at = NOW()
        WHERE id = $6
        "#,
    )
    .bind(status)
    .bind(outcome.products_found)
    .bind(outcome.products_created)
    .bind(outcome.products_updated)
    .bind(&outcome.error)
    .bind(log_id)
    .execute(pool)
    .await?;

    Ok(())
}
