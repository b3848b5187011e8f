//! Physical-inspection item database operations
//!
//! Items are created by the intake path and updated by reconciliation.
//! Reconciliation identifies its target by the internal `id`, never by the
//! `(company_id, sku)` pair, so a second row matching the same pair is
//! never touched by a single delivery.

use mm_common::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// One inspection item row
#[derive(Debug, Clone, Serialize)]
pub struct ProductItem {
    pub id: i64,
    pub company_id: String,
    pub sku: String,
    pub item_code: String,
    pub image_urls: Option<String>,
    pub actual_measurements: Option<String>,
    pub condition: Option<String>,
    pub material: Option<String>,
    pub product_rank: Option<String>,
    pub inspection_notes: Option<String>,
    pub photographed_at: Option<String>,
    pub photographed_by: Option<String>,
    pub status: Option<String>,
    pub landmarks: Option<String>,
    pub reference_scale: Option<String>,
    pub annotated_image_url: Option<String>,
    pub mask_image_url: Option<String>,
    pub measured_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Fields accepted by the intake upsert
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub company_id: String,
    pub sku: String,
    pub item_code: String,
    pub image_urls: Option<String>,
    pub actual_measurements: Option<String>,
    pub condition: Option<String>,
    pub material: Option<String>,
    pub product_rank: Option<String>,
    pub inspection_notes: Option<String>,
    pub photographed_by: Option<String>,
    pub status: Option<String>,
}

/// Measurement columns applied by reconciliation
///
/// `None` fields leave the stored column untouched (COALESCE merge); this
/// is what makes repeated delivery of the same notification idempotent and
/// non-destructive.
#[derive(Debug, Clone, Default)]
pub struct MeasurementUpdate {
    pub actual_measurements: Option<String>,
    pub landmarks: Option<String>,
    pub reference_scale: Option<String>,
    pub annotated_image_url: Option<String>,
    pub mask_image_url: Option<String>,
}

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> ProductItem {
    ProductItem {
        id: row.get("id"),
        company_id: row.get("company_id"),
        sku: row.get("sku"),
        item_code: row.get("item_code"),
        image_urls: row.get("image_urls"),
        actual_measurements: row.get("actual_measurements"),
        condition: row.get("condition"),
        material: row.get("material"),
        product_rank: row.get("product_rank"),
        inspection_notes: row.get("inspection_notes"),
        photographed_at: row.get("photographed_at"),
        photographed_by: row.get("photographed_by"),
        status: row.get("status"),
        landmarks: row.get("landmarks"),
        reference_scale: row.get("reference_scale"),
        annotated_image_url: row.get("annotated_image_url"),
        mask_image_url: row.get("mask_image_url"),
        measured_at: row.get("measured_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Intake upsert keyed by item_code
pub async fn upsert_item(pool: &SqlitePool, item: &NewItem) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO product_items (
            company_id, sku, item_code, image_urls, actual_measurements,
            condition, material, product_rank, inspection_notes,
            photographed_by, status, photographed_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(item_code) DO UPDATE SET
            image_urls = excluded.image_urls,
            actual_measurements = excluded.actual_measurements,
            condition = excluded.condition,
            material = excluded.material,
            product_rank = excluded.product_rank,
            inspection_notes = excluded.inspection_notes,
            status = excluded.status,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&item.company_id)
    .bind(&item.sku)
    .bind(&item.item_code)
    .bind(&item.image_urls)
    .bind(&item.actual_measurements)
    .bind(&item.condition)
    .bind(&item.material)
    .bind(&item.product_rank)
    .bind(&item.inspection_notes)
    .bind(&item.photographed_by)
    .bind(item.status.as_deref().unwrap_or("Ready"))
    .execute(pool)
    .await?;

    Ok(())
}

/// Latest item for a (tenant, SKU); ties broken by highest id
pub async fn find_latest_item_id(
    pool: &SqlitePool,
    company_id: &str,
    sku: &str,
) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM product_items
        WHERE company_id = ? AND sku = ?
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(company_id)
    .bind(sku)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Latest item for a SKU ignoring tenant; returns (id, owning tenant)
///
/// Fallback lookup for identity-resolution drift; the caller logs the
/// tenant mismatch.
pub async fn find_latest_item_id_any_tenant(
    pool: &SqlitePool,
    sku: &str,
) -> Result<Option<(i64, String)>> {
    let row = sqlx::query(
        r#"
        SELECT id, company_id FROM product_items
        WHERE sku = ?
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(sku)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r.get("id"), r.get("company_id"))))
}

/// Apply measurement columns to one row identified by internal id
///
/// Absent fields bind NULL and COALESCE keeps the stored value, so a
/// partial result never wipes previously reconciled data.
pub async fn apply_measurements(
    pool: &SqlitePool,
    item_id: i64,
    update: &MeasurementUpdate,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE product_items SET
            actual_measurements = COALESCE(?, actual_measurements),
            landmarks = COALESCE(?, landmarks),
            reference_scale = COALESCE(?, reference_scale),
            annotated_image_url = COALESCE(?, annotated_image_url),
            mask_image_url = COALESCE(?, mask_image_url),
            measured_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&update.actual_measurements)
    .bind(&update.landmarks)
    .bind(&update.reference_scale)
    .bind(&update.annotated_image_url)
    .bind(&update.mask_image_url)
    .bind(item_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one item by internal id
pub async fn get_item(pool: &SqlitePool, item_id: i64) -> Result<Option<ProductItem>> {
    let row = sqlx::query("SELECT * FROM product_items WHERE id = ?")
        .bind(item_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(item_from_row))
}

/// All items for a (tenant, SKU), newest photographed first
pub async fn list_items_for_sku(
    pool: &SqlitePool,
    company_id: &str,
    sku: &str,
) -> Result<Vec<ProductItem>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM product_items
        WHERE company_id = ? AND sku = ?
        ORDER BY photographed_at DESC, id DESC
        "#,
    )
    .bind(company_id)
    .bind(sku)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(item_from_row).collect())
}
