//! Catalog master database operations
//!
//! One `product_master` row per `(company_id, sku)`. Masters are created by
//! the intake paths (bulk import, or the stub auto-create when an item
//! arrives first); reconciliation never touches this table.

use mm_common::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Catalog master record
#[derive(Debug, Clone, Serialize)]
pub struct ProductMaster {
    pub company_id: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

fn master_from_row(row: &sqlx::sqlite::SqliteRow) -> ProductMaster {
    ProductMaster {
        company_id: row.get("company_id"),
        sku: row.get("sku"),
        barcode: row.get("barcode"),
        name: row.get("name"),
        brand: row.get("brand"),
        category: row.get("category"),
        size: row.get("size"),
        color: row.get("color"),
        price: row.get("price"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Upsert a master record; returns true when the row was newly inserted
pub async fn upsert_master(pool: &SqlitePool, master: &ProductMaster) -> Result<bool> {
    let existed = master_exists(pool, &master.company_id, &master.sku).await?;

    sqlx::query(
        r#"
        INSERT INTO product_master (
            company_id, sku, barcode, name, brand, category, size, color,
            price, description, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(company_id, sku) DO UPDATE SET
            barcode = excluded.barcode,
            name = excluded.name,
            brand = excluded.brand,
            category = excluded.category,
            size = excluded.size,
            color = excluded.color,
            price = excluded.price,
            description = excluded.description,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&master.company_id)
    .bind(&master.sku)
    .bind(&master.barcode)
    .bind(&master.name)
    .bind(&master.brand)
    .bind(&master.category)
    .bind(&master.size)
    .bind(&master.color)
    .bind(master.price)
    .bind(&master.description)
    .execute(pool)
    .await?;

    Ok(!existed)
}

/// Check whether a master exists under the tenant
pub async fn master_exists(pool: &SqlitePool, company_id: &str, sku: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM product_master WHERE company_id = ? AND sku = ?)",
    )
    .bind(company_id)
    .bind(sku)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Create a minimal stub master so an early-arriving item has a parent
///
/// Used by the item intake path only. The stub carries the SKU as its name
/// until a bulk import fills in the real catalog data.
pub async fn insert_stub_master(pool: &SqlitePool, company_id: &str, sku: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO product_master (company_id, sku, name)
        VALUES (?, ?, ?)
        ON CONFLICT(company_id, sku) DO NOTHING
        "#,
    )
    .bind(company_id)
    .bind(sku)
    .bind(sku)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one master by key
pub async fn find_master(
    pool: &SqlitePool,
    company_id: &str,
    sku: &str,
) -> Result<Option<ProductMaster>> {
    let row = sqlx::query("SELECT * FROM product_master WHERE company_id = ? AND sku = ?")
        .bind(company_id)
        .bind(sku)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(master_from_row))
}

/// Load one master by barcode within the tenant
pub async fn find_master_by_barcode(
    pool: &SqlitePool,
    company_id: &str,
    barcode: &str,
) -> Result<Option<ProductMaster>> {
    let row = sqlx::query("SELECT * FROM product_master WHERE company_id = ? AND barcode = ?")
        .bind(company_id)
        .bind(barcode)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(master_from_row))
}

/// Page through masters for a tenant, most recently updated first
pub async fn list_masters(
    pool: &SqlitePool,
    company_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProductMaster>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM product_master
        WHERE company_id = ?
        ORDER BY updated_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(company_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(master_from_row).collect())
}
