//! Schema evolution for the Measure Master tables
//!
//! The provider's webhook can arrive before, during, or after a deploy, so
//! there is no migration window: [`ensure_schema`] is invoked defensively on
//! every delivery and must be a cheap no-op once the database is current.
//!
//! Three layers of evolution, oldest deployment first:
//! 1. `ensure_baseline` - both tables created with the composite tenant key
//!    already in place (fresh deployments).
//! 2. `ensure_tenant_column` - databases from the single-tenant era get the
//!    `company_id` column retrofitted via a table rebuild, backfilling
//!    historical rows with the default tenant.
//! 3. `ensure_measurement_columns` - newer measurement columns are added by
//!    declarative column sync; individual failures degrade, they do not
//!    block the write path.

use mm_common::db::{rebuild_table, ColumnDef, SchemaSync, TableRebuild, TableSchema};
use mm_common::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Catalog master table: one row per (tenant, SKU)
pub struct MasterTableSchema;

impl TableSchema for MasterTableSchema {
    fn table_name() -> &'static str {
        "product_master"
    }

    fn create_sql() -> &'static str {
        MASTER_CREATE_SQL
    }

    fn expected_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("company_id", "TEXT").not_null().default("'default'"),
            ColumnDef::new("sku", "TEXT").not_null(),
            ColumnDef::new("barcode", "TEXT"),
            ColumnDef::new("name", "TEXT").not_null(),
            ColumnDef::new("brand", "TEXT"),
            ColumnDef::new("category", "TEXT"),
            ColumnDef::new("size", "TEXT"),
            ColumnDef::new("color", "TEXT"),
            ColumnDef::new("price", "INTEGER"),
            ColumnDef::new("description", "TEXT"),
            ColumnDef::new("created_at", "TEXT"),
            ColumnDef::new("updated_at", "TEXT"),
        ]
    }
}

/// Physical-inspection item table: one row per scanned garment instance
///
/// `id` is the internal row identifier reconciliation updates by;
/// `item_code` is the externally visible unique code.
pub struct ItemsTableSchema;

impl TableSchema for ItemsTableSchema {
    fn table_name() -> &'static str {
        "product_items"
    }

    fn create_sql() -> &'static str {
        ITEMS_CREATE_SQL
    }

    fn expected_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", "INTEGER"),
            ColumnDef::new("company_id", "TEXT").not_null().default("'default'"),
            ColumnDef::new("sku", "TEXT").not_null(),
            ColumnDef::new("item_code", "TEXT").not_null(),
            ColumnDef::new("image_urls", "TEXT"),
            ColumnDef::new("actual_measurements", "TEXT"),
            ColumnDef::new("condition", "TEXT"),
            ColumnDef::new("material", "TEXT"),
            ColumnDef::new("product_rank", "TEXT"),
            ColumnDef::new("inspection_notes", "TEXT"),
            ColumnDef::new("photographed_at", "TEXT"),
            ColumnDef::new("photographed_by", "TEXT"),
            ColumnDef::new("status", "TEXT").default("'Ready'"),
            // Measurement reconciliation columns (added online to older DBs)
            ColumnDef::new("landmarks", "TEXT"),
            ColumnDef::new("reference_scale", "TEXT"),
            ColumnDef::new("annotated_image_url", "TEXT"),
            ColumnDef::new("mask_image_url", "TEXT"),
            ColumnDef::new("measured_at", "TEXT"),
            ColumnDef::new("created_at", "TEXT"),
            ColumnDef::new("updated_at", "TEXT"),
        ]
    }
}

/// Bring the whole schema up to date; safe to call on every request
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    ensure_baseline(pool).await?;
    ensure_tenant_column(pool).await?;
    ensure_measurement_columns(pool).await?;
    ensure_indexes(pool).await?;
    Ok(())
}

/// Create both base tables (with the composite tenant key) if absent
pub async fn ensure_baseline(pool: &SqlitePool) -> Result<()> {
    SchemaSync::ensure_table::<MasterTableSchema>(pool).await?;
    SchemaSync::ensure_table::<ItemsTableSchema>(pool).await?;
    Ok(())
}

/// Retrofit the tenant column onto single-tenant-era tables
///
/// Detects a table that predates `company_id` and rebuilds it with the
/// composite key, backfilling historical rows with the default tenant.
pub async fn ensure_tenant_column(pool: &SqlitePool) -> Result<()> {
    if table_lacks_tenant(pool, "product_master").await? {
        info!("product_master predates multi-tenancy; rebuilding with composite key");
        rebuild_table(pool, &MASTER_TENANT_REBUILD).await?;
    }

    if table_lacks_tenant(pool, "product_items").await? {
        info!("product_items predates multi-tenancy; rebuilding with tenant column");
        rebuild_table(pool, &ITEMS_TENANT_REBUILD).await?;
    }

    Ok(())
}

/// Add the measurement columns; per-column failures degrade, not abort
pub async fn ensure_measurement_columns(pool: &SqlitePool) -> Result<()> {
    let master = SchemaSync::sync_columns::<MasterTableSchema>(pool).await?;
    let items = SchemaSync::sync_columns::<ItemsTableSchema>(pool).await?;

    // A measurement write that only needs a subset of columns can still
    // proceed, so failures here are diagnostics only.
    if !master.is_clean() || !items.is_clean() {
        warn!(
            master_failed = master.failed.len(),
            items_failed = items.failed.len(),
            "Some columns could not be added; writes will degrade around them"
        );
    }

    Ok(())
}

async fn ensure_indexes(pool: &SqlitePool) -> Result<()> {
    for sql in [
        "CREATE INDEX IF NOT EXISTS idx_master_barcode ON product_master(barcode)",
        "CREATE INDEX IF NOT EXISTS idx_items_sku ON product_items(sku)",
        "CREATE INDEX IF NOT EXISTS idx_items_code ON product_items(item_code)",
    ] {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}

async fn table_lacks_tenant(pool: &SqlitePool, table: &str) -> Result<bool> {
    if !SchemaSync::table_exists(pool, table).await? {
        return Ok(false);
    }
    let columns = SchemaSync::column_names(pool, table).await?;
    Ok(!columns.iter().any(|name| name == "company_id"))
}

const MASTER_TENANT_REBUILD: TableRebuild = TableRebuild {
    table: "product_master",
    create_sql: MASTER_CREATE_SQL,
    copy_sql: r#"
        INSERT INTO product_master (
            company_id, sku, barcode, name, brand, category, size, color,
            price, description, created_at, updated_at
        )
        SELECT 'default', sku, barcode, name, brand, category, size, color,
               price, description, created_at, updated_at
        FROM product_master_old
    "#,
};

const ITEMS_TENANT_REBUILD: TableRebuild = TableRebuild {
    table: "product_items",
    create_sql: ITEMS_CREATE_SQL,
    copy_sql: r#"
        INSERT INTO product_items (
            id, company_id, sku, item_code, image_urls, actual_measurements,
            condition, material, product_rank, inspection_notes,
            photographed_at, photographed_by, status, created_at, updated_at
        )
        SELECT id, 'default', sku, item_code, image_urls, actual_measurements,
               condition, material, product_rank, inspection_notes,
               photographed_at, photographed_by, status, created_at, updated_at
        FROM product_items_old
    "#,
};

// Shared between TableSchema::create_sql and the tenant rebuilds
const MASTER_CREATE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS product_master (
        company_id TEXT NOT NULL DEFAULT 'default',
        sku TEXT NOT NULL,
        barcode TEXT,
        name TEXT NOT NULL,
        brand TEXT,
        category TEXT,
        size TEXT,
        color TEXT,
        price INTEGER,
        description TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (company_id, sku)
    )
"#;

const ITEMS_CREATE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS product_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id TEXT NOT NULL DEFAULT 'default',
        sku TEXT NOT NULL,
        item_code TEXT UNIQUE NOT NULL,
        image_urls TEXT,
        actual_measurements TEXT,
        condition TEXT,
        material TEXT,
        product_rank TEXT,
        inspection_notes TEXT,
        photographed_at TEXT DEFAULT CURRENT_TIMESTAMP,
        photographed_by TEXT,
        status TEXT DEFAULT 'Ready',
        landmarks TEXT,
        reference_scale TEXT,
        annotated_image_url TEXT,
        mask_image_url TEXT,
        measured_at TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP
    )
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_table_declares_measurement_columns() {
        let columns = ItemsTableSchema::expected_columns();
        for name in [
            "landmarks",
            "reference_scale",
            "annotated_image_url",
            "mask_image_url",
            "measured_at",
        ] {
            assert!(
                columns.iter().any(|c| c.name == name),
                "items column '{}' should be declared",
                name
            );
        }
    }

    #[test]
    fn both_tables_declare_tenant_column() {
        assert!(MasterTableSchema::expected_columns()
            .iter()
            .any(|c| c.name == "company_id"));
        assert!(ItemsTableSchema::expected_columns()
            .iter()
            .any(|c| c.name == "company_id"));
    }

    #[test]
    fn table_names() {
        assert_eq!(MasterTableSchema::table_name(), "product_master");
        assert_eq!(ItemsTableSchema::table_name(), "product_items");
    }
}
