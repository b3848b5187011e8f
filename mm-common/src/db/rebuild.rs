//! Table rebuild for structural changes ALTER cannot express
//!
//! SQLite cannot widen a primary key or add table-level constraints in
//! place, so changes like retrofitting a composite key follow the
//! rename-recreate-backfill-drop sequence. From the caller's perspective
//! the rebuild is atomic: any failure mid-sequence rolls the rename back so
//! a table stays reachable under the logical name whenever possible. Only
//! the final drop of the renamed copy is allowed to fail quietly; that
//! leaves a stray `<table>_old` behind, which is reported but never
//! retried.

use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

/// One rename-recreate-backfill-drop rebuild
///
/// `copy_sql` must read from `<table>_old` (see [`TableRebuild::old_name`])
/// and insert into the freshly created table, supplying values for any
/// columns the old shape lacked.
#[derive(Debug)]
pub struct TableRebuild {
    /// Logical table name
    pub table: &'static str,
    /// DDL creating the new shape under the logical name
    pub create_sql: &'static str,
    /// Backfill statement: INSERT INTO <table> SELECT ... FROM <table>_old
    pub copy_sql: &'static str,
}

impl TableRebuild {
    /// Name the old shape is parked under during the rebuild
    pub fn old_name(&self) -> String {
        format!("{}_old", self.table)
    }
}

/// Execute a table rebuild
///
/// Sequence: rename old → create new → copy rows → drop old. A failure in
/// create or copy restores the original table before returning the error.
pub async fn rebuild_table(pool: &SqlitePool, rebuild: &TableRebuild) -> Result<()> {
    let table = rebuild.table;
    let old = rebuild.old_name();

    info!(table, "Rebuilding table (rename-recreate-backfill-drop)");

    sqlx::query(&format!("ALTER TABLE {} RENAME TO {}", table, old))
        .execute(pool)
        .await?;

    if let Err(e) = sqlx::query(rebuild.create_sql).execute(pool).await {
        restore_renamed(pool, table, &old).await;
        return Err(Error::Schema(format!(
            "Rebuild of {} failed at create: {}",
            table, e
        )));
    }

    if let Err(e) = sqlx::query(rebuild.copy_sql).execute(pool).await {
        // Remove the half-built table, then put the original back
        if let Err(drop_err) = sqlx::query(&format!("DROP TABLE {}", table)).execute(pool).await {
            error!(table, error = %drop_err, "Could not remove half-built table during rollback");
        }
        restore_renamed(pool, table, &old).await;
        return Err(Error::Schema(format!(
            "Rebuild of {} failed at backfill: {}",
            table, e
        )));
    }

    // Drop of the parked copy is best-effort; the new table is already live
    if let Err(e) = sqlx::query(&format!("DROP TABLE {}", old)).execute(pool).await {
        warn!(table, old = %old, error = %e, "Old table copy not dropped; leaving it in place");
    }

    info!(table, "Table rebuild complete");
    Ok(())
}

/// Roll the rename back so the logical name stays reachable
async fn restore_renamed(pool: &SqlitePool, table: &str, old: &str) {
    if let Err(e) = sqlx::query(&format!("ALTER TABLE {} RENAME TO {}", old, table))
        .execute(pool)
        .await
    {
        error!(
            table,
            old,
            error = %e,
            "Rollback rename failed; table is reachable only under the parked name"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;

    async fn setup_test_db() -> SqlitePool {
        // Single connection so every query sees the same in-memory database
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn setup_legacy_table(pool: &SqlitePool) {
        sqlx::query(
            r#"
            CREATE TABLE records (
                sku TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO records (sku, name) VALUES ('A1', 'first'), ('B2', 'second')")
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rebuild_backfills_all_rows() {
        let pool = setup_test_db().await;
        setup_legacy_table(&pool).await;

        let rebuild = TableRebuild {
            table: "records",
            create_sql: r#"
                CREATE TABLE records (
                    tenant TEXT NOT NULL DEFAULT 'default',
                    sku TEXT NOT NULL,
                    name TEXT NOT NULL,
                    PRIMARY KEY (tenant, sku)
                )
            "#,
            copy_sql: "INSERT INTO records (tenant, sku, name) SELECT 'default', sku, name FROM records_old",
        };

        rebuild_table(&pool, &rebuild).await.unwrap();

        let rows = sqlx::query("SELECT tenant, sku, name FROM records ORDER BY sku")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String, _>("tenant"), "default");
        assert_eq!(rows[0].get::<String, _>("sku"), "A1");
        assert_eq!(rows[1].get::<String, _>("sku"), "B2");

        // Parked copy was dropped
        let old_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='records_old')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(!old_exists);
    }

    #[tokio::test]
    async fn failed_backfill_restores_original_table() {
        let pool = setup_test_db().await;
        setup_legacy_table(&pool).await;

        let rebuild = TableRebuild {
            table: "records",
            create_sql: r#"
                CREATE TABLE records (
                    tenant TEXT NOT NULL,
                    sku TEXT NOT NULL,
                    name TEXT NOT NULL,
                    PRIMARY KEY (tenant, sku)
                )
            "#,
            // References a column the old table does not have
            copy_sql: "INSERT INTO records (tenant, sku, name) SELECT tenant, sku, name FROM records_old",
        };

        let err = rebuild_table(&pool, &rebuild).await.unwrap_err();
        assert!(matches!(err, Error::Schema(_)));

        // Original rows are back under the logical name
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let columns = crate::db::SchemaSync::column_names(&pool, "records").await.unwrap();
        assert!(!columns.contains(&"tenant".to_string()));
    }
}
