//! Declarative column synchronization
//!
//! Tables declare their expected shape in code; `SchemaSync` introspects the
//! live database via `PRAGMA table_info` and adds whatever columns are
//! missing with `ALTER TABLE ADD COLUMN`. Column additions are best-effort:
//! a "duplicate column" failure (concurrent initialization) is informational,
//! and any other per-column failure is collected into the [`SyncReport`]
//! rather than propagated, so a write that only needs a subset of the
//! columns can still proceed.
//!
//! What this cannot fix: type changes, constraint changes, column removal.
//! Those need a table rebuild (see [`crate::db::rebuild`]).

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Column declaration with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: &'static str,
    /// SQL type ("TEXT", "INTEGER", "REAL", ...)
    pub sql_type: &'static str,
    /// NOT NULL constraint (only honored on ADD COLUMN when a default exists)
    pub not_null: bool,
    /// DEFAULT value, rendered verbatim into the DDL
    pub default_value: Option<&'static str>,
}

impl ColumnDef {
    pub fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            not_null: false,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default(mut self, value: &'static str) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Expected shape of one database table
///
/// `create_sql` owns the full CREATE TABLE IF NOT EXISTS statement (table
/// constraints such as composite primary keys cannot be added by ALTER, so
/// they must be right for fresh deployments). `expected_columns` lists the
/// columns that may have been introduced after a deployment first created
/// the table; these are what `SchemaSync` adds to older databases.
pub trait TableSchema {
    /// Table name in the database
    fn table_name() -> &'static str;

    /// Full DDL for a fresh table, including table-level constraints
    fn create_sql() -> &'static str;

    /// Columns expected to exist, in declaration order
    fn expected_columns() -> Vec<ColumnDef>;
}

/// Outcome of one table synchronization pass
///
/// Per-column failures are diagnostics, not errors; callers that need a
/// specific column can check `failed` before depending on it.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Columns added this pass
    pub added: Vec<String>,
    /// Columns that raced a concurrent ADD COLUMN and lost (harmless)
    pub duplicates: Vec<String>,
    /// Columns that could not be added: (column, error detail)
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    /// True when every expected column is present after this pass
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Schema synchronization entry points
pub struct SchemaSync;

impl SchemaSync {
    /// Check if a table exists
    pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM sqlite_master
                WHERE type='table' AND name = ?
            )
            "#,
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    /// Read the column names of a table via PRAGMA table_info
    pub async fn column_names(pool: &SqlitePool, table_name: &str) -> Result<Vec<String>> {
        let query = format!("PRAGMA table_info({})", table_name);
        let rows = sqlx::query(&query).fetch_all(pool).await?;

        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    /// Create the table if it does not exist yet
    pub async fn ensure_table<T: TableSchema>(pool: &SqlitePool) -> Result<()> {
        sqlx::query(T::create_sql()).execute(pool).await?;
        Ok(())
    }

    /// Bring an existing table's column set up to date
    ///
    /// Only database connectivity failures propagate as errors; individual
    /// ADD COLUMN failures land in the report.
    pub async fn sync_columns<T: TableSchema>(pool: &SqlitePool) -> Result<SyncReport> {
        let table_name = T::table_name();
        let mut report = SyncReport::default();

        if !Self::table_exists(pool, table_name).await? {
            warn!(
                table = table_name,
                "Column sync skipped: table does not exist (ensure_table must run first)"
            );
            return Ok(report);
        }

        let actual = Self::column_names(pool, table_name).await?;

        for column in T::expected_columns() {
            if actual.iter().any(|name| name == column.name) {
                continue;
            }

            match Self::add_column(pool, table_name, &column).await {
                AddColumnOutcome::Added => report.added.push(column.name.to_string()),
                AddColumnOutcome::Duplicate => report.duplicates.push(column.name.to_string()),
                AddColumnOutcome::Failed(detail) => {
                    warn!(
                        table = table_name,
                        column = column.name,
                        error = %detail,
                        "Column add failed; dependent writes will degrade"
                    );
                    report.failed.push((column.name.to_string(), detail));
                }
            }
        }

        if report.added.is_empty() && report.failed.is_empty() {
            debug!(table = table_name, "Schema up to date");
        } else {
            info!(
                table = table_name,
                added = report.added.len(),
                failed = report.failed.len(),
                "Schema synchronized"
            );
        }

        Ok(report)
    }

    /// Add one missing column via ALTER TABLE ADD COLUMN
    async fn add_column(pool: &SqlitePool, table: &str, column: &ColumnDef) -> AddColumnOutcome {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, column.name, column.sql_type
        );

        // SQLite can only ADD a NOT NULL column when a DEFAULT is supplied
        if column.not_null {
            if let Some(default) = column.default_value {
                sql.push_str(&format!(" NOT NULL DEFAULT {}", default));
            } else {
                warn!(
                    table,
                    column = column.name,
                    "NOT NULL without DEFAULT cannot be added by ALTER; adding as nullable"
                );
            }
        } else if let Some(default) = column.default_value {
            sql.push_str(&format!(" DEFAULT {}", default));
        }

        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => {
                info!(table, column = column.name, sql_type = column.sql_type, "Added column");
                AddColumnOutcome::Added
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.message().contains("duplicate column") =>
            {
                info!(
                    table,
                    column = column.name,
                    "Column already added (concurrent initialization)"
                );
                AddColumnOutcome::Duplicate
            }
            Err(e) => AddColumnOutcome::Failed(e.to_string()),
        }
    }
}

enum AddColumnOutcome {
    Added,
    Duplicate,
    Failed(String),
}
