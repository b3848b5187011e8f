//! Shared SQLite schema maintenance machinery
//!
//! Structural changes are expressed as declarative, idempotent steps that
//! the services apply defensively before writes that depend on them. There
//! is no separate migration deployment: a service catches its own schema up
//! on every opportunity, and repeated application is a cheap no-op.

pub mod rebuild;
pub mod schema_sync;

pub use rebuild::{rebuild_table, TableRebuild};
pub use schema_sync::{ColumnDef, SchemaSync, SyncReport, TableSchema};
