//! Measurement-result reconciliation
//!
//! The inference provider's webhook payload is not contractually stable:
//! its shape varies by model version and it carries no guaranteed foreign
//! key. This module turns such a notification into a best-effort, idempotent
//! update of one inspection item:
//!
//! - [`parser`] normalizes the heterogeneous output payload into a sparse
//!   canonical result (pure, never fails).
//! - [`resolver`] determines which tenant/SKU the notification belongs to
//!   from a precedence chain of unreliable signals (pure).
//! - [`writer`] locates the target row (with a tenant-agnostic fallback)
//!   and applies the partial update, reporting a structured outcome.

pub mod parser;
pub mod resolver;
pub mod writer;

pub use parser::{parse_provider_output, MeasurementResult, ReferenceScale};
pub use resolver::{resolve_identity, IdentitySource, ResolvedIdentity, ResolverInput};
pub use writer::{reconcile, ReconcileOutcome, SkipReason};
