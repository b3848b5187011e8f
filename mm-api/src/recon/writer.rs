//! Reconciliation writer
//!
//! Applies a canonical result to at most one item row. Outcomes are
//! structured values rather than log side effects so callers and tests can
//! assert on them; a missing target is a normal steady-state outcome
//! (premature or duplicate notifications, records deleted after inference
//! was requested), never an error.

use mm_common::Result;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::items::{self, MeasurementUpdate};
use crate::recon::parser::MeasurementResult;
use crate::recon::resolver::ResolvedIdentity;

/// Why no write was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Canonical result had neither measurements nor landmarks
    EmptyResult,
    /// No item row matched, even via the SKU-only fallback
    NoTargetRecord,
}

/// Outcome of one reconciliation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        /// Internal row id the update was applied to
        item_id: i64,
        /// True when the row was found by the tenant-agnostic fallback
        fallback_match: bool,
    },
    Skipped(SkipReason),
}

impl ReconcileOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. })
    }
}

/// Reconcile a canonical result against the store
///
/// Lookup order: `(company_id, sku)` scoped, then SKU-only fallback (a
/// deliberate tolerance for identity-resolution drift), latest row winning
/// in both. The update targets the row by internal id and replaces only the
/// measurement columns that are present in the result, so repeated delivery
/// of the same notification is idempotent.
pub async fn reconcile(
    pool: &SqlitePool,
    identity: &ResolvedIdentity,
    result: &MeasurementResult,
) -> Result<ReconcileOutcome> {
    if result.is_empty() {
        debug!("Reconciliation skipped: empty result");
        return Ok(ReconcileOutcome::Skipped(SkipReason::EmptyResult));
    }

    // A sentinel SKU is "unresolved", not a key to look up
    if !identity.is_resolved() {
        info!(
            company_id = %identity.company_id,
            "Reconciliation skipped: identity unresolved"
        );
        return Ok(ReconcileOutcome::Skipped(SkipReason::NoTargetRecord));
    }

    let (item_id, fallback_match) =
        match items::find_latest_item_id(pool, &identity.company_id, &identity.sku).await? {
            Some(id) => (id, false),
            None => match items::find_latest_item_id_any_tenant(pool, &identity.sku).await? {
                Some((id, row_tenant)) => {
                    // Tolerated cross-tenant match; flagged for audit
                    warn!(
                        sku = %identity.sku,
                        resolved_tenant = %identity.company_id,
                        matched_tenant = %row_tenant,
                        item_id = id,
                        "Item matched via tenant-agnostic fallback"
                    );
                    (id, true)
                }
                None => {
                    info!(
                        sku = %identity.sku,
                        company_id = %identity.company_id,
                        "No target record for measurement result"
                    );
                    return Ok(ReconcileOutcome::Skipped(SkipReason::NoTargetRecord));
                }
            },
        };

    let update = build_update(result);
    items::apply_measurements(pool, item_id, &update).await?;

    info!(
        item_id,
        sku = %identity.sku,
        source = ?identity.source,
        fallback_match,
        "Measurement result applied"
    );

    Ok(ReconcileOutcome::Applied {
        item_id,
        fallback_match,
    })
}

/// Serialize present canonical fields into JSON-text column values
fn build_update(result: &MeasurementResult) -> MeasurementUpdate {
    MeasurementUpdate {
        actual_measurements: result
            .measurements
            .as_ref()
            .and_then(|m| serde_json::to_string(m).ok()),
        landmarks: result
            .landmarks
            .as_ref()
            .and_then(|l| serde_json::to_string(l).ok()),
        reference_scale: result
            .reference_scale
            .as_ref()
            .and_then(|s| serde_json::to_string(s).ok()),
        annotated_image_url: result.annotated_image_url.clone(),
        mask_image_url: result.mask_image_url.clone(),
    }
}
