//! Measurement webhook handler
//!
//! POST /api/webhooks/measurement is the URL this service registers with
//! the inference provider when it triggers a measurement run. The trigger
//! collaborator appends `sku` and `company_id` query parameters at
//! registration time; that self-authored contract is what makes resolver
//! step 1 authoritative.
//!
//! The provider retries on non-2xx, so the handler acknowledges with
//! `{"success": true}` for every delivery it could process - including
//! ones with no target record - and reserves error statuses for genuine
//! internal faults.

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::recon::{self, ReconcileOutcome, ResolverInput, SkipReason};
use crate::{db, AppState};

/// Query parameters this service wrote into the callback URL
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub sku: Option<String>,
    pub company_id: Option<String>,
}

/// Provider prediction notification body
///
/// Only the fields this service reads; everything else is carried opaquely.
#[derive(Debug, Deserialize)]
pub struct PredictionWebhook {
    /// Provider-side prediction id
    pub id: Option<String>,
    /// "succeeded" | "failed" | in-progress markers
    pub status: Option<String>,
    /// Inference output; shape varies by model version
    #[serde(default)]
    pub output: Value,
    /// Present when status is "failed"
    #[serde(default)]
    pub error: Value,
    /// Provider's echo of the original request
    #[serde(default)]
    pub input: Value,
}

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    /// True when a stored item was updated
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl WebhookAck {
    fn applied(item_id: i64) -> Self {
        Self {
            success: true,
            applied: true,
            item_id: Some(item_id),
            reason: None,
        }
    }

    fn skipped(reason: &'static str) -> Self {
        Self {
            success: true,
            applied: false,
            item_id: None,
            reason: Some(reason),
        }
    }
}

/// POST /api/webhooks/measurement
pub async fn measurement_webhook(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    Json(webhook): Json<PredictionWebhook>,
) -> ApiResult<Json<WebhookAck>> {
    let delivery_id = Uuid::new_v4();
    let status = webhook.status.as_deref().unwrap_or("");

    tracing::info!(
        %delivery_id,
        prediction_id = webhook.id.as_deref().unwrap_or("-"),
        status,
        "Measurement webhook received"
    );

    // Defensive schema catch-up; a failure here is logged and the delivery
    // still gets its chance (the write may only need columns that exist)
    if let Err(e) = db::schema::ensure_schema(&state.db).await {
        tracing::warn!(%delivery_id, error = %e, "Schema ensure failed; continuing");
    }

    // Only a succeeded prediction carries a result worth reconciling
    match status {
        "succeeded" => {}
        "failed" => {
            tracing::warn!(
                %delivery_id,
                provider_error = %webhook.error,
                "Prediction failed; nothing to reconcile"
            );
            return Ok(Json(WebhookAck::skipped("prediction failed")));
        }
        other => {
            tracing::debug!(%delivery_id, status = other, "In-progress notification acknowledged");
            return Ok(Json(WebhookAck::skipped("not a completion")));
        }
    }

    let result = recon::parse_provider_output(&webhook.output);

    let input_image_url = webhook.input.get("image").and_then(Value::as_str);
    let identity = recon::resolve_identity(&ResolverInput {
        query_sku: params.sku.as_deref(),
        query_company_id: params.company_id.as_deref(),
        annotated_image_url: result.annotated_image_url.as_deref(),
        input_image_url,
    });

    let outcome = match recon::reconcile(&state.db, &identity, &result).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Store failure for this one delivery; the provider's own retry
            // policy on non-2xx is the recovery mechanism
            tracing::error!(%delivery_id, error = %e, "Reconciliation store failure");
            state.record_error(e.to_string()).await;
            return Err(e.into());
        }
    };

    let ack = match outcome {
        ReconcileOutcome::Applied { item_id, .. } => WebhookAck::applied(item_id),
        ReconcileOutcome::Skipped(SkipReason::EmptyResult) => WebhookAck::skipped("empty result"),
        ReconcileOutcome::Skipped(SkipReason::NoTargetRecord) => {
            WebhookAck::skipped("no target record")
        }
    };

    Ok(Json(ack))
}

/// Build webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/api/webhooks/measurement", post(measurement_webhook))
}
