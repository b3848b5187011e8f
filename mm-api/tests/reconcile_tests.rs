//! Reconciliation writer integration tests
//!
//! Exercise the lookup/fallback/update sequence against a real (in-memory)
//! SQLite database.

use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use mm_api::db::items::{self, NewItem};
use mm_api::db::masters;
use mm_api::db::schema;
use mm_api::recon::parser::{MeasurementResult, ReferenceScale};
use mm_api::recon::resolver::{IdentitySource, ResolvedIdentity, UNRESOLVED_SKU};
use mm_api::recon::writer::{reconcile, ReconcileOutcome, SkipReason};

async fn test_pool() -> SqlitePool {
    // Single connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    schema::ensure_schema(&pool).await.expect("schema");
    pool
}

async fn seed_item(pool: &SqlitePool, company_id: &str, sku: &str, item_code: &str) -> i64 {
    masters::insert_stub_master(pool, company_id, sku).await.unwrap();
    items::upsert_item(
        pool,
        &NewItem {
            company_id: company_id.to_string(),
            sku: sku.to_string(),
            item_code: item_code.to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    items::find_latest_item_id(pool, company_id, sku)
        .await
        .unwrap()
        .expect("seeded item")
}

fn identity(company_id: &str, sku: &str) -> ResolvedIdentity {
    ResolvedIdentity {
        sku: sku.to_string(),
        company_id: company_id.to_string(),
        source: IdentitySource::CallbackQuery,
    }
}

fn sample_result() -> MeasurementResult {
    MeasurementResult {
        measurements: json!({ "shoulder_width": 42.0, "body_length": 68.5 })
            .as_object()
            .cloned(),
        landmarks: json!({ "1": { "x": 10.0, "y": 20.0 } }).as_object().cloned(),
        reference_scale: Some(ReferenceScale::pixel_per_unit(15.18, "9")),
        annotated_image_url: Some("https://cdn.example.com/a.png".to_string()),
        mask_image_url: None,
    }
}

#[tokio::test]
async fn applies_to_matching_row() {
    let pool = test_pool().await;
    let item_id = seed_item(&pool, "acme", "SKU1", "SKU1_1").await;

    let outcome = reconcile(&pool, &identity("acme", "SKU1"), &sample_result())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            item_id,
            fallback_match: false
        }
    );

    let item = items::get_item(&pool, item_id).await.unwrap().unwrap();
    assert!(item.actual_measurements.unwrap().contains("shoulder_width"));
    assert!(item.landmarks.unwrap().contains("\"x\""));
    assert!(item.reference_scale.unwrap().contains("pixelPerUnit"));
    assert_eq!(item.annotated_image_url.as_deref(), Some("https://cdn.example.com/a.png"));
    assert!(item.mask_image_url.is_none());
    assert!(item.measured_at.is_some());
}

#[tokio::test]
async fn reapplying_same_result_is_idempotent() {
    let pool = test_pool().await;
    let item_id = seed_item(&pool, "acme", "SKU1", "SKU1_1").await;
    let result = sample_result();

    reconcile(&pool, &identity("acme", "SKU1"), &result).await.unwrap();
    let first = items::get_item(&pool, item_id).await.unwrap().unwrap();

    reconcile(&pool, &identity("acme", "SKU1"), &result).await.unwrap();
    let second = items::get_item(&pool, item_id).await.unwrap().unwrap();

    assert_eq!(first.actual_measurements, second.actual_measurements);
    assert_eq!(first.landmarks, second.landmarks);
    assert_eq!(first.reference_scale, second.reference_scale);
    assert_eq!(first.annotated_image_url, second.annotated_image_url);
    assert_eq!(first.mask_image_url, second.mask_image_url);
}

#[tokio::test]
async fn empty_result_never_writes() {
    let pool = test_pool().await;
    let item_id = seed_item(&pool, "acme", "SKU1", "SKU1_1").await;

    let outcome = reconcile(&pool, &identity("acme", "SKU1"), &MeasurementResult::default())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Skipped(SkipReason::EmptyResult));

    let item = items::get_item(&pool, item_id).await.unwrap().unwrap();
    assert!(item.actual_measurements.is_none());
    assert!(item.measured_at.is_none());
}

#[tokio::test]
async fn sku_only_fallback_matches_across_tenants() {
    let pool = test_pool().await;
    let item_id = seed_item(&pool, "acme", "SKU1", "SKU1_1").await;

    // Resolver drifted to the wrong tenant; fallback still finds the row
    let outcome = reconcile(&pool, &identity("other-tenant", "SKU1"), &sample_result())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            item_id,
            fallback_match: true
        }
    );
}

#[tokio::test]
async fn no_matching_row_is_a_skip_not_an_error() {
    let pool = test_pool().await;
    seed_item(&pool, "acme", "SKU1", "SKU1_1").await;

    let outcome = reconcile(&pool, &identity("acme", "MISSING"), &sample_result())
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Skipped(SkipReason::NoTargetRecord));
}

#[tokio::test]
async fn sentinel_sku_is_never_used_as_a_key() {
    let pool = test_pool().await;
    // A record whose SKU happens to equal the sentinel must not be matched
    let item_id = seed_item(&pool, "acme", UNRESOLVED_SKU, "UNKNOWN_1").await;

    let unresolved = ResolvedIdentity {
        sku: UNRESOLVED_SKU.to_string(),
        company_id: "acme".to_string(),
        source: IdentitySource::Unresolved,
    };

    let outcome = reconcile(&pool, &unresolved, &sample_result()).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Skipped(SkipReason::NoTargetRecord));

    let item = items::get_item(&pool, item_id).await.unwrap().unwrap();
    assert!(item.actual_measurements.is_none());
}

#[tokio::test]
async fn latest_row_wins_when_pair_matches_twice() {
    let pool = test_pool().await;
    let older = seed_item(&pool, "acme", "SKU1", "SKU1_1").await;
    let newer = seed_item(&pool, "acme", "SKU1", "SKU1_2").await;
    assert!(newer > older);

    let outcome = reconcile(&pool, &identity("acme", "SKU1"), &sample_result())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            item_id: newer,
            fallback_match: false
        }
    );

    let untouched = items::get_item(&pool, older).await.unwrap().unwrap();
    assert!(untouched.actual_measurements.is_none());
}

#[tokio::test]
async fn partial_result_leaves_other_columns_alone() {
    let pool = test_pool().await;
    let item_id = seed_item(&pool, "acme", "SKU1", "SKU1_1").await;

    // First delivery carries everything
    reconcile(&pool, &identity("acme", "SKU1"), &sample_result()).await.unwrap();

    // Second delivery carries only landmarks
    let partial = MeasurementResult {
        landmarks: json!({ "2": { "x": 1.0, "y": 2.0 } }).as_object().cloned(),
        ..Default::default()
    };
    reconcile(&pool, &identity("acme", "SKU1"), &partial).await.unwrap();

    let item = items::get_item(&pool, item_id).await.unwrap().unwrap();
    // Landmarks replaced, measurements and images untouched
    assert!(item.landmarks.unwrap().contains("\"2\""));
    assert!(item.actual_measurements.unwrap().contains("shoulder_width"));
    assert_eq!(item.annotated_image_url.as_deref(), Some("https://cdn.example.com/a.png"));
}
