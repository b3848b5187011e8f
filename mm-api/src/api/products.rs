//! Product catalog endpoints
//!
//! The intake/CRUD surface of the original Measure Master API. These are
//! collaborators of the reconciliation core: intake creates the item rows
//! that reconciliation later updates. Record creation lives here only -
//! including the tolerant auto-create of a stub master when an item arrives
//! before its catalog data.
//!
//! Tenancy is carried by a `company_id` query parameter (or body field),
//! defaulting to the shared default tenant.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::items::{self, NewItem, ProductItem};
use crate::db::masters::{self, ProductMaster};
use crate::error::{ApiError, ApiResult};
use crate::recon::resolver::DEFAULT_TENANT;
use crate::AppState;

fn tenant_or_default(company_id: Option<&str>) -> String {
    company_id
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TENANT)
        .to_string()
}

// ----------------------------------------------------------------------------
// GET /api/products
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub company_id: Option<String>,
}

/// Master joined with its captured item data
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    #[serde(flatten)]
    pub master: ProductMaster,
    pub has_captured_data: bool,
    pub captured_items: Vec<ProductItem>,
    pub latest_item: Option<ProductItem>,
    pub captured_count: usize,
}

async fn product_view(state: &AppState, master: ProductMaster) -> ApiResult<ProductView> {
    let items = items::list_items_for_sku(&state.db, &master.company_id, &master.sku).await?;
    Ok(ProductView {
        has_captured_data: !items.is_empty(),
        latest_item: items.first().cloned(),
        captured_count: items.len(),
        captured_items: items,
        master,
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub products: Vec<ProductView>,
    pub total: usize,
}

/// GET /api/products - paged master list with item aggregation
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListResponse>> {
    let company_id = tenant_or_default(params.company_id.as_deref());
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let offset = params.offset.unwrap_or(0).max(0);

    let masters = masters::list_masters(&state.db, &company_id, limit, offset).await?;

    let mut products = Vec::with_capacity(masters.len());
    for master in masters {
        products.push(product_view(&state, master).await?);
    }

    Ok(Json(ListResponse {
        success: true,
        total: products.len(),
        products,
    }))
}

// ----------------------------------------------------------------------------
// GET /api/products/search
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub company_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub product: ProductView,
}

/// GET /api/products/search - lookup by SKU or barcode within the tenant
pub async fn search_products(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let company_id = tenant_or_default(params.company_id.as_deref());

    let master = if let Some(sku) = params.sku.as_deref().filter(|s| !s.is_empty()) {
        masters::find_master(&state.db, &company_id, sku).await?
    } else if let Some(barcode) = params.barcode.as_deref().filter(|b| !b.is_empty()) {
        masters::find_master_by_barcode(&state.db, &company_id, barcode).await?
    } else {
        return Err(ApiError::BadRequest(
            "sku or barcode query parameter required".to_string(),
        ));
    };

    let master = master.ok_or_else(|| ApiError::NotFound("product master not found".to_string()))?;
    let product = product_view(&state, master).await?;

    Ok(Json(SearchResponse {
        success: true,
        product,
    }))
}

// ----------------------------------------------------------------------------
// GET /api/products/search-barcode
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BarcodeParams {
    pub barcode: Option<String>,
    pub company_id: Option<String>,
}

/// GET /api/products/search-barcode - barcode-only lookup
///
/// Kept as its own route for scanner clients; same response shape as
/// `search`.
pub async fn search_by_barcode(
    State(state): State<AppState>,
    Query(params): Query<BarcodeParams>,
) -> ApiResult<Json<SearchResponse>> {
    let company_id = tenant_or_default(params.company_id.as_deref());

    let barcode = params
        .barcode
        .as_deref()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("barcode query parameter required".to_string()))?;

    let master = masters::find_master_by_barcode(&state.db, &company_id, barcode)
        .await?
        .ok_or_else(|| ApiError::NotFound("product master not found".to_string()))?;
    let product = product_view(&state, master).await?;

    Ok(Json(SearchResponse {
        success: true,
        product,
    }))
}

// ----------------------------------------------------------------------------
// POST /api/products/bulk-import
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    pub company_id: Option<String>,
    #[serde(default)]
    pub products: Vec<ImportProduct>,
}

#[derive(Debug, Deserialize)]
pub struct ImportProduct {
    pub sku: String,
    pub name: String,
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkImportResponse {
    pub success: bool,
    pub inserted: usize,
    pub updated: usize,
    pub total: usize,
}

/// POST /api/products/bulk-import - CSV-sourced master upsert loop
pub async fn bulk_import(
    State(state): State<AppState>,
    Json(request): Json<BulkImportRequest>,
) -> ApiResult<Json<BulkImportResponse>> {
    let company_id = tenant_or_default(request.company_id.as_deref());
    let total = request.products.len();

    let mut inserted = 0;
    let mut updated = 0;

    for product in request.products {
        if product.sku.trim().is_empty() {
            return Err(ApiError::BadRequest("product sku must not be empty".to_string()));
        }

        let master = ProductMaster {
            company_id: company_id.clone(),
            sku: product.sku,
            barcode: product.barcode,
            name: product.name,
            brand: product.brand,
            category: product.category,
            size: product.size,
            color: product.color,
            price: product.price,
            description: product.description,
            created_at: None,
            updated_at: None,
        };

        if masters::upsert_master(&state.db, &master).await? {
            inserted += 1;
        } else {
            updated += 1;
        }
    }

    tracing::info!(company_id = %company_id, inserted, updated, "Bulk import complete");

    Ok(Json(BulkImportResponse {
        success: true,
        inserted,
        updated,
        total,
    }))
}

// ----------------------------------------------------------------------------
// POST /api/products/items
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub sku: String,
    // Tenant field arrives as company_id from API clients; camelCase is
    // accepted too for consistency with the rest of this payload
    #[serde(alias = "company_id")]
    pub company_id: Option<String>,
    pub item_code: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub actual_measurements: Option<Map<String, Value>>,
    pub condition: Option<String>,
    pub material: Option<String>,
    pub product_rank: Option<String>,
    pub inspection_notes: Option<String>,
    pub photographed_by: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemResponse {
    pub success: bool,
    pub sku: String,
    pub item_code: String,
}

/// POST /api/products/items - save one scanned item
///
/// If the catalog master is missing under the tenant, a stub master is
/// auto-created so early scans are never rejected; the bulk import fills
/// in real catalog data later.
pub async fn create_item(
    State(state): State<AppState>,
    Json(request): Json<CreateItemRequest>,
) -> ApiResult<Json<CreateItemResponse>> {
    let sku = request.sku.trim().to_string();
    if sku.is_empty() {
        return Err(ApiError::BadRequest("sku must not be empty".to_string()));
    }
    let company_id = tenant_or_default(request.company_id.as_deref());

    if !masters::master_exists(&state.db, &company_id, &sku).await? {
        tracing::info!(company_id = %company_id, sku = %sku, "Auto-creating stub master for item");
        masters::insert_stub_master(&state.db, &company_id, &sku).await?;
    }

    let item_code = request
        .item_code
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| format!("{}_{}", sku, chrono::Utc::now().timestamp_millis()));

    let item = NewItem {
        company_id,
        sku: sku.clone(),
        item_code: item_code.clone(),
        image_urls: serde_json::to_string(&request.image_urls).ok(),
        actual_measurements: request
            .actual_measurements
            .as_ref()
            .and_then(|m| serde_json::to_string(m).ok()),
        condition: request.condition,
        material: request.material,
        product_rank: request.product_rank,
        inspection_notes: request.inspection_notes,
        photographed_by: request.photographed_by,
        status: request.status,
    };

    items::upsert_item(&state.db, &item).await?;

    Ok(Json(CreateItemResponse {
        success: true,
        sku,
        item_code,
    }))
}

/// Build product routes
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/search", get(search_products))
        .route("/api/products/search-barcode", get(search_by_barcode))
        .route("/api/products/bulk-import", post(bulk_import))
        .route("/api/products/items", post(create_item))
}
