//! Notification identity resolution
//!
//! The provider's webhook carries no guaranteed foreign key, so the target
//! tenant/SKU is inferred from an ordered chain of signals, most
//! trustworthy first:
//!
//! 1. Query parameters on the callback URL. This service wrote that URL
//!    when it registered the webhook, so these are authoritative.
//! 2. A SKU embedded in the annotated-image filename, using the
//!    `{sku}_{timestamp}_{suffix}.{ext}` convention.
//! 3. Path segments of the original *input* image URL.
//! 4. Sentinel defaults.
//!
//! Steps 2 and 3 infer identity from data the provider merely echoes back
//! and may reformat or omit; each is attempted only while the SKU remains
//! unresolved. Which step won is retained for observability.

use serde::Serialize;
use tracing::debug;

/// Sentinel SKU: callers must treat this as "unresolved", not a valid key
pub const UNRESOLVED_SKU: &str = "UNKNOWN";

/// Sentinel tenant used when no signal yields one
pub const DEFAULT_TENANT: &str = "default";

/// Path segment that marks the shared upload bucket of the default tenant
const DEFAULT_TENANT_PATH_SENTINEL: &str = "uploads";

/// Which resolution step produced the SKU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdentitySource {
    /// Step 1: self-authored callback query parameters
    CallbackQuery,
    /// Step 2: filename of the annotated output image
    AnnotatedFilename,
    /// Step 3: path segments of the original input image URL
    InputImagePath,
    /// No signal yielded a SKU; sentinels retained
    Unresolved,
}

impl IdentitySource {
    /// True only for the self-authored, fully trustworthy signal
    pub fn is_explicit(&self) -> bool {
        matches!(self, IdentitySource::CallbackQuery)
    }
}

/// Best-guess identity of the record a notification belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub sku: String,
    pub company_id: String,
    pub source: IdentitySource,
}

impl ResolvedIdentity {
    /// False when the SKU is still the sentinel
    pub fn is_resolved(&self) -> bool {
        self.sku != UNRESOLVED_SKU
    }
}

/// Signals available to the resolver, all optional
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverInput<'a> {
    /// `sku` query parameter of the callback URL
    pub query_sku: Option<&'a str>,
    /// `company_id` query parameter of the callback URL
    pub query_company_id: Option<&'a str>,
    /// Annotated-image reference already extracted by the parser
    pub annotated_image_url: Option<&'a str>,
    /// Original input image URL echoed back in the provider's `input`
    pub input_image_url: Option<&'a str>,
}

/// Resolve the target identity for a notification
pub fn resolve_identity(input: &ResolverInput) -> ResolvedIdentity {
    // Tenant from the callback query applies regardless of where the SKU
    // comes from; it is self-authored.
    let query_tenant = non_empty(input.query_company_id);

    // Step 1: callback query parameters
    if let Some(sku) = non_empty(input.query_sku) {
        return ResolvedIdentity {
            sku: sku.to_string(),
            company_id: query_tenant.unwrap_or(DEFAULT_TENANT).to_string(),
            source: IdentitySource::CallbackQuery,
        };
    }

    // Step 2: annotated-image filename convention
    if let Some(sku) = input.annotated_image_url.and_then(sku_from_filename) {
        debug!(sku = %sku, "SKU recovered from annotated-image filename");
        return ResolvedIdentity {
            sku,
            company_id: query_tenant.unwrap_or(DEFAULT_TENANT).to_string(),
            source: IdentitySource::AnnotatedFilename,
        };
    }

    // Step 3: input image path heuristic
    if let Some((path_tenant, sku)) = input.input_image_url.and_then(identity_from_input_path) {
        debug!(sku = %sku, tenant = %path_tenant, "Identity inferred from input image path");
        return ResolvedIdentity {
            sku,
            company_id: query_tenant.map(str::to_string).unwrap_or(path_tenant),
            source: IdentitySource::InputImagePath,
        };
    }

    // Step 4: sentinels
    ResolvedIdentity {
        sku: UNRESOLVED_SKU.to_string(),
        company_id: query_tenant.unwrap_or(DEFAULT_TENANT).to_string(),
        source: IdentitySource::Unresolved,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Extract the SKU from a `{sku}_{timestamp}_{suffix}.{ext}` filename
///
/// SKUs may themselves contain underscores, so the numeric timestamp
/// segment (second from last) anchors the split.
fn sku_from_filename(url: &str) -> Option<String> {
    let filename = url
        .split(['?', '#'])
        .next()?
        .rsplit('/')
        .next()?;

    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
    let segments: Vec<&str> = stem.split('_').collect();
    if segments.len() < 3 {
        return None;
    }

    let timestamp = segments[segments.len() - 2];
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let sku = segments[..segments.len() - 2].join("_");
    (!sku.is_empty()).then_some(sku)
}

/// Extract (tenant, sku) from the input image URL's path
///
/// Layout is `/{tenant}/{sku}/...` for tenant buckets, or
/// `/uploads/{sku}/...` for the shared default-tenant bucket. The trailing
/// filename segment is ignored.
fn identity_from_input_path(url: &str) -> Option<(String, String)> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = without_scheme.split_once('/').map(|(_, p)| p)?;
    let path = path.split(['?', '#']).next()?;

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Drop the filename segment
    if segments.last().is_some_and(|s| s.contains('.')) {
        segments.pop();
    }

    if let Some(pos) = segments.iter().position(|s| *s == DEFAULT_TENANT_PATH_SENTINEL) {
        let sku = segments.get(pos + 1)?;
        return Some((DEFAULT_TENANT.to_string(), sku.to_string()));
    }

    if segments.len() >= 2 {
        return Some((segments[0].to_string(), segments[1].to_string()));
    }

    None
}
