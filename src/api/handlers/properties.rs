use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::api::auth::resolve_user;
use crate::api::cache::fingerprint;
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::model::alert::Alert;
use crate::model::enrichment::Enrichment;
use crate::model::metrics::{ExactResult, GridRow};
use crate::model::rent::RentEstimate;
use crate::store::{self, listings::ListingQuery, listings::StoredListing};

const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 25;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertiesQuery {
    pub city: Option<String>,
    pub province: Option<String>,
    pub property_type: Option<String>,
    pub min_beds: Option<u32>,
    pub max_beds: Option<u32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PropertiesResponse {
    pub listings: Vec<StoredListing>,
    pub total: u64,
    pub offset: u32,
    pub limit: u32,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PropertiesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let cache_key = fingerprint(
        "/api/v1/properties",
        &[
            ("city".into(), query.city.clone().unwrap_or_default()),
            ("province".into(), query.province.clone().unwrap_or_default()),
            ("propertyType".into(), query.property_type.clone().unwrap_or_default()),
            ("minBeds".into(), fmt_opt(query.min_beds)),
            ("maxBeds".into(), fmt_opt(query.max_beds)),
            ("minPrice".into(), fmt_opt(query.min_price)),
            ("maxPrice".into(), fmt_opt(query.max_price)),
            ("status".into(), query.status.clone().unwrap_or_default()),
            ("limit".into(), limit.to_string()),
            ("offset".into(), offset.to_string()),
        ],
    );
    if state.cfg.enable_cache {
        if let Some(hit) = state.cache.get(&cache_key).await {
            return Ok(Json(hit));
        }
    }

    let (listings, total) = store::listings::search(
        &state.db,
        &ListingQuery {
            city: query.city,
            province: query.province,
            property_type: query.property_type,
            min_beds: query.min_beds,
            max_beds: query.max_beds,
            min_price: query.min_price,
            max_price: query.max_price,
            status: query.status,
            limit,
            offset,
        },
    )
    .await?;

    let response = serde_json::to_value(PropertiesResponse {
        listings,
        total,
        offset,
        limit,
    })
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    if state.cfg.enable_cache {
        state.cache.put(cache_key, response.clone()).await;
    }
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderwritingSummary {
    /// Strongest grid row per rent scenario for the current version.
    pub grid_best: Vec<GridRow>,
    pub exact: Vec<ExactResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDetail {
    #[serde(flatten)]
    pub listing: StoredListing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent_estimate: Option<RentEstimate>,
    pub underwriting: UnderwritingSummary,
    pub alerts: Vec<Alert>,
}

pub async fn detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<PropertyDetail>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;

    let stored = store::listings::get(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("listing {id}")))?;

    let enrichment = store::enrichments::get(&state.db, &id).await?;
    let rent_estimate = store::rents::get(&state.db, &id).await?;
    let grid_best =
        store::underwriting::grid_best_rows(&state.db, &id, stored.version).await?;
    let exact = store::underwriting::list_exact_for_listing(&state.db, &id).await?;

    // Only the caller's alerts for this listing.
    let alerts = store::alerts::list_for_listing(&state.db, &id, 20)
        .await?
        .into_iter()
        .filter(|a| a.user_id == user)
        .collect();

    Ok(Json(PropertyDetail {
        listing: stored,
        enrichment,
        rent_estimate,
        underwriting: UnderwritingSummary { grid_best, exact },
        alerts,
    }))
}

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
