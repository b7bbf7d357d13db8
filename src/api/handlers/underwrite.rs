use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::api::auth::resolve_user;
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::model::assumptions::{Assumptions, RentScenario};
use crate::model::metrics::{GridRow, Metrics};
use crate::store;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderwriteRequest {
    pub listing_id: String,
    pub assumptions: Assumptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderwriteResponse {
    pub result_id: String,
    pub metrics: Metrics,
    pub from_cache: bool,
}

/// On-demand exact underwriting — a synchronous forward to the engine's
/// exact path. 404 when base inputs are missing, 400 on invalid assumptions.
pub async fn compute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UnderwriteRequest>,
) -> Result<Json<UnderwriteResponse>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;

    let outcome = state
        .underwriting
        .run_exact(&req.listing_id, &req.assumptions)
        .await?;

    Ok(Json(UnderwriteResponse {
        result_id: outcome.result_id,
        metrics: outcome.metrics,
        from_cache: outcome.from_cache,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridQuery {
    pub listing_id: String,
    pub listing_version: Option<i64>,
    pub rent_scenario: RentScenario,
    pub down_pct: f64,
    pub rate_bps: u32,
    pub amort_months: u32,
}

/// Single grid-cell lookup. Defaults to the listing's current version.
pub async fn grid_row(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GridQuery>,
) -> Result<Json<GridRow>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;

    let version = match query.listing_version {
        Some(v) => v,
        None => {
            store::listings::get(&state.db, &query.listing_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("listing {}", query.listing_id)))?
                .version
        }
    };

    let row = store::underwriting::get_grid_row(
        &state.db,
        &query.listing_id,
        version,
        query.rent_scenario,
        query.down_pct,
        query.rate_bps,
        query.amort_months,
    )
    .await?
    .ok_or_else(|| {
        ApiError::NotFound(format!(
            "no grid row for {} v{} {} down={} rate={} amort={}",
            query.listing_id,
            version,
            query.rent_scenario.as_str(),
            query.down_pct,
            query.rate_bps,
            query.amort_months
        ))
    })?;

    Ok(Json(row))
}
