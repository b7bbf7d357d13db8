use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::auth::resolve_user;
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::model::search::{NotifyConfig, SavedSearch, SearchFilter, SearchThresholds};
use crate::store;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    pub name: String,
    #[serde(default)]
    pub filter: SearchFilter,
    #[serde(default)]
    pub thresholds: SearchThresholds,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SearchBody>,
) -> Result<Json<SavedSearch>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;

    let search = SavedSearch {
        id: Uuid::new_v4(),
        user_id: user,
        name: body.name,
        filter: body.filter,
        thresholds: body.thresholds,
        notify: body.notify,
        is_active: body.is_active,
        created_at: Utc::now(),
    };
    store::searches::upsert(&state.db, &search).await?;
    Ok(Json(search))
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SavedSearch>>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;
    let searches = store::searches::list_for_user(&state.db, &user).await?;
    Ok(Json(searches))
}

pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<SavedSearch>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;
    let search = owned_search(&state, &id, &user).await?;
    Ok(Json(search))
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SavedSearch>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;

    let existing = owned_search(&state, &id, &user).await?;
    let updated = SavedSearch {
        id: existing.id,
        user_id: existing.user_id,
        name: body.name,
        filter: body.filter,
        thresholds: body.thresholds,
        notify: body.notify,
        is_active: body.is_active,
        created_at: existing.created_at,
    };
    store::searches::upsert(&state.db, &updated).await?;
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;

    owned_search(&state, &id, &user).await?;
    store::searches::delete(&state.db, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Fetch a search and hide other users' rows behind 404.
async fn owned_search(state: &AppState, id: &Uuid, user: &str) -> Result<SavedSearch, ApiError> {
    let search = store::searches::get(&state.db, id)
        .await?
        .filter(|s| s.user_id == user)
        .ok_or_else(|| ApiError::NotFound(format!("saved search {id}")))?;
    Ok(search)
}
