use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

use crate::api::auth::resolve_user;
use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::model::alert::Alert;
use crate::store;

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let user = resolve_user(&state, &headers)?;
    state.check_rate_limit(&user).await?;
    let alerts = store::alerts::list_for_user(&state.db, &user).await?;
    Ok(Json(alerts))
}
