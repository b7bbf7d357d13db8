pub mod auth;
pub mod cache;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod state;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use state::AppState;

pub fn router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/properties", get(handlers::properties::list))
        .route("/api/v1/properties/{id}", get(handlers::properties::detail))
        .route("/api/v1/underwrite", post(handlers::underwrite::compute))
        .route("/api/v1/underwrite/grid", get(handlers::underwrite::grid_row))
        .route(
            "/api/v1/searches",
            get(handlers::searches::list).post(handlers::searches::create),
        )
        .route(
            "/api/v1/searches/{id}",
            get(handlers::searches::get_one)
                .put(handlers::searches::update)
                .delete(handlers::searches::delete),
        )
        .route("/api/v1/alerts", get(handlers::alerts::list))
        .layer(cors)
        .with_state(app_state)
}

/// 200 when the store answers, 503 when it does not.
async fn health(State(app_state): State<AppState>) -> (StatusCode, &'static str) {
    let conn = app_state.db.lock().await;
    match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
        Ok(1) => (StatusCode::OK, "healthy"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    }
}

/// Bind and serve until the shutdown signal flips.
pub async fn serve(
    addr: &str,
    app_state: AppState,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let app = router(app_state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("running gateway")?;
    Ok(())
}
