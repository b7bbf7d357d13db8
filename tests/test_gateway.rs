mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use prop_flow::api::{self, state::AppState};
use prop_flow::bus::Bus;
use prop_flow::store;
use prop_flow::underwrite::UnderwritingService;

use common::{seed_listing, seed_rent_estimate, test_config, toronto_condo};

/// Bind the gateway on an ephemeral port and return its base URL.
async fn spawn_gateway(db: store::Db) -> String {
    let cfg = Arc::new(test_config());
    let underwriting = Arc::new(UnderwritingService::new(
        db.clone(),
        Bus::new(),
        cfg.grid.clone(),
        Duration::from_secs(10),
    ));
    let state = AppState::new(db, cfg, underwriting);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

async fn seeded_db() -> store::Db {
    let db = store::open_in_memory().unwrap();
    let version = seed_listing(&db, &toronto_condo("L1")).await;
    seed_rent_estimate(&db, "L1", version, 3_400.0).await;
    db
}

#[tokio::test]
async fn health_reports_healthy() {
    let base = spawn_gateway(seeded_db().await).await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "healthy");
}

#[tokio::test]
async fn properties_list_filters_and_pages() {
    let db = seeded_db().await;
    let mut other = toronto_condo("L2");
    other.address.city = "Vancouver".into();
    other.address.province = "BC".into();
    seed_listing(&db, &other).await;
    let base = spawn_gateway(db).await;

    let body: serde_json::Value =
        reqwest::get(format!("{base}/api/v1/properties?city=toronto&limit=10"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["listings"][0]["listing"]["id"], "L1");
    assert_eq!(body["limit"], 10);

    let all: serde_json::Value = reqwest::get(format!("{base}/api/v1/properties"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["total"], 2);
}

#[tokio::test]
async fn underwrite_on_demand_round_trips_the_cache() {
    let base = spawn_gateway(seeded_db().await).await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({
        "listingId": "L1",
        "assumptions": {
            "downPct": 0.25,
            "rateBps": 475,
            "amortMonths": 300,
            "rentScenario": "P75"
        }
    });

    let first: serde_json::Value = client
        .post(format!("{base}/api/v1/underwrite"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["fromCache"], false);
    assert!(first["metrics"]["dscr"].as_f64().unwrap() > 0.0);

    let second: serde_json::Value = client
        .post(format!("{base}/api/v1/underwrite"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["fromCache"], true);
    assert_eq!(second["resultId"], first["resultId"]);
}

#[tokio::test]
async fn underwrite_maps_typed_errors_to_http() {
    let base = spawn_gateway(seeded_db().await).await;
    let client = reqwest::Client::new();

    // Unknown listing: base inputs missing.
    let resp = client
        .post(format!("{base}/api/v1/underwrite"))
        .json(&serde_json::json!({
            "listingId": "nope",
            "assumptions": {
                "downPct": 0.2, "rateBps": 500,
                "amortMonths": 360, "rentScenario": "P50"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Out-of-range assumptions.
    let resp = client
        .post(format!("{base}/api/v1/underwrite"))
        .json(&serde_json::json!({
            "listingId": "L1",
            "assumptions": {
                "downPct": 0.04999, "rateBps": 500,
                "amortMonths": 360, "rentScenario": "P50"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn grid_lookup_is_404_before_any_grid_run() {
    let base = spawn_gateway(seeded_db().await).await;
    let resp = reqwest::get(format!(
        "{base}/api/v1/underwrite/grid?listingId=L1&rentScenario=P50&downPct=0.20&rateBps=500&amortMonths=360"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn saved_search_crud_is_scoped_to_the_user() {
    let base = spawn_gateway(seeded_db().await).await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{base}/api/v1/searches"))
        .header("x-user-id", "alice")
        .json(&serde_json::json!({
            "name": "toronto condos",
            "filter": { "city": "Toronto", "maxPrice": 800000.0 },
            "thresholds": { "minDSCR": 1.2 },
            "notify": { "channels": ["devbrowser"] }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["userId"], "alice");
    assert_eq!(created["isActive"], true);

    // Bob cannot see Alice's search.
    let resp = client
        .get(format!("{base}/api/v1/searches/{id}"))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Alice updates and deletes it.
    let updated: serde_json::Value = client
        .put(format!("{base}/api/v1/searches/{id}"))
        .header("x-user-id", "alice")
        .json(&serde_json::json!({
            "name": "renamed",
            "isActive": false
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["name"], "renamed");
    assert_eq!(updated["isActive"], false);

    let resp = client
        .delete(format!("{base}/api/v1/searches/{id}"))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let listed: serde_json::Value = client
        .get(format!("{base}/api/v1/searches"))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn property_detail_composes_the_read_model() {
    let db = seeded_db().await;
    let base = spawn_gateway(db).await;
    let client = reqwest::Client::new();

    // Warm an exact result through the public surface first.
    client
        .post(format!("{base}/api/v1/underwrite"))
        .json(&serde_json::json!({
            "listingId": "L1",
            "assumptions": {
                "downPct": 0.2, "rateBps": 500,
                "amortMonths": 360, "rentScenario": "P50"
            }
        }))
        .send()
        .await
        .unwrap();

    let detail: serde_json::Value = client
        .get(format!("{base}/api/v1/properties/L1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(detail["listing"]["id"], "L1");
    assert_eq!(detail["version"], 1);
    assert!(detail["rentEstimate"].is_object());
    assert_eq!(detail["underwriting"]["exact"].as_array().unwrap().len(), 1);
    assert_eq!(detail["alerts"].as_array().unwrap().len(), 0);

    let resp = client
        .get(format!("{base}/api/v1/properties/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
