mod common;

use std::time::Duration;

use prop_flow::bus::Bus;
use prop_flow::errors::PipelineError;
use prop_flow::model::assumptions::RentScenario;
use prop_flow::store;
use prop_flow::underwrite::{UnderwritingService, load_base_inputs};

use common::{base_assumptions, seed_listing, seed_rent_estimate, small_grid, toronto_condo};

async fn service_with_seeded_listing() -> (store::Db, UnderwritingService, i64) {
    let db = store::open_in_memory().unwrap();
    let listing = toronto_condo("L1");
    let version = seed_listing(&db, &listing).await;
    seed_rent_estimate(&db, "L1", version, 3_400.0).await;

    let service = UnderwritingService::new(
        db.clone(),
        Bus::new(),
        small_grid(),
        Duration::from_secs(10),
    );
    (db, service, version)
}

// ── Grid ────────────────────────────────────────────────────────────

#[tokio::test]
async fn grid_covers_every_bin_and_is_keyed_by_version() {
    let (db, service, version) = service_with_seeded_listing().await;

    let (result_id, score) = service.run_grid("L1").await.unwrap();
    assert_eq!(result_id, format!("grid:L1:v{version}"));
    assert!(score.is_some());

    // 6 downs × 2 rates × 2 amorts × 3 scenarios
    let count = store::underwriting::grid_row_count(&db, "L1", version)
        .await
        .unwrap();
    assert_eq!(count, 6 * 2 * 2 * 3);
}

#[tokio::test]
async fn higher_down_payment_dominates_across_the_grid() {
    // BaseInputs fixed; holding (scenario, rate, amort) constant, more money
    // down must strictly improve coverage and cash flow.
    let (db, service, version) = service_with_seeded_listing().await;
    service.run_grid("L1").await.unwrap();

    let at = |down: f64| {
        let db = db.clone();
        async move {
        store::underwriting::get_grid_row(
            &db,
            "L1",
            version,
            RentScenario::P50,
            down,
            500,
            360,
        )
        .await
        .unwrap()
        .expect("row exists")
        }
    };

    let lo = at(0.20).await;
    let hi = at(0.25).await;
    assert!(hi.metrics.dscr > lo.metrics.dscr);
    assert!(hi.metrics.cash_flow_annual > lo.metrics.cash_flow_annual);
    assert!(hi.metrics.loan < lo.metrics.loan);
    assert_eq!(hi.metrics.noi, lo.metrics.noi);
}

#[tokio::test]
async fn rerunning_the_grid_yields_identical_rows() {
    let (db, service, version) = service_with_seeded_listing().await;

    service.run_grid("L1").await.unwrap();
    let before = store::underwriting::get_grid_row(
        &db, "L1", version, RentScenario::P75, 0.22, 475, 300,
    )
    .await
    .unwrap()
    .unwrap();

    service.run_grid("L1").await.unwrap();
    let after = store::underwriting::get_grid_row(
        &db, "L1", version, RentScenario::P75, 0.22, 475, 300,
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(before.metrics, after.metrics);
    let count = store::underwriting::grid_row_count(&db, "L1", version)
        .await
        .unwrap();
    assert_eq!(count, 6 * 2 * 2 * 3);
}

#[tokio::test]
async fn grid_without_rent_estimate_is_not_found() {
    let db = store::open_in_memory().unwrap();
    seed_listing(&db, &toronto_condo("L1")).await;

    let service =
        UnderwritingService::new(db, Bus::new(), small_grid(), Duration::from_secs(10));
    let err = service.run_grid("L1").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

// ── Exact cache ─────────────────────────────────────────────────────

#[tokio::test]
async fn exact_cache_hits_on_identical_assumptions() {
    let (_db, service, _) = service_with_seeded_listing().await;

    let mut assumptions = base_assumptions();
    assumptions.down_pct = 0.25;
    assumptions.rate_bps = 475;
    assumptions.amort_months = 300;
    assumptions.rent_scenario = RentScenario::P75;

    let first = service.run_exact("L1", &assumptions).await.unwrap();
    assert!(!first.from_cache);

    let second = service.run_exact("L1", &assumptions).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.result_id, first.result_id);
    assert_eq!(second.metrics, first.metrics);
}

#[tokio::test]
async fn listing_version_bump_invalidates_the_exact_cache() {
    let (db, service, _) = service_with_seeded_listing().await;
    let assumptions = base_assumptions();

    let first = service.run_exact("L1", &assumptions).await.unwrap();

    // A price change bumps the listing version; the old row stays but is
    // never read for the new version.
    let mut updated = toronto_condo("L1");
    updated.list_price = 760_000.0;
    updated.updated_at = "2026-07-25T12:00:00Z".parse().unwrap();
    let outcome = store::listings::upsert(&db, &updated).await.unwrap();
    assert!(matches!(
        outcome,
        store::listings::UpsertOutcome::Updated { version: 2, .. }
    ));

    let second = service.run_exact("L1", &assumptions).await.unwrap();
    assert!(!second.from_cache);
    assert_ne!(second.result_id, first.result_id);
}

#[tokio::test]
async fn out_of_range_assumptions_are_invalid_input() {
    let (_db, service, _) = service_with_seeded_listing().await;

    for down in [0.04999, 0.35001] {
        let mut bad = base_assumptions();
        bad.down_pct = down;
        let err = service.run_exact("L1", &bad).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)), "down={down}");
    }

    // Boundary values are accepted.
    for down in [0.05, 0.35] {
        let mut edge = base_assumptions();
        edge.down_pct = down;
        assert!(service.run_exact("L1", &edge).await.is_ok(), "down={down}");
    }
}

// ── Base inputs ─────────────────────────────────────────────────────

#[tokio::test]
async fn base_inputs_join_listing_costs_into_noi() {
    // No enrichment row: taxes come off the listing, insurance contributes
    // nothing, and closing costs fall back to the provincial LTT rule.
    let (db, _service, version) = service_with_seeded_listing().await;

    let base = load_base_inputs(&db, "L1").await.unwrap();
    assert_eq!(base.listing_version, version);
    assert_eq!(base.price, 750_000.0);

    // NOI p50 = rent p50 × 12 − (taxes + condo fees × 12).
    let opex = 3_400.0 + 620.0 * 12.0;
    assert!((base.noi_p50 - (3_400.0 * 12.0 - opex)).abs() < 1e-6);
    assert!(base.noi_p25 <= base.noi_p50 && base.noi_p50 <= base.noi_p75);

    assert!((base.closing_costs - (750_000.0 * 0.015 + 2_500.0)).abs() < 1e-6);
}
