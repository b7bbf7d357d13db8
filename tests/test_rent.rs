mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use prop_flow::bus::Bus;
use prop_flow::config::EstimatorConfig;
use prop_flow::enrich::{EnrichmentDeps, EnrichmentService};
use prop_flow::events::topics;
use prop_flow::model::listing::PropertyType;
use prop_flow::model::rent::RentMethod;
use prop_flow::rent::RentEstimatorService;
use prop_flow::rent::comps::{RentalComp, StaticComps};
use prop_flow::store;

use common::{collect, seed_listing, toronto_condo};

fn comp(id: &str, rent: f64, age_days: i64) -> RentalComp {
    RentalComp {
        listing_id: id.to_string(),
        monthly_rent: rent,
        beds: 2,
        baths: 2,
        sqft: Some(860),
        property_type: PropertyType::Condo,
        city: "Toronto".to_string(),
        fsa: Some("M5E".to_string()),
        lat: 43.6490,
        lng: -79.3755,
        observed_at: Utc::now() - chrono::Duration::days(age_days),
    }
}

fn estimator(db: &store::Db, bus: &Bus, comps: Vec<RentalComp>) -> RentEstimatorService {
    RentEstimatorService::new(
        db.clone(),
        bus.clone(),
        EstimatorConfig::default(),
        Arc::new(StaticComps { comps }),
    )
}

// ── Strategy selection ──────────────────────────────────────────────

#[tokio::test]
async fn enough_comps_take_the_comps_path() {
    let db = store::open_in_memory().unwrap();
    let bus = Bus::new();
    let listing = toronto_condo("L1");

    let service = estimator(
        &db,
        &bus,
        vec![
            comp("R1", 3_100.0, 10),
            comp("R2", 3_300.0, 30),
            comp("R3", 3_600.0, 45),
        ],
    );

    let estimate = service.estimate(&listing, 1, None);
    assert_eq!(estimate.method, RentMethod::Comps);
    assert_eq!(estimate.p50, 3_300.0);
    assert_eq!(estimate.features_used.comps.len(), 3);
    assert!(estimate.is_ordered());
    assert!(estimate.stdev.is_some());
}

#[tokio::test]
async fn stale_and_distant_comps_fall_through_to_priors() {
    let db = store::open_in_memory().unwrap();
    let bus = Bus::new();
    let listing = toronto_condo("L1");

    // One fresh comp is under the threshold; the stale and far ones are
    // filtered out.
    let mut far = comp("R2", 3_200.0, 5);
    far.lat = 43.80; // well outside the 2 km radius
    let service = estimator(
        &db,
        &bus,
        vec![comp("R1", 3_100.0, 10), far, comp("R3", 3_500.0, 400)],
    );

    // Enrichment supplies Toronto priors.
    let enricher = EnrichmentService::new(db.clone(), bus.clone(), EnrichmentDeps::default());
    let enrichment = enricher.enrich(&listing, 1).await;
    assert!(enrichment.rent_priors.is_some());

    let estimate = service.estimate(&listing, 1, Some(&enrichment));
    assert_eq!(estimate.method, RentMethod::Priors);
    assert!(estimate.features_used.priors.is_some());
    assert!(estimate.is_ordered());
}

#[tokio::test]
async fn no_comps_and_no_priors_use_the_per_bed_formula() {
    let db = store::open_in_memory().unwrap();
    let bus = Bus::new();
    let listing = toronto_condo("L1");

    let service = estimator(&db, &bus, Vec::new());
    let estimate = service.estimate(&listing, 1, None);
    assert_eq!(estimate.method, RentMethod::Model);
    assert!(estimate.p50 > 0.0);
    assert!(estimate.is_ordered());
}

// ── Material-change gating ──────────────────────────────────────────

#[tokio::test]
async fn first_estimate_requests_an_underwrite() {
    let db = store::open_in_memory().unwrap();
    let bus = Bus::new();
    let requested = collect(&bus, topics::UNDERWRITE_REQUESTED);

    seed_listing(&db, &toronto_condo("L1")).await;
    let service = Arc::new(estimator(
        &db,
        &bus,
        vec![
            comp("R1", 3_100.0, 10),
            comp("R2", 3_300.0, 30),
            comp("R3", 3_600.0, 45),
        ],
    ));
    bus.subscribe(
        prop_flow::bus::SubscriptionSpec::new(topics::LISTING_CHANGED, "rent-estimator"),
        service,
    );

    bus.publish(prop_flow::events::EventPayload::ListingChanged {
        id: "L1".into(),
        updated_at: Utc::now(),
        change: prop_flow::model::listing::ChangeKind::Create,
        source: "test".into(),
        dirty: vec![prop_flow::model::listing::DirtyField::Price],
    });

    assert!(bus.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(requested.lock().unwrap().len(), 1);
    assert!(store::rents::get(&db, "L1").await.unwrap().is_some());
}

#[tokio::test]
async fn unchanged_reestimate_is_suppressed() {
    let db = store::open_in_memory().unwrap();
    let bus = Bus::new();
    let requested = collect(&bus, topics::UNDERWRITE_REQUESTED);

    seed_listing(&db, &toronto_condo("L1")).await;
    let comps = vec![
        comp("R1", 3_100.0, 10),
        comp("R2", 3_300.0, 30),
        comp("R3", 3_600.0, 45),
    ];
    let service = Arc::new(estimator(&db, &bus, comps));
    bus.subscribe(
        prop_flow::bus::SubscriptionSpec::new(topics::DATA_ENRICHED, "rent-estimator"),
        service,
    );

    let publish_enriched = || {
        bus.publish(prop_flow::events::EventPayload::DataEnriched {
            id: "L1".into(),
            enrichment_types: vec!["geo".into()],
            updated_at: Utc::now(),
        })
    };

    publish_enriched();
    assert!(bus.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(requested.lock().unwrap().len(), 1);

    // Same comps, same listing: the re-estimate differs only in computed_at
    // and age_days drift is sub-day, so the upsert suppresses the event.
    publish_enriched();
    assert!(bus.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(requested.lock().unwrap().len(), 1);
}
