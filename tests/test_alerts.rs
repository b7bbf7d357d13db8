mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use prop_flow::alerts::AlertsMatcherService;
use prop_flow::bus::{Bus, SubscriptionSpec};
use prop_flow::events::{EventPayload, topics};
use prop_flow::model::alert::DeliveryState;
use prop_flow::model::listing::PropertyType;
use prop_flow::model::metrics::UnderwriteSource;
use prop_flow::model::search::{Channel, SearchFilter, SearchThresholds};
use prop_flow::store;
use prop_flow::underwrite::UnderwritingService;

use common::{
    CountingDispatcher, base_assumptions, collect, seed_listing, seed_rent_estimate,
    seed_search, small_grid, toronto_condo,
};

struct Setup {
    db: store::Db,
    bus: Bus,
    dispatcher: Arc<CountingDispatcher>,
    result_id: String,
}

/// Listing + rent estimate + a real exact result to reference, matcher
/// subscribed on `underwrite_completed`.
async fn setup(dispatcher: CountingDispatcher) -> Setup {
    let db = store::open_in_memory().unwrap();
    let bus = Bus::new();

    let listing = toronto_condo("L1");
    let version = seed_listing(&db, &listing).await;
    seed_rent_estimate(&db, "L1", version, 3_400.0).await;

    let engine = UnderwritingService::new(
        db.clone(),
        Bus::new(),
        small_grid(),
        Duration::from_secs(10),
    );
    let outcome = engine.run_exact("L1", &base_assumptions()).await.unwrap();

    let dispatcher = Arc::new(dispatcher);
    let matcher = Arc::new(AlertsMatcherService::new(
        db.clone(),
        bus.clone(),
        dispatcher.clone(),
    ));
    bus.subscribe(
        SubscriptionSpec::new(topics::UNDERWRITE_COMPLETED, "alerts"),
        matcher,
    );

    Setup {
        db,
        bus,
        dispatcher,
        result_id: outcome.result_id,
    }
}

fn completed(result_id: &str, score: Option<f64>) -> EventPayload {
    EventPayload::UnderwriteCompleted {
        id: "L1".into(),
        result_id: result_id.into(),
        source: UnderwriteSource::Exact,
        score,
    }
}

fn qualifying_search() -> (SearchFilter, SearchThresholds) {
    (
        SearchFilter {
            city: Some("Toronto".into()),
            property_type: Some(PropertyType::Condo),
            max_price: Some(800_000.0),
            ..Default::default()
        },
        // The seeded exact result has dscr < 1 (leveraged downtown condo),
        // so thresholds stay below that to qualify.
        SearchThresholds {
            min_dscr: Some(0.5),
            min_cap_rate: Some(2.0),
            ..Default::default()
        },
    )
}

// ── Matching ────────────────────────────────────────────────────────

#[tokio::test]
async fn matching_search_fires_exactly_one_alert() {
    let s = setup(CountingDispatcher::new()).await;
    let (filter, thresholds) = qualifying_search();
    seed_search(&s.db, "user-1", filter, thresholds).await;
    let fired = collect(&s.bus, topics::ALERT_FIRED);

    s.bus.publish(completed(&s.result_id, None));
    assert!(s.bus.wait_idle(Duration::from_secs(5)).await);

    let alerts = store::alerts::list_for_user(&s.db, "user-1").await.unwrap();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.result_id, s.result_id);
    assert!(alert.payload.matched.contains(&"dscr>=0.5".to_string()));
    assert!(alert.payload.matched.contains(&"cap_rate>=2".to_string()));
    assert_eq!(
        alert.delivery.get("devbrowser"),
        Some(&DeliveryState::Sent)
    );
    assert_eq!(s.dispatcher.enqueued.load(Ordering::SeqCst), 1);
    assert_eq!(fired.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_completion_does_not_fire_twice() {
    let s = setup(CountingDispatcher::new()).await;
    let (filter, thresholds) = qualifying_search();
    seed_search(&s.db, "user-1", filter, thresholds).await;

    s.bus.publish(completed(&s.result_id, None));
    s.bus.publish(completed(&s.result_id, None));
    assert!(s.bus.wait_idle(Duration::from_secs(5)).await);

    let alerts = store::alerts::list_for_user(&s.db, "user-1").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(s.dispatcher.enqueued.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn price_above_max_never_alerts() {
    let s = setup(CountingDispatcher::new()).await;
    let (mut filter, thresholds) = qualifying_search();
    filter.max_price = Some(700_000.0); // listing is at 750k
    seed_search(&s.db, "user-1", filter, thresholds).await;

    s.bus.publish(completed(&s.result_id, None));
    assert!(s.bus.wait_idle(Duration::from_secs(5)).await);

    let alerts = store::alerts::list_for_user(&s.db, "user-1").await.unwrap();
    assert!(alerts.is_empty());
    assert_eq!(s.dispatcher.enqueued.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_threshold_blocks_the_alert() {
    let s = setup(CountingDispatcher::new()).await;
    let (filter, mut thresholds) = qualifying_search();
    thresholds.min_dscr = Some(5.0); // unreachable for this listing
    seed_search(&s.db, "user-1", filter, thresholds).await;

    s.bus.publish(completed(&s.result_id, None));
    assert!(s.bus.wait_idle(Duration::from_secs(5)).await);
    assert!(
        store::alerts::list_for_user(&s.db, "user-1")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn inactive_searches_are_skipped() {
    let s = setup(CountingDispatcher::new()).await;
    let (filter, thresholds) = qualifying_search();
    let mut search = seed_search(&s.db, "user-1", filter, thresholds).await;
    search.is_active = false;
    store::searches::upsert(&s.db, &search).await.unwrap();

    s.bus.publish(completed(&s.result_id, None));
    assert!(s.bus.wait_idle(Duration::from_secs(5)).await);
    assert!(
        store::alerts::list_for_user(&s.db, "user-1")
            .await
            .unwrap()
            .is_empty()
    );
}

// ── Delivery bookkeeping ────────────────────────────────────────────

#[tokio::test]
async fn failed_dispatch_is_recorded_but_the_alert_survives() {
    let dispatcher = CountingDispatcher {
        fail_channel: Some(Channel::Devbrowser),
        ..CountingDispatcher::new()
    };
    let s = setup(dispatcher).await;
    let (filter, thresholds) = qualifying_search();
    seed_search(&s.db, "user-1", filter, thresholds).await;

    s.bus.publish(completed(&s.result_id, None));
    assert!(s.bus.wait_idle(Duration::from_secs(5)).await);

    let alerts = store::alerts::list_for_user(&s.db, "user-1").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        alerts[0].delivery.get("devbrowser"),
        Some(&DeliveryState::Failed)
    );
}
