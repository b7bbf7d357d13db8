#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use prop_flow::alerts::dispatch::ChannelDispatcher;
use prop_flow::bus::{Bus, EventHandler, SubscriptionSpec};
use prop_flow::config::{Config, GridConfig};
use prop_flow::errors::{PipelineError, Result};
use prop_flow::events::Envelope;
use prop_flow::ingest::feed::{FeedItem, FeedPage, FeedSource};
use prop_flow::model::alert::Alert;
use prop_flow::model::assumptions::{Assumptions, RentScenario};
use prop_flow::model::listing::{Address, Listing, ListingStatus, PropertyType};
use prop_flow::model::rent::{FeaturesUsed, RentEstimate, RentMethod};
use prop_flow::model::search::{
    Channel, NotifyConfig, SavedSearch, SearchFilter, SearchThresholds,
};
use prop_flow::store::{self, Db};

// ── Fixtures ────────────────────────────────────────────────────────

pub fn ts(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("timestamp fixture")
}

pub fn toronto_condo(id: &str) -> Listing {
    Listing {
        id: id.to_string(),
        mls_number: format!("C{}", &id[id.len().saturating_sub(4)..]),
        source: "treb".into(),
        status: ListingStatus::Active,
        listed_at: ts("2026-07-01T12:00:00Z"),
        updated_at: ts("2026-07-20T12:00:00Z"),
        address: Address {
            street: "88 Scott St".into(),
            city: "Toronto".into(),
            province: "ON".into(),
            postal_code: "M5E 0A9".into(),
            country: "CA".into(),
            lat: Some(43.6486),
            lng: Some(-79.3762),
        },
        property_type: PropertyType::Condo,
        beds: 2,
        baths: 2,
        sqft: Some(850),
        list_price: 750_000.0,
        taxes_annual: Some(3_400.0),
        condo_fee_monthly: Some(620.0),
        media: None,
        brokerage: None,
    }
}

pub fn feed_item_for(listing: &Listing) -> FeedItem {
    serde_json::from_value(serde_json::json!({
        "id": listing.id,
        "mls_number": listing.mls_number,
        "status": "Active",
        "listed_at": listing.listed_at.to_rfc3339(),
        "updated_at": listing.updated_at.to_rfc3339(),
        "address": {
            "street": listing.address.street,
            "city": listing.address.city,
            "province": listing.address.province,
            "postal_code": listing.address.postal_code,
            "country": listing.address.country,
            "lat": listing.address.lat,
            "lng": listing.address.lng,
        },
        "property_type": "Condo Apt",
        "beds": listing.beds,
        "baths": listing.baths,
        "sqft": listing.sqft,
        "list_price": listing.list_price,
        "taxes_annual": listing.taxes_annual,
        "condo_fee_monthly": listing.condo_fee_monthly,
    }))
    .expect("feed item fixture")
}

pub fn base_assumptions() -> Assumptions {
    Assumptions {
        down_pct: 0.20,
        rate_bps: 500,
        amort_months: 360,
        rent_scenario: RentScenario::P50,
        mgmt_pct: None,
        reserves_monthly: None,
        exit_cap_pct: None,
        growth_rent_pct: None,
        growth_expense_pct: None,
        hold_years: None,
    }
}

/// Small axes so grid tests stay fast.
pub fn small_grid() -> GridConfig {
    GridConfig {
        down_min: 0.20,
        down_max: 0.25,
        down_step: 0.01,
        rate_min_bps: 475,
        rate_max_bps: 500,
        rate_step_bps: 25,
        amorts: vec![300, 360],
    }
}

pub fn test_config() -> Config {
    Config {
        grid: small_grid(),
        ..Config::default()
    }
}

// ── Store seeding ───────────────────────────────────────────────────

pub async fn seed_listing(db: &Db, listing: &Listing) -> i64 {
    match store::listings::upsert(db, listing).await.expect("seed listing") {
        store::listings::UpsertOutcome::Created { version } => version,
        store::listings::UpsertOutcome::Updated { version, .. } => version,
        store::listings::UpsertOutcome::Unchanged => {
            store::listings::get(db, &listing.id)
                .await
                .expect("re-read listing")
                .expect("listing exists")
                .version
        }
    }
}

pub async fn seed_rent_estimate(db: &Db, listing_id: &str, version: i64, p50: f64) {
    let estimate = RentEstimate {
        listing_id: listing_id.to_string(),
        listing_version: version,
        estimator_version: "rent-2026.1".into(),
        method: RentMethod::Priors,
        p25: Some(p50 * 0.85),
        p50,
        p75: Some(p50 * 1.18),
        stdev: None,
        features_used: FeaturesUsed::default(),
        computed_at: Utc::now(),
    };
    store::rents::upsert(db, &estimate).await.expect("seed rent");
}

pub async fn seed_search(
    db: &Db,
    user_id: &str,
    filter: SearchFilter,
    thresholds: SearchThresholds,
) -> SavedSearch {
    let search = SavedSearch {
        id: uuid::Uuid::new_v4(),
        user_id: user_id.to_string(),
        name: "test search".into(),
        filter,
        thresholds,
        notify: NotifyConfig {
            channels: vec![Channel::Devbrowser],
        },
        is_active: true,
        created_at: Utc::now(),
    };
    store::searches::upsert(db, &search).await.expect("seed search");
    search
}

// ── Bus observation ─────────────────────────────────────────────────

pub struct Collector {
    pub events: Arc<Mutex<Vec<Envelope>>>,
}

#[async_trait]
impl EventHandler for Collector {
    async fn handle(&self, event: &Envelope) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Subscribe a recording consumer group to a topic; single worker keeps the
/// captured order deterministic.
pub fn collect(bus: &Bus, topic: &'static str) -> Arc<Mutex<Vec<Envelope>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    bus.subscribe(
        SubscriptionSpec::new(topic, "test-collector").workers(1),
        Arc::new(Collector {
            events: events.clone(),
        }),
    );
    events
}

// ── Mock collaborators ──────────────────────────────────────────────

/// Programmable in-memory feed: tests replace the item set between ticks.
pub struct MemoryFeed {
    items: Mutex<Vec<FeedItem>>,
}

impl MemoryFeed {
    pub fn new(items: Vec<FeedItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    pub fn set_items(&self, items: Vec<FeedItem>) {
        *self.items.lock().unwrap() = items;
    }
}

#[async_trait]
impl FeedSource for MemoryFeed {
    fn name(&self) -> &str {
        "memory-feed"
    }

    async fn fetch_updated_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        _page_token: Option<String>,
    ) -> Result<FeedPage> {
        let mut items = self.items.lock().unwrap().clone();
        if let Some(mark) = watermark {
            items.retain(|item| {
                item.updated_at
                    .parse::<DateTime<Utc>>()
                    .map(|t| t > mark)
                    .unwrap_or(true)
            });
        }
        Ok(FeedPage {
            items,
            next_page_token: None,
        })
    }
}

/// Counts enqueues; optionally fails a named channel to exercise the
/// failed-delivery bookkeeping.
pub struct CountingDispatcher {
    pub enqueued: AtomicUsize,
    pub fail_channel: Option<Channel>,
}

impl CountingDispatcher {
    pub fn new() -> Self {
        Self {
            enqueued: AtomicUsize::new(0),
            fail_channel: None,
        }
    }
}

#[async_trait]
impl ChannelDispatcher for CountingDispatcher {
    async fn enqueue(&self, _alert: &Alert, channel: Channel) -> Result<()> {
        if self.fail_channel == Some(channel) {
            return Err(PipelineError::Transient(format!(
                "{} transport unavailable",
                channel.as_str()
            )));
        }
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
