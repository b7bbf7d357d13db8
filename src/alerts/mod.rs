pub mod dispatch;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::{Bus, EventHandler};
use crate::errors::{PipelineError, Result};
use crate::events::{Envelope, EventPayload};
use crate::model::alert::{Alert, AlertPayload, DeliveryState, ListingSnapshot};
use crate::model::metrics::{Metrics, UnderwriteSource};
use crate::model::search::{SavedSearch, SearchFilter, SearchThresholds};
use crate::model::RentScenario;
use crate::store::{self, Db};

use dispatch::ChannelDispatcher;

/// Evaluates `underwrite_completed` results against every active saved
/// search and fans matches out per channel.
pub struct AlertsMatcherService {
    db: Db,
    bus: Bus,
    dispatcher: Arc<dyn ChannelDispatcher>,
}

impl AlertsMatcherService {
    pub fn new(db: Db, bus: Bus, dispatcher: Arc<dyn ChannelDispatcher>) -> Self {
        Self { db, bus, dispatcher }
    }

    async fn handle_completed(
        &self,
        listing_id: &str,
        result_id: &str,
        source: UnderwriteSource,
        score: Option<f64>,
    ) -> Result<()> {
        let stored = store::listings::get(&self.db, listing_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("listing {listing_id}")))?;

        let snapshot = ListingSnapshot {
            city: stored.listing.address.city.clone(),
            province: stored.listing.address.province.clone(),
            property_type: stored.listing.property_type,
            beds: stored.listing.beds,
            baths: stored.listing.baths,
            price: stored.listing.list_price,
        };

        let metrics = self.resolve_metrics(listing_id, result_id, source).await?;
        let searches = store::searches::list_active(&self.db).await?;

        for search in &searches {
            if !filter_matches(&search.filter, &snapshot) {
                continue;
            }
            let Some(matched) = threshold_matches(&search.thresholds, &metrics, score) else {
                continue;
            };
            self.fire(search, listing_id, result_id, &snapshot, &metrics, score, matched)
                .await?;
        }
        Ok(())
    }

    /// The metrics an alert is judged on: the stored exact row, or for a
    /// grid completion the strongest P50 row of that write set.
    async fn resolve_metrics(
        &self,
        listing_id: &str,
        result_id: &str,
        source: UnderwriteSource,
    ) -> Result<Metrics> {
        match source {
            UnderwriteSource::Exact => {
                let row = store::underwriting::get_exact_by_id(&self.db, result_id)
                    .await?
                    .ok_or_else(|| {
                        PipelineError::NotFound(format!("exact result {result_id}"))
                    })?;
                Ok(row.metrics)
            }
            UnderwriteSource::Grid => {
                let version = parse_grid_version(result_id).ok_or_else(|| {
                    PipelineError::InvalidInput(format!("malformed grid result id '{result_id}'"))
                })?;
                let best = store::underwriting::grid_best_rows(&self.db, listing_id, version)
                    .await?
                    .into_iter()
                    .find(|r| r.rent_scenario == RentScenario::P50)
                    .ok_or_else(|| {
                        PipelineError::NotFound(format!("grid rows for {result_id}"))
                    })?;
                Ok(best.metrics)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn fire(
        &self,
        search: &SavedSearch,
        listing_id: &str,
        result_id: &str,
        snapshot: &ListingSnapshot,
        metrics: &Metrics,
        score: Option<f64>,
        matched: Vec<String>,
    ) -> Result<()> {
        let mut delivery = BTreeMap::new();
        for channel in &search.notify.channels {
            delivery.insert(channel.as_str().to_string(), DeliveryState::Pending);
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            user_id: search.user_id.clone(),
            saved_search_id: search.id,
            listing_id: listing_id.to_string(),
            result_id: result_id.to_string(),
            payload: AlertPayload {
                snapshot: snapshot.clone(),
                metrics: metrics.clone(),
                score,
                matched,
            },
            channels: search.notify.channels.clone(),
            delivery,
            triggered_at: Utc::now(),
        };

        let inserted = store::alerts::insert(&self.db, &alert).await?;
        if !inserted {
            debug!(
                user = %search.user_id,
                listing = listing_id,
                result = result_id,
                "alert already exists, suppressed"
            );
            return Ok(());
        }

        for channel in &search.notify.channels {
            let state = match self.dispatcher.enqueue(&alert, *channel).await {
                Ok(()) => DeliveryState::Sent,
                Err(err) => {
                    warn!(
                        alert = %alert.id,
                        channel = channel.as_str(),
                        error = %err,
                        "dispatch enqueue failed; left for retry"
                    );
                    DeliveryState::Failed
                }
            };
            store::alerts::set_delivery_state(
                &self.db,
                &alert.id.to_string(),
                channel.as_str(),
                state,
            )
            .await?;

            self.bus.publish(EventPayload::AlertFired {
                user_id: search.user_id.clone(),
                listing_id: listing_id.to_string(),
                result_id: result_id.to_string(),
                channel: *channel,
            });
        }
        Ok(())
    }
}

/// All present filter fields must match: strings case-insensitive, numeric
/// bounds inclusive.
pub fn filter_matches(filter: &SearchFilter, snapshot: &ListingSnapshot) -> bool {
    if let Some(city) = &filter.city {
        if !city.eq_ignore_ascii_case(&snapshot.city) {
            return false;
        }
    }
    if let Some(province) = &filter.province {
        if !province.eq_ignore_ascii_case(&snapshot.province) {
            return false;
        }
    }
    if let Some(pt) = filter.property_type {
        if pt != snapshot.property_type {
            return false;
        }
    }
    if let Some(min) = filter.min_beds {
        if snapshot.beds < min {
            return false;
        }
    }
    if let Some(max) = filter.max_beds {
        if snapshot.beds > max {
            return false;
        }
    }
    if let Some(min) = filter.min_price {
        if snapshot.price < min {
            return false;
        }
    }
    if let Some(max) = filter.max_price {
        if snapshot.price > max {
            return false;
        }
    }
    true
}

/// All present thresholds must hold. Returns the matched-reasons list for
/// user-visible explanation, or `None` when any threshold fails.
pub fn threshold_matches(
    thresholds: &SearchThresholds,
    metrics: &Metrics,
    score: Option<f64>,
) -> Option<Vec<String>> {
    let mut matched = Vec::new();

    if let Some(min) = thresholds.min_dscr {
        if metrics.dscr < min {
            return None;
        }
        matched.push(format!("dscr>={min}"));
    }
    if let Some(min) = thresholds.min_coc {
        if metrics.cash_on_cash_pct < min {
            return None;
        }
        matched.push(format!("coc>={min}"));
    }
    if let Some(min) = thresholds.min_cap_rate {
        if metrics.cap_rate_pct < min {
            return None;
        }
        matched.push(format!("cap_rate>={min}"));
    }
    if let Some(min) = thresholds.min_score {
        match score {
            Some(s) if s >= min => matched.push(format!("score>={min}")),
            _ => return None,
        }
    }
    if thresholds.require_non_negative_cf == Some(true) {
        if metrics.cash_flow_annual < 0.0 {
            return None;
        }
        matched.push("cf>=0".to_string());
    }

    Some(matched)
}

fn parse_grid_version(result_id: &str) -> Option<i64> {
    let version_part = result_id.rsplit(":v").next()?;
    version_part.parse().ok()
}

#[async_trait]
impl EventHandler for AlertsMatcherService {
    async fn handle(&self, event: &Envelope) -> Result<()> {
        match &event.data {
            EventPayload::UnderwriteCompleted {
                id,
                result_id,
                source,
                score,
            } => self.handle_completed(id, result_id, *source, *score).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::assumptions::Assumptions;
    use crate::model::listing::PropertyType;

    fn snapshot() -> ListingSnapshot {
        ListingSnapshot {
            city: "Toronto".into(),
            province: "ON".into(),
            property_type: PropertyType::Condo,
            beds: 2,
            baths: 2,
            price: 750_000.0,
        }
    }

    fn metrics(dscr: f64, coc: f64, cf: f64) -> Metrics {
        Metrics {
            price: 750_000.0,
            noi: 40_000.0,
            cap_rate_pct: 5.3,
            loan: 600_000.0,
            ds_annual: 30_000.0,
            cash_flow_annual: cf,
            dscr,
            cash_on_cash_pct: coc,
            breakeven_occ_pct: 75.0,
            irr_pct: None,
            inputs: Assumptions {
                down_pct: 0.2,
                rate_bps: 500,
                amort_months: 360,
                rent_scenario: RentScenario::P50,
                mgmt_pct: None,
                reserves_monthly: None,
                exit_cap_pct: None,
                growth_rent_pct: None,
                growth_expense_pct: None,
                hold_years: None,
            },
        }
    }

    #[test]
    fn filter_is_case_insensitive_and_inclusive() {
        let filter = SearchFilter {
            city: Some("toronto".into()),
            max_price: Some(750_000.0),
            min_beds: Some(2),
            ..Default::default()
        };
        assert!(filter_matches(&filter, &snapshot()));
    }

    #[test]
    fn price_above_max_fails_filter() {
        let filter = SearchFilter {
            max_price: Some(700_000.0),
            ..Default::default()
        };
        assert!(!filter_matches(&filter, &snapshot()));
    }

    #[test]
    fn thresholds_record_matched_reasons() {
        let thresholds = SearchThresholds {
            min_dscr: Some(1.2),
            min_coc: Some(0.08),
            require_non_negative_cf: Some(true),
            ..Default::default()
        };
        let matched = threshold_matches(&thresholds, &metrics(1.4, 0.095, 2_800.0), None).unwrap();
        assert!(matched.contains(&"dscr>=1.2".to_string()));
        assert!(matched.contains(&"coc>=0.08".to_string()));
        assert!(matched.contains(&"cf>=0".to_string()));
    }

    #[test]
    fn failed_threshold_rejects_the_whole_search() {
        let thresholds = SearchThresholds {
            min_dscr: Some(1.2),
            require_non_negative_cf: Some(true),
            ..Default::default()
        };
        assert!(threshold_matches(&thresholds, &metrics(1.4, 0.09, -10.0), None).is_none());
    }

    #[test]
    fn min_score_requires_a_score() {
        let thresholds = SearchThresholds {
            min_score: Some(50.0),
            ..Default::default()
        };
        assert!(threshold_matches(&thresholds, &metrics(1.4, 0.09, 10.0), None).is_none());
        assert!(threshold_matches(&thresholds, &metrics(1.4, 0.09, 10.0), Some(61.0)).is_some());
    }

    #[test]
    fn grid_result_id_version_parses() {
        assert_eq!(parse_grid_version("grid:L1:v3"), Some(3));
        assert_eq!(parse_grid_version("nonsense"), None);
    }
}
