pub mod comps;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::bus::{Bus, EventHandler};
use crate::config::EstimatorConfig;
use crate::errors::{PipelineError, Result};
use crate::events::{Envelope, EventPayload};
use crate::model::enrichment::Enrichment;
use crate::model::listing::Listing;
use crate::model::rent::{FeaturesUsed, RentEstimate, RentMethod};
use crate::store::{self, Db};

use comps::CompsSource;

pub const ESTIMATOR_VERSION: &str = "rent-2026.1";

/// Per-bedroom fallback when neither comps nor priors exist. Deliberately
/// conservative; the method tag marks these estimates as low-confidence.
fn per_bed_formula(beds: u32) -> f64 {
    950.0 + 550.0 * beds as f64
}

/// Rent estimation: comps when enough survive the comparability filter,
/// otherwise enrichment priors, otherwise the per-bedroom formula.
pub struct RentEstimatorService {
    db: Db,
    bus: Bus,
    cfg: EstimatorConfig,
    comps: Arc<dyn CompsSource>,
}

impl RentEstimatorService {
    pub fn new(db: Db, bus: Bus, cfg: EstimatorConfig, comps: Arc<dyn CompsSource>) -> Self {
        Self { db, bus, cfg, comps }
    }

    /// Pure estimation over a listing snapshot and its enrichment.
    pub fn estimate(
        &self,
        listing: &Listing,
        listing_version: i64,
        enrichment: Option<&Enrichment>,
    ) -> RentEstimate {
        let coords = listing_coords(listing, enrichment);

        // Comps path needs coordinates to measure distance.
        if let Some((lat, lng)) = coords {
            let candidates = self.comps.candidates_for(listing);
            let samples =
                comps::filter_comps(listing, lat, lng, &candidates, &self.cfg, Utc::now());
            if samples.len() >= self.cfg.comps_min_count {
                let mut rents: Vec<f64> = samples.iter().map(|s| s.monthly_rent).collect();
                rents.sort_by(|a, b| a.total_cmp(b));
                let p25 = comps::percentile(&rents, 0.25);
                let p50 = comps::percentile(&rents, 0.50);
                let p75 = comps::percentile(&rents, 0.75);
                return RentEstimate {
                    listing_id: listing.id.clone(),
                    listing_version,
                    estimator_version: ESTIMATOR_VERSION.to_string(),
                    method: RentMethod::Comps,
                    p25: Some(p25),
                    p50,
                    p75: Some(p75),
                    stdev: comps::sample_stdev(&rents),
                    features_used: FeaturesUsed {
                        comps: samples,
                        priors: None,
                    },
                    computed_at: Utc::now(),
                };
            }
        }

        if let Some(priors) = enrichment.and_then(|e| e.rent_priors.as_ref()) {
            return RentEstimate {
                listing_id: listing.id.clone(),
                listing_version,
                estimator_version: ESTIMATOR_VERSION.to_string(),
                method: RentMethod::Priors,
                p25: Some(priors.p25),
                p50: priors.p50,
                p75: Some(priors.p75),
                stdev: None,
                features_used: FeaturesUsed {
                    comps: Vec::new(),
                    priors: Some(priors.clone()),
                },
                computed_at: Utc::now(),
            };
        }

        let p50 = per_bed_formula(listing.beds);
        RentEstimate {
            listing_id: listing.id.clone(),
            listing_version,
            estimator_version: ESTIMATOR_VERSION.to_string(),
            method: RentMethod::Model,
            p25: Some((p50 * 0.9).round()),
            p50,
            p75: Some((p50 * 1.1).round()),
            stdev: None,
            features_used: FeaturesUsed::default(),
            computed_at: Utc::now(),
        }
    }

    async fn process(&self, id: &str) -> Result<()> {
        let stored = store::listings::get(&self.db, id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("listing {id}")))?;
        let enrichment = store::enrichments::get(&self.db, id).await?;

        let estimate = self.estimate(&stored.listing, stored.version, enrichment.as_ref());
        debug_assert!(estimate.is_ordered());

        let (changed, previous) = store::rents::upsert(&self.db, &estimate).await?;
        if !changed {
            debug!(listing = id, "rent estimate unchanged, suppressed");
            return Ok(());
        }

        let material = match &previous {
            Some(prev) => {
                estimate.materially_changed_from(prev, self.cfg.material_change_pct)
            }
            None => true,
        };
        if material {
            self.bus.publish(EventPayload::UnderwriteRequested {
                id: id.to_string(),
                assumptions_id: None,
            });
        } else {
            debug!(listing = id, "estimate shift below material threshold, suppressed");
        }
        Ok(())
    }
}

fn listing_coords(listing: &Listing, enrichment: Option<&Enrichment>) -> Option<(f64, f64)> {
    if let (Some(lat), Some(lng)) = (listing.address.lat, listing.address.lng) {
        return Some((lat, lng));
    }
    enrichment
        .and_then(|e| e.geo.as_ref())
        .map(|g| (g.lat, g.lng))
}

#[async_trait]
impl EventHandler for RentEstimatorService {
    async fn handle(&self, event: &Envelope) -> Result<()> {
        match &event.data {
            EventPayload::ListingChanged { id, .. } => self.process(id).await,
            EventPayload::DataEnriched { id, .. } => self.process(id).await,
            _ => Ok(()),
        }
    }
}
