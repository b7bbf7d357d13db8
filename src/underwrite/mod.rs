pub mod exact;
pub mod finance;
pub mod grid;
pub mod score;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bus::{Bus, EventHandler};
use crate::config::GridConfig;
use crate::enrich::costs;
use crate::errors::{PipelineError, Result};
use crate::events::{Envelope, EventPayload};
use crate::model::assumptions::Assumptions;
use crate::model::metrics::{BaseInputs, UnderwriteSource, grid_result_id};
use crate::model::RentScenario;
use crate::store::{self, Db};

pub use exact::ExactOutcome;
pub use finance::AnnuityFactorCache;

/// Join listing + enrichment + rent estimate into the immutable per-version
/// snapshot the compute paths run against.
///
/// A missing rent estimate means the pipeline has not caught up for this
/// listing yet; the caller logs and skips, and a later event retries.
pub async fn load_base_inputs(db: &Db, listing_id: &str) -> Result<BaseInputs> {
    let stored = store::listings::get(db, listing_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("listing {listing_id}")))?;
    let rent = store::rents::get(db, listing_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("rent estimate for {listing_id}")))?;
    let enrichment = store::enrichments::get(db, listing_id).await?;

    let listing = &stored.listing;
    let price = listing.list_price;

    let taxes_annual = listing
        .taxes_annual
        .or_else(|| enrichment.as_ref().and_then(|e| e.taxes.as_ref()).map(|t| t.annual_estimate))
        .unwrap_or(price * 0.01);
    let condo_fee_annual = listing.condo_fee_monthly.unwrap_or(0.0) * 12.0;
    let insurance_annual = enrichment
        .as_ref()
        .and_then(|e| e.cost_rules.as_ref())
        .map(|c| c.insurance_monthly_estimate * 12.0)
        .unwrap_or(0.0);
    let opex_annual = taxes_annual + condo_fee_annual + insurance_annual;

    let ltt_rule = enrichment
        .as_ref()
        .and_then(|e| e.cost_rules.as_ref())
        .map(|c| c.ltt_rule.clone())
        .unwrap_or_else(|| costs::LTT_PROVINCIAL.to_string());
    let closing_costs = costs::closing_costs(price, &ltt_rule);

    let p50 = rent.p50;
    let p25 = rent.p25.unwrap_or(p50);
    let p75 = rent.p75.unwrap_or(p50);

    Ok(BaseInputs {
        listing_id: listing_id.to_string(),
        listing_version: stored.version,
        price,
        closing_costs,
        noi_p25: p25 * 12.0 - opex_annual,
        noi_p50: p50 * 12.0 - opex_annual,
        noi_p75: p75 * 12.0 - opex_annual,
        city: listing.address.city.clone(),
        province: listing.address.province.clone(),
        property_type: listing.property_type,
    })
}

/// The underwriting compute service: grid fan-out on recompute triggers,
/// exact cache for on-demand requests.
pub struct UnderwritingService {
    db: Db,
    bus: Bus,
    grid_cfg: GridConfig,
    compute_timeout: Duration,
    af_cache: Arc<AnnuityFactorCache>,
}

impl UnderwritingService {
    pub fn new(db: Db, bus: Bus, grid_cfg: GridConfig, compute_timeout: Duration) -> Self {
        Self {
            db,
            bus,
            grid_cfg,
            compute_timeout,
            af_cache: Arc::new(AnnuityFactorCache::new()),
        }
    }

    pub fn af_cache(&self) -> Arc<AnnuityFactorCache> {
        self.af_cache.clone()
    }

    /// Compute and persist the full grid for the listing's current version.
    /// Returns the synthetic result id and the best P50 score.
    pub async fn run_grid(&self, listing_id: &str) -> Result<(String, Option<f64>)> {
        let base = load_base_inputs(&self.db, listing_id).await?;

        let cfg = self.grid_cfg.clone();
        let af_cache = self.af_cache.clone();
        let compute_base = base.clone();

        // The grid is CPU-bound; it runs off the async workers, bounded by
        // the compute deadline. On timeout nothing is written or published.
        let compute = tokio::task::spawn_blocking(move || {
            let rows = grid::compute_grid(&compute_base, &cfg, &af_cache);
            let best_p50 = rows
                .iter()
                .filter(|r| r.rent_scenario == RentScenario::P50)
                .map(|r| score::score(&r.metrics))
                .fold(None, |acc: Option<f64>, s| {
                    Some(acc.map_or(s, |a| a.max(s)))
                });
            (rows, best_p50)
        });

        let (rows, best_p50) = tokio::time::timeout(self.compute_timeout, compute)
            .await
            .map_err(|_| PipelineError::Transient(format!("grid compute for {listing_id} timed out")))?
            .map_err(|e| PipelineError::Fatal(format!("grid compute task: {e}")))?;

        let row_count = rows.len();
        store::underwriting::upsert_grid_rows(&self.db, &rows).await?;
        info!(
            listing = listing_id,
            version = base.listing_version,
            rows = row_count,
            "grid upserted"
        );

        Ok((grid_result_id(listing_id, base.listing_version), best_p50))
    }

    /// On-demand exact underwrite against the listing's current version.
    /// Shared by the event path and the gateway's synchronous endpoint.
    pub async fn run_exact(&self, listing_id: &str, assumptions: &Assumptions) -> Result<ExactOutcome> {
        let base = load_base_inputs(&self.db, listing_id).await?;
        exact::compute_exact(&self.db, &self.af_cache, &base, assumptions).await
    }

    async fn handle_requested(&self, id: &str, assumptions_id: Option<Uuid>) -> Result<()> {
        match assumptions_id {
            None => {
                let (result_id, best_score) = self.run_grid(id).await?;
                self.bus.publish(EventPayload::UnderwriteCompleted {
                    id: id.to_string(),
                    result_id,
                    source: UnderwriteSource::Grid,
                    score: best_score,
                });
            }
            Some(set_id) => {
                let set = store::underwriting::get_assumption_set(&self.db, &set_id)
                    .await?
                    .ok_or_else(|| {
                        PipelineError::NotFound(format!("assumption set {set_id}"))
                    })?;
                let outcome = self.run_exact(id, &set.assumptions).await?;
                let score = score::score(&outcome.metrics);
                self.bus.publish(EventPayload::UnderwriteCompleted {
                    id: id.to_string(),
                    result_id: outcome.result_id,
                    source: UnderwriteSource::Exact,
                    score: Some(score),
                });
            }
        }
        Ok(())
    }

    async fn handle_listing_changed(&self, id: &str, dirty: &[crate::model::DirtyField]) -> Result<()> {
        if !dirty.iter().any(|d| d.is_financial()) {
            debug!(listing = id, "no financial dirty fields, grid untouched");
            return Ok(());
        }
        let (result_id, best_score) = self.run_grid(id).await?;
        self.bus.publish(EventPayload::UnderwriteCompleted {
            id: id.to_string(),
            result_id,
            source: UnderwriteSource::Grid,
            score: best_score,
        });
        Ok(())
    }
}

#[async_trait]
impl EventHandler for UnderwritingService {
    async fn handle(&self, event: &Envelope) -> Result<()> {
        match &event.data {
            EventPayload::UnderwriteRequested { id, assumptions_id } => {
                self.handle_requested(id, *assumptions_id).await
            }
            EventPayload::ListingChanged { id, dirty, .. } => {
                self.handle_listing_changed(id, dirty).await
            }
            _ => Ok(()),
        }
    }
}
