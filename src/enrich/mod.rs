pub mod costs;
pub mod providers;
pub mod taxes;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::bus::{Bus, EventHandler};
use crate::errors::{PipelineError, Result};
use crate::events::{Envelope, EventPayload};
use crate::model::enrichment::{Enrichment, FeeCheck, Geo, GeoSource, TaxEstimate, TaxMethod};
use crate::model::listing::{DirtyField, Listing};
use crate::store::{self, Db};

use providers::{Geocoder, PriorsProvider, ScoreProvider};

/// Revision stamp of the enrichment logic; bumping it marks every stored row
/// as stale on the next pass.
pub const ENRICHMENT_VERSION: &str = "enr-2026.1";

/// Condo fees above this are treated as data errors, not expensive buildings.
const FEE_MONTHLY_CEILING: f64 = 5_000.0;
const FEE_PER_SQFT_CEILING: f64 = 3.0;

/// External lookups the enrichment pipeline composes. Constructed with the
/// local table providers by default; tests substitute their own.
pub struct EnrichmentDeps {
    pub geocoder: Arc<dyn Geocoder>,
    pub scores: Arc<dyn ScoreProvider>,
    pub priors: Arc<dyn PriorsProvider>,
}

impl Default for EnrichmentDeps {
    fn default() -> Self {
        Self {
            geocoder: Arc::new(providers::TableGeocoder),
            scores: Arc::new(providers::TableScoreProvider),
            priors: Arc::new(providers::TablePriorsProvider),
        }
    }
}

pub struct EnrichmentService {
    db: Db,
    bus: Bus,
    deps: EnrichmentDeps,
}

impl EnrichmentService {
    pub fn new(db: Db, bus: Bus, deps: EnrichmentDeps) -> Self {
        Self { db, bus, deps }
    }

    /// Build the enrichment row for a listing snapshot. Every sub-call is
    /// best-effort: a failed provider drops its sub-object and the rest of
    /// the row still lands.
    pub async fn enrich(&self, listing: &Listing, listing_version: i64) -> Enrichment {
        let geo = self.resolve_geo(listing).await;
        let taxes = resolve_taxes(listing);
        let fees = check_fees(listing);

        let location_scores = match &geo {
            Some(g) => match self.deps.scores.scores(g.lat, g.lng).await {
                Ok(s) => Some(s),
                Err(err) => {
                    warn!(listing = %listing.id, error = %err, "score provider failed");
                    None
                }
            },
            None => None,
        };

        let fsa = listing.address.fsa();
        let rent_priors = match self
            .deps
            .priors
            .priors(
                &listing.address.city,
                fsa.as_deref(),
                listing.beds,
                listing.property_type,
            )
            .await
        {
            Ok(Some(p)) if p.is_ordered() => Some(p),
            Ok(Some(p)) => {
                warn!(listing = %listing.id, ?p, "priors violate percentile ordering, dropped");
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(listing = %listing.id, error = %err, "priors provider failed");
                None
            }
        };

        let cost_rules = Some(costs::cost_rules_for(
            &listing.address.city,
            listing.list_price,
        ));

        Enrichment {
            listing_id: listing.id.clone(),
            listing_version,
            enrichment_version: ENRICHMENT_VERSION.to_string(),
            geo,
            taxes,
            fees,
            rent_priors,
            location_scores,
            cost_rules,
            computed_at: Utc::now(),
        }
    }

    async fn resolve_geo(&self, listing: &Listing) -> Option<Geo> {
        let fsa = listing.address.fsa();
        if let (Some(lat), Some(lng)) = (listing.address.lat, listing.address.lng) {
            return Some(Geo {
                lat,
                lng,
                fsa,
                neighborhood: None,
                source: GeoSource::Listing,
            });
        }
        match self.deps.geocoder.geocode(&listing.address).await {
            Ok((lat, lng)) => Some(Geo {
                lat,
                lng,
                fsa,
                neighborhood: None,
                source: GeoSource::Geocoded,
            }),
            Err(err) => {
                warn!(listing = %listing.id, error = %err, "geocode failed");
                None
            }
        }
    }

    async fn handle_listing_changed(&self, id: &str, dirty: &[DirtyField]) -> Result<()> {
        let stored = store::listings::get(&self.db, id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("listing {id}")))?;

        let row = self.enrich(&stored.listing, stored.version).await;
        let (changed, previous) = store::enrichments::upsert(&self.db, &row).await?;

        if !changed {
            debug!(listing = id, "enrichment unchanged, suppressed");
            return Ok(());
        }

        self.bus.publish(EventPayload::DataEnriched {
            id: id.to_string(),
            enrichment_types: row.populated_types(),
            updated_at: Utc::now(),
        });

        let financially_changed = match &previous {
            Some(prev) => row.financially_differs_from(prev),
            None => true,
        };
        let listing_financials_dirty = dirty.iter().any(|d| d.is_financial());
        if financially_changed && listing_financials_dirty {
            self.bus.publish(EventPayload::UnderwriteRequested {
                id: id.to_string(),
                assumptions_id: None,
            });
        }

        Ok(())
    }
}

fn resolve_taxes(listing: &Listing) -> Option<TaxEstimate> {
    match listing.taxes_annual {
        Some(annual) => Some(TaxEstimate {
            annual_estimate: annual,
            method: TaxMethod::Exact,
        }),
        None => Some(taxes::estimate_annual_tax(
            &listing.address.city,
            &listing.address.province,
            listing.list_price,
        )),
    }
}

fn check_fees(listing: &Listing) -> Option<FeeCheck> {
    let fee = listing.condo_fee_monthly?;
    let mut flags = Vec::new();
    if fee > FEE_MONTHLY_CEILING {
        flags.push("implausibly_high".to_string());
    }
    if let Some(sqft) = listing.sqft {
        if sqft > 0 && fee / sqft as f64 > FEE_PER_SQFT_CEILING {
            flags.push("high_per_sqft".to_string());
        }
    }
    if fee == 0.0 {
        flags.push("zero_fee".to_string());
    }
    Some(FeeCheck {
        condo_fee_monthly: fee,
        sanity_flags: flags,
    })
}

#[async_trait]
impl EventHandler for EnrichmentService {
    async fn handle(&self, event: &Envelope) -> Result<()> {
        match &event.data {
            EventPayload::ListingChanged { id, dirty, .. } => {
                self.handle_listing_changed(id, dirty).await
            }
            _ => Ok(()),
        }
    }
}

/// Debounce bypass: address changes reprocess immediately.
pub fn dirty_address_bypass(event: &Envelope) -> bool {
    matches!(
        &event.data,
        EventPayload::ListingChanged { dirty, .. } if dirty.contains(&DirtyField::Address)
    )
}
