use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::enrichment::RentPriors;

/// Which estimation path produced the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RentMethod {
    /// Enrichment priors used directly.
    Priors,
    /// Percentiles over a filtered comparable set.
    Comps,
    /// Per-bedroom fallback formula.
    Model,
}

/// A comparable rental observation considered for the comps path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompSample {
    pub listing_id: String,
    pub monthly_rent: f64,
    pub beds: u32,
    pub baths: u32,
    pub sqft: Option<u32>,
    pub distance_km: f64,
    pub age_days: i64,
}

/// Inputs the estimator actually used, kept for explainability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FeaturesUsed {
    pub comps: Vec<CompSample>,
    pub priors: Option<RentPriors>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RentEstimate {
    pub listing_id: String,
    pub listing_version: i64,
    pub estimator_version: String,
    pub method: RentMethod,
    pub p25: Option<f64>,
    /// Always present — every path produces a point estimate.
    pub p50: f64,
    pub p75: Option<f64>,
    pub stdev: Option<f64>,
    pub features_used: FeaturesUsed,
    pub computed_at: DateTime<Utc>,
}

impl RentEstimate {
    pub fn is_ordered(&self) -> bool {
        match (self.p25, self.p75) {
            (Some(p25), Some(p75)) => p25 <= self.p50 && self.p50 <= p75,
            (Some(p25), None) => p25 <= self.p50,
            (None, Some(p75)) => self.p50 <= p75,
            (None, None) => true,
        }
    }

    /// True when `self` differs from `other` in any field other than
    /// `computed_at` (the diff-and-bump comparison).
    pub fn differs_from(&self, other: &RentEstimate) -> bool {
        self.listing_version != other.listing_version
            || self.estimator_version != other.estimator_version
            || self.method != other.method
            || self.p25 != other.p25
            || self.p50 != other.p50
            || self.p75 != other.p75
            || self.stdev != other.stdev
            || self.features_used != other.features_used
    }

    /// Material-change test: a ≥ 3 % shift in the point estimate, or a
    /// different estimation path, warrants a recompute event downstream.
    pub fn materially_changed_from(&self, old: &RentEstimate, threshold_pct: f64) -> bool {
        if self.method != old.method {
            return true;
        }
        let rel = (self.p50 - old.p50).abs() / old.p50.max(1.0);
        rel >= threshold_pct
    }
}
