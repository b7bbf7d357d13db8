use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a listing's coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GeoSource {
    /// Coordinates were present on the feed item.
    Listing,
    /// Coordinates were resolved through the geocoder.
    Geocoded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Geo {
    pub lat: f64,
    pub lng: f64,
    pub fsa: Option<String>,
    pub neighborhood: Option<String>,
    pub source: GeoSource,
}

/// How an annual-tax figure was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaxMethod {
    /// Exact figure carried on the listing itself.
    Exact,
    /// City or province mill-rate lookup.
    RateTable,
    /// No table entry — conservative flat-rate estimate.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaxEstimate {
    pub annual_estimate: f64,
    pub method: TaxMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeeCheck {
    pub condo_fee_monthly: f64,
    pub sanity_flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriorsSource {
    Cmhc,
    Table,
    None,
}

/// CMHC-style rent priors for the listing's (metro|fsa, beds, type) bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RentPriors {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub source: PriorsSource,
    pub metro: Option<String>,
    pub fsa: Option<String>,
    pub as_of: DateTime<Utc>,
}

impl RentPriors {
    /// Percentiles must be ordered when all are present.
    pub fn is_ordered(&self) -> bool {
        self.p25 <= self.p50 && self.p50 <= self.p75
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocationScores {
    pub walk: u32,
    pub transit: u32,
    pub bike: u32,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostRules {
    /// Land-transfer-tax rule keyed by city ("toronto_double", "provincial").
    pub ltt_rule: String,
    pub insurance_monthly_estimate: f64,
}

/// Per-listing enrichment row. Sub-objects are independently best-effort:
/// any of them may be absent when its provider failed or had no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Enrichment {
    pub listing_id: String,
    /// The listing version this row was computed from.
    pub listing_version: i64,
    /// Revision stamp of the enrichment logic itself.
    pub enrichment_version: String,
    pub geo: Option<Geo>,
    pub taxes: Option<TaxEstimate>,
    pub fees: Option<FeeCheck>,
    pub rent_priors: Option<RentPriors>,
    pub location_scores: Option<LocationScores>,
    pub cost_rules: Option<CostRules>,
    pub computed_at: DateTime<Utc>,
}

impl Enrichment {
    /// Names of the populated sub-objects, carried on `data_enriched`.
    pub fn populated_types(&self) -> Vec<String> {
        let mut types = Vec::new();
        if self.geo.is_some() {
            types.push("geo".to_string());
        }
        if self.taxes.is_some() {
            types.push("taxes".to_string());
        }
        if self.fees.is_some() {
            types.push("fees".to_string());
        }
        if self.rent_priors.is_some() {
            types.push("rent_priors".to_string());
        }
        if self.location_scores.is_some() {
            types.push("location_scores".to_string());
        }
        if self.cost_rules.is_some() {
            types.push("cost_rules".to_string());
        }
        types
    }

    /// True when the two rows differ in any field other than `computed_at`.
    pub fn differs_from(&self, other: &Enrichment) -> bool {
        self.listing_version != other.listing_version
            || self.enrichment_version != other.enrichment_version
            || self.geo != other.geo
            || self.taxes != other.taxes
            || self.fees != other.fees
            || self.rent_priors != other.rent_priors
            || self.location_scores != other.location_scores
            || self.cost_rules != other.cost_rules
    }

    /// True when a sub-object that feeds underwriting differs.
    pub fn financially_differs_from(&self, other: &Enrichment) -> bool {
        self.taxes != other.taxes
            || self.fees != other.fees
            || self.rent_priors != other.rent_priors
            || self.geo.as_ref().map(|g| (g.lat, g.lng))
                != other.geo.as_ref().map(|g| (g.lat, g.lng))
    }
}
