use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::assumptions::{Assumptions, RentScenario};
use super::listing::PropertyType;

/// Per-listing snapshot join of listing + enrichment + rent estimate, taken
/// at the moment an underwrite runs. Immutable for a given listing version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BaseInputs {
    pub listing_id: String,
    pub listing_version: i64,
    pub price: f64,
    pub closing_costs: f64,
    pub noi_p25: f64,
    pub noi_p50: f64,
    pub noi_p75: f64,
    pub city: String,
    pub province: String,
    pub property_type: PropertyType,
}

impl BaseInputs {
    pub fn noi_for(&self, scenario: RentScenario) -> f64 {
        match scenario {
            RentScenario::P25 => self.noi_p25,
            RentScenario::P50 => self.noi_p50,
            RentScenario::P75 => self.noi_p75,
        }
    }
}

/// Full underwriting output for one assumption point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metrics {
    pub price: f64,
    pub noi: f64,
    pub cap_rate_pct: f64,
    pub loan: f64,
    pub ds_annual: f64,
    pub cash_flow_annual: f64,
    pub dscr: f64,
    pub cash_on_cash_pct: f64,
    pub breakeven_occ_pct: f64,
    /// IRR modeling is an extension point; never populated today.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irr_pct: Option<f64>,
    pub inputs: Assumptions,
}

/// One cell of the underwriting grid. The key tuple is unique; rows with the
/// same key are upserted, never appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GridRow {
    pub listing_id: String,
    pub listing_version: i64,
    pub rent_scenario: RentScenario,
    pub down_pct_bin: f64,
    pub rate_bps_bin: u32,
    pub amort_months: u32,
    pub metrics: Metrics,
}

/// A cached exact-assumptions result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExactResult {
    pub result_id: String,
    pub listing_id: String,
    pub listing_version: i64,
    pub assumptions_hash: String,
    pub metrics: Metrics,
}

/// Which compute path produced an `underwrite_completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnderwriteSource {
    Grid,
    Exact,
}

/// Deterministic result id for a grid write set.
pub fn grid_result_id(listing_id: &str, listing_version: i64) -> String {
    format!("grid:{listing_id}:v{listing_version}")
}
