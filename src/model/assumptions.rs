use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which rent percentile an underwrite run prices against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum RentScenario {
    P25,
    P50,
    P75,
}

impl RentScenario {
    pub const ALL: [RentScenario; 3] = [RentScenario::P25, RentScenario::P50, RentScenario::P75];

    pub fn as_str(&self) -> &'static str {
        match self {
            RentScenario::P25 => "P25",
            RentScenario::P50 => "P50",
            RentScenario::P75 => "P75",
        }
    }
}

/// Underwriting assumptions, supplied inline per request or persisted as a
/// named set. Optional fields are omitted from the canonical form when unset,
/// so `{downPct, rateBps}` and the same object with explicit nulls hash
/// identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Assumptions {
    pub down_pct: f64,
    pub rate_bps: u32,
    pub amort_months: u32,
    pub rent_scenario: RentScenario,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mgmt_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserves_monthly: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_cap_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_rent_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_expense_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_years: Option<f64>,
}

pub const AMORT_MONTHS_ALLOWED: [u32; 3] = [240, 300, 360];

impl Assumptions {
    /// Validate every field against its declared range, collecting all
    /// violations rather than stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(0.05..=0.35).contains(&self.down_pct) {
            errors.push(format!(
                "downPct {} outside [0.05, 0.35]",
                self.down_pct
            ));
        }
        if !(100..=2000).contains(&self.rate_bps) {
            errors.push(format!("rateBps {} outside [100, 2000]", self.rate_bps));
        }
        if !AMORT_MONTHS_ALLOWED.contains(&self.amort_months) {
            errors.push(format!(
                "amortMonths {} not one of {{240, 300, 360}}",
                self.amort_months
            ));
        }
        if let Some(mgmt) = self.mgmt_pct {
            if !(0.0..=0.5).contains(&mgmt) {
                errors.push(format!("mgmtPct {mgmt} outside [0, 0.5]"));
            }
        }
        if let Some(reserves) = self.reserves_monthly {
            if reserves < 0.0 {
                errors.push(format!("reservesMonthly {reserves} is negative"));
            }
        }
        if let Some(cap) = self.exit_cap_pct {
            if !(cap > 0.0 && cap <= 0.2) {
                errors.push(format!("exitCapPct {cap} outside (0, 0.2]"));
            }
        }
        if let Some(g) = self.growth_rent_pct {
            if !(-0.1..=0.2).contains(&g) {
                errors.push(format!("growthRentPct {g} outside [-0.1, 0.2]"));
            }
        }
        if let Some(g) = self.growth_expense_pct {
            if !(-0.1..=0.2).contains(&g) {
                errors.push(format!("growthExpensePct {g} outside [-0.1, 0.2]"));
            }
        }
        if let Some(h) = self.hold_years {
            if !(1.0..=50.0).contains(&h) {
                errors.push(format!("holdYears {h} outside [1, 50]"));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Canonical JSON form: keys sorted lexicographically (serde_json maps are
    /// BTree-backed), unset optionals omitted. Two equivalent assumption
    /// objects in any key order serialize byte-identically.
    pub fn canonical_json(&self) -> String {
        let value = serde_json::to_value(self).expect("assumptions serialize");
        value.to_string()
    }
}

/// A persisted, reusable assumption set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssumptionSet {
    pub id: Uuid,
    pub name: String,
    pub assumptions: Assumptions,
}
