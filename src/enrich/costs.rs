use crate::model::enrichment::CostRules;

/// Toronto levies a municipal land-transfer tax on top of the provincial one.
pub const LTT_TORONTO_DOUBLE: &str = "toronto_double";
pub const LTT_PROVINCIAL: &str = "provincial";

const LTT_RATE: f64 = 0.015;
const LEGAL_AND_INSPECTION_FLAT: f64 = 2_500.0;
const INSURANCE_ANNUAL_RATE: f64 = 0.0015;

pub fn ltt_rule_for_city(city: &str) -> &'static str {
    if city.eq_ignore_ascii_case("toronto") {
        LTT_TORONTO_DOUBLE
    } else {
        LTT_PROVINCIAL
    }
}

/// Closing-cost estimate used for cash-invested: land-transfer tax under the
/// named rule plus flat legal and inspection costs.
pub fn closing_costs(price: f64, ltt_rule: &str) -> f64 {
    let ltt = match ltt_rule {
        LTT_TORONTO_DOUBLE => price * LTT_RATE * 2.0,
        _ => price * LTT_RATE,
    };
    ltt + LEGAL_AND_INSPECTION_FLAT
}

pub fn cost_rules_for(city: &str, price: f64) -> CostRules {
    CostRules {
        ltt_rule: ltt_rule_for_city(city).to_string(),
        insurance_monthly_estimate: price * INSURANCE_ANNUAL_RATE / 12.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toronto_pays_double_ltt() {
        let toronto = closing_costs(1_000_000.0, LTT_TORONTO_DOUBLE);
        let elsewhere = closing_costs(1_000_000.0, LTT_PROVINCIAL);
        assert_eq!(toronto - elsewhere, 15_000.0);
    }

    #[test]
    fn rule_resolution_is_case_insensitive() {
        assert_eq!(ltt_rule_for_city("toronto"), LTT_TORONTO_DOUBLE);
        assert_eq!(ltt_rule_for_city("Ottawa"), LTT_PROVINCIAL);
    }
}
