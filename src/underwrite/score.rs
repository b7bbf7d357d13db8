use crate::model::metrics::Metrics;

/// Deterministic investability score in [0, 100] with bounded per-factor
/// contributions: cap rate up to 30 (linear to 8 %), cash-on-cash up to 30
/// (linear to 10 %), DSCR up to 25 (linear from 1.0 to 1.5), and a flat 15
/// for non-negative cash flow.
pub fn score(metrics: &Metrics) -> f64 {
    let cap = (metrics.cap_rate_pct / 8.0 * 30.0).clamp(0.0, 30.0);
    let coc = (metrics.cash_on_cash_pct / 10.0 * 30.0).clamp(0.0, 30.0);
    let dscr = ((metrics.dscr - 1.0) / 0.5 * 25.0).clamp(0.0, 25.0);
    let cf = if metrics.cash_flow_annual >= 0.0 { 15.0 } else { 0.0 };
    (cap + coc + dscr + cf).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::assumptions::{Assumptions, RentScenario};

    fn metrics(cap: f64, coc: f64, dscr: f64, cf: f64) -> Metrics {
        Metrics {
            price: 1_000_000.0,
            noi: 50_000.0,
            cap_rate_pct: cap,
            loan: 800_000.0,
            ds_annual: 40_000.0,
            cash_flow_annual: cf,
            dscr,
            cash_on_cash_pct: coc,
            breakeven_occ_pct: 80.0,
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
    fn strong_deal_scores_high() {
        let s = score(&metrics(8.0, 10.0, 1.5, 10_000.0));
        assert_eq!(s, 100.0);
    }

    #[test]
    fn negative_cash_flow_loses_the_flat_contribution() {
        let positive = score(&metrics(5.0, 6.0, 1.2, 1_000.0));
        let negative = score(&metrics(5.0, 6.0, 1.2, -1_000.0));
        assert_eq!(positive - negative, 15.0);
    }

    #[test]
    fn contributions_are_bounded() {
        let s = score(&metrics(50.0, 80.0, 9.0, 1.0));
        assert_eq!(s, 100.0);
        let s = score(&metrics(-3.0, -5.0, 0.2, -1.0));
        assert_eq!(s, 0.0);
    }

    #[test]
    fn deterministic() {
        let m = metrics(6.2, 7.7, 1.31, 2_800.0);
        assert_eq!(score(&m), score(&m));
    }
}
