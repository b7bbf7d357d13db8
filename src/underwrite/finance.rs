use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::assumptions::Assumptions;
use crate::model::metrics::{BaseInputs, Metrics};

/// Monthly payment per unit loan for a fixed-rate fully amortizing mortgage.
///
/// r = rateBps/10000/12; r = 0 degenerates to straight-line 1/n.
pub fn annuity_factor(rate_bps: u32, amort_months: u32) -> f64 {
    let n = amort_months as f64;
    let r = rate_bps as f64 / 10_000.0 / 12.0;
    if r == 0.0 {
        return 1.0 / n;
    }
    let growth = (1.0 + r).powf(n);
    r * growth / (growth - 1.0)
}

/// Process-local (rateBps, amortMonths) → AF map. Read-heavy: the grid
/// pre-fetches its unique pairs once, then every bin hits the fast path.
#[derive(Default)]
pub struct AnnuityFactorCache {
    factors: RwLock<HashMap<(u32, u32), f64>>,
}

impl AnnuityFactorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factor(&self, rate_bps: u32, amort_months: u32) -> f64 {
        if let Some(af) = self.factors.read().unwrap().get(&(rate_bps, amort_months)) {
            return *af;
        }
        let af = annuity_factor(rate_bps, amort_months);
        self.factors
            .write()
            .unwrap()
            .insert((rate_bps, amort_months), af);
        af
    }

    /// Fill the cache for a set of pairs in one write-lock pass.
    pub fn prefetch<I: IntoIterator<Item = (u32, u32)>>(&self, pairs: I) {
        let mut map = self.factors.write().unwrap();
        for (rate_bps, amort_months) in pairs {
            map.entry((rate_bps, amort_months))
                .or_insert_with(|| annuity_factor(rate_bps, amort_months));
        }
    }

    pub fn len(&self) -> usize {
        self.factors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.read().unwrap().is_empty()
    }
}

/// The metrics kernel: pure, CPU-bound, no suspension.
pub fn compute_metrics(base: &BaseInputs, assumptions: &Assumptions, af: f64) -> Metrics {
    let mut noi = base.noi_for(assumptions.rent_scenario);
    if let Some(mgmt) = assumptions.mgmt_pct {
        noi *= 1.0 - mgmt;
    }
    if let Some(reserves) = assumptions.reserves_monthly {
        noi -= reserves * 12.0;
    }

    let price = base.price;
    let loan = price * (1.0 - assumptions.down_pct);
    let down_payment = price - loan;
    let cash_invested = down_payment + base.closing_costs;

    let monthly_ds = loan * af;
    let ds_annual = monthly_ds * 12.0;

    let cap_rate_pct = noi / price * 100.0;
    let cash_flow_annual = noi - ds_annual;
    let dscr = if ds_annual > 0.0 { noi / ds_annual } else { 0.0 };
    let cash_on_cash_pct = if cash_invested > 0.0 {
        cash_flow_annual / cash_invested * 100.0
    } else {
        0.0
    };
    let breakeven_occ_pct = if noi > 0.0 {
        (ds_annual / noi * 100.0).min(100.0)
    } else {
        100.0
    };

    Metrics {
        price,
        noi,
        cap_rate_pct,
        loan,
        ds_annual,
        cash_flow_annual,
        dscr,
        cash_on_cash_pct,
        breakeven_occ_pct,
        irr_pct: None,
        inputs: assumptions.clone(),
    }
}
