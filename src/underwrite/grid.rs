use std::collections::HashSet;

use rayon::prelude::*;
use tracing::warn;

use crate::config::GridConfig;
use crate::model::assumptions::{Assumptions, RentScenario};
use crate::model::metrics::{BaseInputs, GridRow};

use super::finance::AnnuityFactorCache;

/// One point in the binned assumption space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBin {
    pub down_pct: f64,
    pub rate_bps: u32,
    pub amort_months: u32,
    pub scenario: RentScenario,
}

/// Enumerate the cartesian product of the configured axes. Down-payment bins
/// are rounded to 4 decimals and rates stay integer bps so keys are stable
/// across runs regardless of float stepping.
pub fn enumerate_bins(cfg: &GridConfig) -> Vec<GridBin> {
    let down_steps = ((cfg.down_max - cfg.down_min) / cfg.down_step).round() as i64;
    let downs: Vec<f64> = (0..=down_steps)
        .map(|i| round4(cfg.down_min + i as f64 * cfg.down_step))
        .filter(|d| *d <= cfg.down_max + 1e-9)
        .collect();

    let rates: Vec<u32> = (cfg.rate_min_bps..=cfg.rate_max_bps)
        .step_by(cfg.rate_step_bps as usize)
        .collect();

    let mut bins =
        Vec::with_capacity(downs.len() * rates.len() * cfg.amorts.len() * RentScenario::ALL.len());
    for scenario in RentScenario::ALL {
        for &amort_months in &cfg.amorts {
            for &rate_bps in &rates {
                for &down_pct in &downs {
                    bins.push(GridBin {
                        down_pct,
                        rate_bps,
                        amort_months,
                        scenario,
                    });
                }
            }
        }
    }
    bins
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn bin_assumptions(bin: &GridBin) -> Assumptions {
    Assumptions {
        down_pct: bin.down_pct,
        rate_bps: bin.rate_bps,
        amort_months: bin.amort_months,
        rent_scenario: bin.scenario,
        mgmt_pct: None,
        reserves_monthly: None,
        exit_cap_pct: None,
        growth_rent_pct: None,
        growth_expense_pct: None,
        hold_years: None,
    }
}

/// Vectorized grid computation: pre-fetch the unique (rate, amort) annuity
/// factors in one pass, then fan the bins across the rayon pool. Bins whose
/// synthetic assumptions fail validation (a misconfigured axis range) are
/// logged and skipped; the rest of the grid proceeds.
pub fn compute_grid(
    base: &BaseInputs,
    cfg: &GridConfig,
    af_cache: &AnnuityFactorCache,
) -> Vec<GridRow> {
    let bins = enumerate_bins(cfg);

    let unique_pairs: HashSet<(u32, u32)> =
        bins.iter().map(|b| (b.rate_bps, b.amort_months)).collect();
    af_cache.prefetch(unique_pairs);

    bins.par_iter()
        .filter_map(|bin| {
            let assumptions = bin_assumptions(bin);
            if let Err(errors) = assumptions.validate() {
                warn!(
                    listing = %base.listing_id,
                    down = bin.down_pct,
                    rate_bps = bin.rate_bps,
                    amort = bin.amort_months,
                    errors = ?errors,
                    "grid bin outside assumption ranges, skipped"
                );
                return None;
            }
            let af = af_cache.factor(bin.rate_bps, bin.amort_months);
            let metrics = super::finance::compute_metrics(base, &assumptions, af);
            Some(GridRow {
                listing_id: base.listing_id.clone(),
                listing_version: base.listing_version,
                rent_scenario: bin.scenario,
                down_pct_bin: bin.down_pct,
                rate_bps_bin: bin.rate_bps,
                amort_months: bin.amort_months,
                metrics,
            })
        })
        .collect()
}
