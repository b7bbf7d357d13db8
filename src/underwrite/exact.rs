use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::errors::{PipelineError, Result};
use crate::model::assumptions::Assumptions;
use crate::model::metrics::{BaseInputs, Metrics};
use crate::store::{self, Db};

use super::finance::AnnuityFactorCache;

/// Content address of an assumptions object: SHA-1 over the canonical JSON
/// form (keys sorted, unset optionals omitted). Identical assumptions in any
/// key order hash identically.
pub fn assumptions_hash(assumptions: &Assumptions) -> String {
    let canonical = assumptions.canonical_json();
    let digest = Sha1::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(40);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactOutcome {
    pub result_id: String,
    pub metrics: Metrics,
    pub from_cache: bool,
}

/// Exact-assumptions underwrite with a content-addressed cache.
///
/// Hit: the stored row for (listing, version, hash) is returned as-is.
/// Miss: compute, insert idempotently, and on a lost race adopt the
/// surviving row's id.
pub async fn compute_exact(
    db: &Db,
    af_cache: &AnnuityFactorCache,
    base: &BaseInputs,
    assumptions: &Assumptions,
) -> Result<ExactOutcome> {
    assumptions
        .validate()
        .map_err(|errors| PipelineError::InvalidInput(errors.join("; ")))?;

    let hash = assumptions_hash(assumptions);

    if let Some(hit) =
        store::underwriting::get_exact(db, &base.listing_id, base.listing_version, &hash).await?
    {
        return Ok(ExactOutcome {
            result_id: hit.result_id,
            metrics: hit.metrics,
            from_cache: true,
        });
    }

    let af = af_cache.factor(assumptions.rate_bps, assumptions.amort_months);
    let metrics = super::finance::compute_metrics(base, assumptions, af);

    let (result_id, _inserted) = store::underwriting::insert_exact(
        db,
        &base.listing_id,
        base.listing_version,
        &hash,
        &metrics,
    )
    .await?;

    Ok(ExactOutcome {
        result_id,
        metrics,
        from_cache: false,
    })
}
