use std::sync::Arc;

use crate::config::Config;
use crate::store::Db;
use crate::underwrite::UnderwritingService;

use super::cache::ResponseCache;
use super::error::ApiError;
use super::rate_limit::RateLimiter;

/// The gateway's dependency set, taken by value at construction. The
/// gateway composes reads and forwards exact underwrites; no business
/// logic lives behind these handles.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cfg: Arc<Config>,
    pub underwriting: Arc<UnderwritingService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
}

impl AppState {
    pub fn new(db: Db, cfg: Arc<Config>, underwriting: Arc<UnderwritingService>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            cfg.rate_limit.window,
            cfg.rate_limit.max_requests,
        ));
        let cache = Arc::new(ResponseCache::new(cfg.response_cache_ttl));
        Self {
            db,
            cfg,
            underwriting,
            rate_limiter,
            cache,
        }
    }

    pub async fn check_rate_limit(&self, user_id: &str) -> Result<(), ApiError> {
        if !self.cfg.enable_rate_limit {
            return Ok(());
        }
        self.rate_limiter.check(user_id).await.map_err(|retry_after| {
            ApiError::RateLimited(format!("rate limited; retry in {retry_after}s"))
        })
    }
}
