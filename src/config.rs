use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Grid bin ranges. Values are rounded to stable keys at compute time
/// (4 decimals for down payment, integer bps).
#[derive(Debug, Clone)]
pub struct GridConfig {
    pub down_min: f64,
    pub down_max: f64,
    pub down_step: f64,
    pub rate_min_bps: u32,
    pub rate_max_bps: u32,
    pub rate_step_bps: u32,
    pub amorts: Vec<u32>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            down_min: 0.05,
            down_max: 0.35,
            down_step: 0.01,
            rate_min_bps: 300,
            rate_max_bps: 800,
            rate_step_bps: 5,
            amorts: vec![240, 300, 360],
        }
    }
}

/// Rent estimator tuning.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Relative p50 shift that counts as a material change.
    pub material_change_pct: f64,
    pub comps_min_count: usize,
    pub comps_radius_km: f64,
    pub comps_window_days: i64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            material_change_pct: 0.03,
            comps_min_count: 3,
            comps_radius_km: 2.0,
            comps_window_days: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub enrich_window: Duration,
    pub rent_window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            enrich_window: Duration::from_secs(60),
            rent_window: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 60,
        }
    }
}

/// Full runtime configuration, resolved from the environment with defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub http_addr: String,
    pub feed_url: Option<String>,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub compute_timeout: Duration,
    pub drain_timeout: Duration,
    pub max_delivery_attempts: u32,
    pub grid: GridConfig,
    pub estimator: EstimatorConfig,
    pub debounce: DebounceConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub response_cache_ttl: Duration,
    pub enable_auth: bool,
    pub enable_rate_limit: bool,
    pub enable_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("prop-flow.db"),
            http_addr: "127.0.0.1:8080".to_string(),
            feed_url: None,
            poll_interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(5),
            compute_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            max_delivery_attempts: 3,
            grid: GridConfig::default(),
            estimator: EstimatorConfig::default(),
            debounce: DebounceConfig::default(),
            auth: AuthConfig {
                secret: "dev-secret-change-me".to_string(),
                token_ttl_hours: 24,
            },
            rate_limit: RateLimitConfig::default(),
            response_cache_ttl: Duration::from_secs(15),
            enable_auth: false,
            enable_rate_limit: false,
            enable_cache: true,
        }
    }
}

impl Config {
    /// Resolve from `PF_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();

        if let Ok(path) = std::env::var("PF_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Ok(addr) = std::env::var("PF_HTTP_ADDR") {
            cfg.http_addr = addr;
        }
        if let Ok(url) = std::env::var("PF_FEED_URL") {
            cfg.feed_url = Some(url);
        }

        cfg.poll_interval = env_secs("PF_POLL_INTERVAL_SECS", cfg.poll_interval)?;
        cfg.http_timeout = env_secs("PF_HTTP_TIMEOUT_SECS", cfg.http_timeout)?;
        cfg.compute_timeout = env_secs("PF_COMPUTE_TIMEOUT_SECS", cfg.compute_timeout)?;
        cfg.drain_timeout = env_secs("PF_DRAIN_TIMEOUT_SECS", cfg.drain_timeout)?;
        cfg.max_delivery_attempts =
            env_parse("PF_MAX_DELIVERY_ATTEMPTS", cfg.max_delivery_attempts)?;

        cfg.grid.down_min = env_parse("PF_GRID_DOWN_MIN", cfg.grid.down_min)?;
        cfg.grid.down_max = env_parse("PF_GRID_DOWN_MAX", cfg.grid.down_max)?;
        cfg.grid.down_step = env_parse("PF_GRID_DOWN_STEP", cfg.grid.down_step)?;
        cfg.grid.rate_min_bps = env_parse("PF_GRID_RATE_MIN_BPS", cfg.grid.rate_min_bps)?;
        cfg.grid.rate_max_bps = env_parse("PF_GRID_RATE_MAX_BPS", cfg.grid.rate_max_bps)?;
        cfg.grid.rate_step_bps = env_parse("PF_GRID_RATE_STEP_BPS", cfg.grid.rate_step_bps)?;
        if let Ok(raw) = std::env::var("PF_GRID_AMORTS") {
            cfg.grid.amorts = raw
                .split(',')
                .map(|s| s.trim().parse::<u32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("parsing PF_GRID_AMORTS '{raw}'"))?;
            if cfg.grid.amorts.is_empty() {
                bail!("PF_GRID_AMORTS must name at least one amortization");
            }
        }
        if cfg.grid.down_step <= 0.0 || cfg.grid.down_min > cfg.grid.down_max {
            bail!("grid down-payment range is inverted or has a non-positive step");
        }
        if cfg.grid.rate_step_bps == 0 || cfg.grid.rate_min_bps > cfg.grid.rate_max_bps {
            bail!("grid rate range is inverted or has a zero step");
        }

        cfg.estimator.material_change_pct =
            env_parse("PF_MATERIAL_CHANGE_PCT", cfg.estimator.material_change_pct)?;
        cfg.estimator.comps_min_count =
            env_parse("PF_COMPS_MIN_COUNT", cfg.estimator.comps_min_count)?;
        cfg.estimator.comps_radius_km =
            env_parse("PF_COMPS_RADIUS_KM", cfg.estimator.comps_radius_km)?;
        cfg.estimator.comps_window_days =
            env_parse("PF_COMPS_WINDOW_DAYS", cfg.estimator.comps_window_days)?;

        cfg.debounce.enrich_window = env_secs("PF_DEBOUNCE_ENRICH_SECS", cfg.debounce.enrich_window)?;
        cfg.debounce.rent_window = env_secs("PF_DEBOUNCE_RENT_SECS", cfg.debounce.rent_window)?;

        if let Ok(secret) = std::env::var("PF_AUTH_SECRET") {
            cfg.auth.secret = secret;
        }
        cfg.auth.token_ttl_hours = env_parse("PF_TOKEN_TTL_HOURS", cfg.auth.token_ttl_hours)?;

        cfg.rate_limit.window = env_secs("PF_RATE_LIMIT_WINDOW_SECS", cfg.rate_limit.window)?;
        cfg.rate_limit.max_requests =
            env_parse("PF_RATE_LIMIT_MAX", cfg.rate_limit.max_requests)?;
        cfg.response_cache_ttl = env_secs("PF_CACHE_TTL_SECS", cfg.response_cache_ttl)?;

        cfg.enable_auth = env_flag("PF_ENABLE_AUTH", cfg.enable_auth)?;
        cfg.enable_rate_limit = env_flag("PF_ENABLE_RATE_LIMIT", cfg.enable_rate_limit)?;
        cfg.enable_cache = env_flag("PF_ENABLE_CACHE", cfg.enable_cache)?;

        Ok(cfg)
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("parsing {key}='{raw}': {e}")),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_secs(env_parse(
        key,
        default.as_secs(),
    )?))
}

fn env_flag(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("parsing {key}='{other}': expected a boolean"),
        },
        Err(_) => Ok(default),
    }
}
