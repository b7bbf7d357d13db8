use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::alerts::AlertsMatcherService;
use crate::alerts::dispatch::{ChannelDispatcher, LogDispatcher};
use crate::bus::{Bus, DebounceSpec, RetryPolicy, SubscriptionSpec};
use crate::config::Config;
use crate::enrich::{EnrichmentDeps, EnrichmentService, dirty_address_bypass};
use crate::events::topics;
use crate::ingest::Ingestor;
use crate::ingest::feed::FeedSource;
use crate::rent::RentEstimatorService;
use crate::rent::comps::{CompsSource, StaticComps};
use crate::store::Db;
use crate::underwrite::UnderwritingService;

/// Everything the pipeline needs from outside: the feed and the external
/// collaborators, all swappable (tests plug in mocks here).
pub struct PipelineDeps {
    pub feed: Option<Arc<dyn FeedSource>>,
    pub enrich: EnrichmentDeps,
    pub comps: Arc<dyn CompsSource>,
    pub dispatcher: Arc<dyn ChannelDispatcher>,
}

impl Default for PipelineDeps {
    fn default() -> Self {
        Self {
            feed: None,
            enrich: EnrichmentDeps::default(),
            comps: Arc::new(StaticComps::default()),
            dispatcher: Arc::new(LogDispatcher),
        }
    }
}

/// The assembled in-process deployment: one bus, one store, every service
/// subscribed under its own consumer group.
pub struct Pipeline {
    pub db: Db,
    pub bus: Bus,
    pub underwriting: Arc<UnderwritingService>,
    pub ingestor: Option<Arc<Ingestor>>,
    cfg: Arc<Config>,
    shutdown_tx: watch::Sender<bool>,
}

impl Pipeline {
    /// Wire stores + bus + services. Subscriptions are declared as data;
    /// the topology is a DAG on topics, not references between services.
    pub fn build(db: Db, cfg: Arc<Config>, deps: PipelineDeps) -> Self {
        let bus = Bus::new();
        let (shutdown_tx, _) = watch::channel(false);

        let retry = RetryPolicy {
            max_attempts: cfg.max_delivery_attempts,
            ..RetryPolicy::default()
        };

        let enrichment = Arc::new(EnrichmentService::new(db.clone(), bus.clone(), deps.enrich));
        bus.subscribe(
            SubscriptionSpec::new(topics::LISTING_CHANGED, "enrichment")
                .retry(retry)
                .debounce(DebounceSpec {
                    window: cfg.debounce.enrich_window,
                    bypass: Some(dirty_address_bypass),
                }),
            enrichment,
        );

        let rent = Arc::new(RentEstimatorService::new(
            db.clone(),
            bus.clone(),
            cfg.estimator.clone(),
            deps.comps,
        ));
        bus.subscribe(
            SubscriptionSpec::new(topics::LISTING_CHANGED, "rent-estimator")
                .retry(retry)
                .debounce(DebounceSpec {
                    window: cfg.debounce.rent_window,
                    bypass: Some(dirty_address_bypass),
                }),
            rent.clone(),
        );
        // Enrichment output always re-estimates; no debounce on this edge.
        bus.subscribe(
            SubscriptionSpec::new(topics::DATA_ENRICHED, "rent-estimator").retry(retry),
            rent,
        );

        let underwriting = Arc::new(UnderwritingService::new(
            db.clone(),
            bus.clone(),
            cfg.grid.clone(),
            cfg.compute_timeout,
        ));
        bus.subscribe(
            SubscriptionSpec::new(topics::UNDERWRITE_REQUESTED, "underwriting").retry(retry),
            underwriting.clone(),
        );
        bus.subscribe(
            SubscriptionSpec::new(topics::LISTING_CHANGED, "underwriting").retry(retry),
            underwriting.clone(),
        );

        let alerts = Arc::new(AlertsMatcherService::new(
            db.clone(),
            bus.clone(),
            deps.dispatcher,
        ));
        bus.subscribe(
            SubscriptionSpec::new(topics::UNDERWRITE_COMPLETED, "alerts").retry(retry),
            alerts,
        );

        let ingestor = deps
            .feed
            .map(|feed| Arc::new(Ingestor::new(db.clone(), bus.clone(), feed)));

        Self {
            db,
            bus,
            underwriting,
            ingestor,
            cfg,
            shutdown_tx,
        }
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Start the ingest poll loop (when a feed is configured).
    pub fn spawn_ingestor(&self) -> Option<tokio::task::JoinHandle<()>> {
        let ingestor = self.ingestor.clone()?;
        let interval = self.cfg.poll_interval;
        let shutdown = self.shutdown_receiver();
        Some(tokio::spawn(async move {
            ingestor.run(interval, shutdown).await;
        }))
    }

    /// Signal shutdown and drain the bus. Returns the process exit code:
    /// 0 on a clean drain, 2 when in-flight work had to be force-closed.
    pub async fn shutdown(&self) -> i32 {
        info!("pipeline shutting down");
        let _ = self.shutdown_tx.send(true);

        let clean = self.bus.shutdown(self.cfg.drain_timeout).await;
        let parked = self.bus.dead_letter_count();
        if parked > 0 {
            warn!(parked, "dead-letter channel is non-empty at shutdown");
        }
        if clean { 0 } else { 2 }
    }

    /// One ingest tick, wait for the event cascade to settle, then drain —
    /// the `--once` path. The drain closes the bus, so the pipeline is
    /// spent afterwards.
    pub async fn run_once(&self) -> Result<i32> {
        let Some(ingestor) = &self.ingestor else {
            anyhow::bail!("no feed configured; nothing to ingest");
        };
        ingestor.tick().await?;
        if !self.bus.wait_idle(self.cfg.drain_timeout).await {
            warn!("event cascade did not settle before the drain deadline");
        }
        Ok(self.shutdown().await)
    }
}
