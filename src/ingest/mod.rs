pub mod feed;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bus::Bus;
use crate::errors::Result;
use crate::events::EventPayload;
use crate::model::listing::{ChangeKind, DirtyField, change_kind};
use crate::store::{self, Db, listings::UpsertOutcome};

use feed::FeedSource;

/// Dirty set attached to `create` events: everything is new.
const ALL_DIRTY: [DirtyField; 6] = [
    DirtyField::Price,
    DirtyField::Status,
    DirtyField::Fees,
    DirtyField::Tax,
    DirtyField::Media,
    DirtyField::Address,
];

#[derive(Debug, Default, Clone, Copy)]
pub struct TickStats {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

/// Polls the upstream feed from a stored watermark, diff-upserts, and emits
/// `listing_changed` for real changes only.
pub struct Ingestor {
    db: Db,
    bus: Bus,
    feed: Arc<dyn FeedSource>,
}

impl Ingestor {
    pub fn new(db: Db, bus: Bus, feed: Arc<dyn FeedSource>) -> Self {
        Self { db, bus, feed }
    }

    /// One poll cycle: page until exhaustion, then advance the watermark to
    /// the max `updatedAt` seen. The watermark only moves after the full
    /// page set succeeds, so a mid-cycle failure re-reads pages that
    /// diff-and-bump then absorbs.
    pub async fn tick(&self) -> Result<TickStats> {
        let source = self.feed.name().to_string();
        let watermark = store::watermark::get(&self.db, &source).await?;

        let mut stats = TickStats::default();
        let mut max_seen: Option<DateTime<Utc>> = None;
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .feed
                .fetch_updated_since(watermark, page_token.clone())
                .await?;

            stats.fetched += page.items.len();
            for item in &page.items {
                let listing = match feed::normalize(item, &source) {
                    Ok(listing) => listing,
                    Err(err) => {
                        warn!(item = %item.id, error = %err, "feed item rejected");
                        stats.rejected += 1;
                        continue;
                    }
                };

                if max_seen.is_none_or(|m| listing.updated_at > m) {
                    max_seen = Some(listing.updated_at);
                }

                match store::listings::upsert(&self.db, &listing).await? {
                    UpsertOutcome::Created { .. } => {
                        stats.created += 1;
                        self.bus.publish(EventPayload::ListingChanged {
                            id: listing.id.clone(),
                            updated_at: listing.updated_at,
                            change: ChangeKind::Create,
                            source: source.clone(),
                            dirty: ALL_DIRTY.to_vec(),
                        });
                    }
                    UpsertOutcome::Updated { dirty, .. } => {
                        stats.updated += 1;
                        self.bus.publish(EventPayload::ListingChanged {
                            id: listing.id.clone(),
                            updated_at: listing.updated_at,
                            change: change_kind(&dirty),
                            source: source.clone(),
                            dirty,
                        });
                    }
                    UpsertOutcome::Unchanged => {
                        stats.unchanged += 1;
                    }
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if let Some(mark) = max_seen {
            if watermark.is_none_or(|w| mark > w) {
                store::watermark::set(&self.db, &source, mark).await?;
            }
        }

        info!(
            source = %source,
            fetched = stats.fetched,
            created = stats.created,
            updated = stats.updated,
            unchanged = stats.unchanged,
            rejected = stats.rejected,
            "ingest tick complete"
        );
        Ok(stats)
    }

    /// Poll forever with exponential backoff on fetch failures, until the
    /// shutdown signal fires.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut backoff = interval;
        loop {
            match self.tick().await {
                Ok(_) => backoff = interval,
                Err(err) => {
                    warn!(error = %err, backoff_secs = backoff.as_secs(), "ingest tick failed");
                    backoff = (backoff * 2).min(Duration::from_secs(900));
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => {
                    info!("ingestor stopping");
                    return;
                }
            }
        }
    }
}
