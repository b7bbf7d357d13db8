use async_trait::async_trait;
use tracing::info;

use crate::errors::Result;
use crate::model::alert::Alert;
use crate::model::search::Channel;

/// Hands an alert to a delivery transport. Enqueueing is awaited; actual
/// delivery is the transport's problem and is retried off the alert's
/// per-channel state.
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    async fn enqueue(&self, alert: &Alert, channel: Channel) -> Result<()>;
}

/// Local sink standing in for the real transports: logs the dispatch and
/// succeeds. The devbrowser channel in development is exactly this.
pub struct LogDispatcher;

#[async_trait]
impl ChannelDispatcher for LogDispatcher {
    async fn enqueue(&self, alert: &Alert, channel: Channel) -> Result<()> {
        info!(
            alert = %alert.id,
            user = %alert.user_id,
            listing = %alert.listing_id,
            result = %alert.result_id,
            channel = channel.as_str(),
            "alert dispatched"
        );
        Ok(())
    }
}
