//! Bus-connected stages between the listeners and the monitor:
//! forward raw source events, normalize them, then drop duplicates.

pub mod deduplicator;
pub mod forwarder;
pub mod normalizer;

pub use deduplicator::spawn_deduplicator;
pub use forwarder::forward;
pub use normalizer::spawn_normalizer;

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::constants::{IRC_FORWARD_TOPIC, SSE_FORWARD_TOPIC};
use crate::dedup::DedupStore;
use crate::error::Result;
use crate::recentchanges::Source;

/// Topic carrying a source's raw events
pub fn forward_topic(source: Source) -> &'static str {
    match source {
        Source::Sse => SSE_FORWARD_TOPIC,
        Source::Irc => IRC_FORWARD_TOPIC,
    }
}

/// Start the normalizer and deduplicator stages on `bus`.
///
/// Every subscription is in place when this returns, so nothing published
/// afterwards is missed.
pub async fn spawn_stages(
    bus: Arc<dyn EventBus>,
    store: DedupStore,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = spawn_normalizer(bus.clone()).await?;
    handles.push(spawn_deduplicator(bus, store).await?);
    Ok(handles)
}
