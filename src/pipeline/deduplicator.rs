use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{EventBus, Subscription};
use crate::constants::{DEDUPLICATED_TOPIC, NORMALIZED_TOPIC};
use crate::dedup::DedupStore;
use crate::error::Result;
use crate::metrics::DedupMetrics;
use crate::recentchanges::NormalizedChangeEvent;

/// Subscribe to normalized events and forward only first sightings.
///
/// Forwarded payloads are the bytes that arrived, so downstream sees exactly
/// what the normalizer published.
pub async fn spawn_deduplicator(
    bus: Arc<dyn EventBus>,
    store: DedupStore,
) -> Result<JoinHandle<()>> {
    let subscription = bus.subscribe_bounded(NORMALIZED_TOPIC).await?;
    Ok(tokio::spawn(run(subscription, bus, store)))
}

async fn run(mut subscription: Subscription, bus: Arc<dyn EventBus>, store: DedupStore) {
    while let Some(payload) = subscription.recv().await {
        let rc: NormalizedChangeEvent = match serde_json::from_slice(&payload) {
            Ok(rc) => rc,
            Err(e) => {
                warn!(topic = subscription.topic(), error = %e, "Could not unmarshal");
                continue;
            }
        };

        let key = rc.dedup_key();
        if store.check_and_store(&key) {
            DedupMetrics::record_duplicate();
            info!(key = %key, "Discarding duplicate");
            continue;
        }

        DedupMetrics::record_forwarded();
        info!(key = %key, source = %rc.source, title = %rc.title, "Deduplicated change");
        if let Err(e) = bus.publish(DEDUPLICATED_TOPIC, payload).await {
            error!(error = %e, "Could not publish deduplicated change");
        }
    }
    info!("Normalized topic closed, deduplicator exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{publish_json, InMemoryBus};
    use crate::recentchanges::{ChangeKind, Revision, Source};
    use std::time::Duration;

    fn edit(id: Option<i64>, new: i64, source: Source) -> NormalizedChangeEvent {
        NormalizedChangeEvent {
            id,
            kind: ChangeKind::Edit,
            title: "T".to_string(),
            comment: String::new(),
            user: "U".to_string(),
            bot: false,
            wiki: "en".to_string(),
            minor: false,
            revision: Revision {
                new: Some(new),
                old: Some(new - 1),
            },
            source,
        }
    }

    #[tokio::test]
    async fn test_second_sighting_is_dropped() {
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::default());
        let mut out = bus.subscribe(DEDUPLICATED_TOPIC).await.unwrap();
        let store = DedupStore::new(Duration::from_secs(600));
        let _handle = spawn_deduplicator(bus.clone(), store.clone()).await.unwrap();

        let first = edit(None, 900, Source::Sse);
        publish_json(bus.as_ref(), NORMALIZED_TOPIC, &first).await.unwrap();
        publish_json(bus.as_ref(), NORMALIZED_TOPIC, &edit(None, 900, Source::Irc))
            .await
            .unwrap();
        publish_json(bus.as_ref(), NORMALIZED_TOPIC, &edit(None, 901, Source::Irc))
            .await
            .unwrap();

        let a: NormalizedChangeEvent =
            serde_json::from_slice(&out.recv().await.unwrap()).unwrap();
        let b: NormalizedChangeEvent =
            serde_json::from_slice(&out.recv().await.unwrap()).unwrap();
        assert_eq!(a, first);
        assert_eq!(b.revision.new, Some(901));

        assert!(tokio::time::timeout(Duration::from_millis(50), out.recv())
            .await
            .is_err());
        assert_eq!(store.len(), 2);
    }
}
