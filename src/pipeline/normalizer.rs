use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{publish_json, EventBus, Subscription};
use crate::constants::NORMALIZED_TOPIC;
use crate::error::Result;
use crate::metrics::IngestMetrics;
use crate::recentchanges::{
    IrcChangeEvent, Normalize, NormalizedChangeEvent, Source, SourceEvent, SseChangeEvent,
};

use super::forward_topic;

/// Decode a forwarded payload into its source's event type.
pub fn decode(source: Source, payload: &[u8]) -> serde_json::Result<SourceEvent> {
    Ok(match source {
        Source::Sse => SourceEvent::Sse(serde_json::from_slice::<SseChangeEvent>(payload)?),
        Source::Irc => SourceEvent::Irc(serde_json::from_slice::<IrcChangeEvent>(payload)?),
    })
}

/// Map one source event onto the canonical shape.
///
/// Stream entries other than edits and page creations are skipped quietly;
/// anything that fails to normalize is logged and dropped.
pub fn normalize_event(event: &SourceEvent) -> Option<NormalizedChangeEvent> {
    if let SourceEvent::Sse(rc) = event {
        if !rc.is_normalizable() {
            debug!(kind = ?rc.change_type, title = %rc.title, "Skipping non-edit change");
            return None;
        }
    }

    match event.normalize() {
        Ok(normalized) => {
            IngestMetrics::record_normalized(event.source());
            Some(normalized)
        }
        Err(e) => {
            IngestMetrics::record_normalize_error(event.source());
            error!(source = %event.source(), data = ?event, error = %e, "Could not normalize");
            None
        }
    }
}

/// Subscribe to both forward topics and publish normalized events.
pub async fn spawn_normalizer(bus: Arc<dyn EventBus>) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();
    for source in [Source::Sse, Source::Irc] {
        let subscription = bus.subscribe_bounded(forward_topic(source)).await?;
        handles.push(tokio::spawn(run(source, subscription, bus.clone())));
    }
    Ok(handles)
}

async fn run(source: Source, mut subscription: Subscription, bus: Arc<dyn EventBus>) {
    while let Some(payload) = subscription.recv().await {
        let event = match decode(source, &payload) {
            Ok(event) => event,
            Err(e) => {
                IngestMetrics::record_decode_error(source);
                warn!(topic = subscription.topic(), error = %e, "Could not unmarshal");
                continue;
            }
        };

        let Some(normalized) = normalize_event(&event) else {
            continue;
        };

        info!(
            source = %source,
            wiki = %normalized.wiki,
            title = %normalized.title,
            revision = ?normalized.revision.new,
            "Normalized recent change"
        );
        if let Err(e) = publish_json(bus.as_ref(), NORMALIZED_TOPIC, &normalized).await {
            error!(error = %e, "Could not publish normalized change");
        }
    }
    info!(source = %source, "Forward topic closed, normalizer exiting");
}
