use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bus::{publish_json, EventBus};
use crate::error::{MonitorError, Result};
use crate::listeners::ChangeListener;
use crate::recentchanges::{ListenOptions, SourceEvent};

use super::forward_topic;

const FORWARD_BUFFER: usize = 256;

/// Run `listener` and publish each admitted event, unmodified, on its
/// source's forward topic.
///
/// Returns when the listener stops, with the listener's own result.
pub async fn forward(
    listener: Arc<dyn ChangeListener>,
    options: ListenOptions,
    bus: Arc<dyn EventBus>,
) -> Result<()> {
    let source = listener.source();
    let (tx, mut rx) = mpsc::channel::<SourceEvent>(FORWARD_BUFFER);

    info!(source = %source, wikis = ?options.wikis, "Starting forwarder");
    let listen = tokio::spawn(async move { listener.listen(&options, tx).await });

    while let Some(event) = rx.recv().await {
        let topic = forward_topic(event.source());
        let published = match &event {
            SourceEvent::Sse(rc) => {
                debug!(title = %rc.title, "Publishing recent change");
                publish_json(bus.as_ref(), topic, rc).await
            }
            SourceEvent::Irc(rc) => {
                debug!(title = %rc.page, "Publishing recent change");
                publish_json(bus.as_ref(), topic, rc).await
            }
        };
        if let Err(e) = published {
            error!(topic, error = %e, "Could not publish recent change");
        }
    }

    match listen.await {
        Ok(result) => result,
        Err(e) => Err(MonitorError::Connection {
            message: format!("{} listener task failed: {}", source, e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::constants::{IRC_FORWARD_TOPIC, SSE_FORWARD_TOPIC};
    use crate::recentchanges::irc::parse_line;
    use crate::recentchanges::{IrcChangeEvent, Source};
    use async_trait::async_trait;

    /// Emits a fixed set of events then stops.
    struct ScriptedListener {
        events: Vec<SourceEvent>,
    }

    #[async_trait]
    impl ChangeListener for ScriptedListener {
        fn source(&self) -> Source {
            Source::Irc
        }

        async fn listen(
            &self,
            _options: &ListenOptions,
            events: mpsc::Sender<SourceEvent>,
        ) -> Result<()> {
            for event in &self.events {
                let _ = events.send(event.clone()).await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_events_land_on_source_topic() {
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::default());
        let mut irc = bus.subscribe(IRC_FORWARD_TOPIC).await.unwrap();
        let mut sse = bus.subscribe(SSE_FORWARD_TOPIC).await.unwrap();

        let rc = parse_line(
            ":rc!~rc@localhost PRIVMSG #en.wikipedia :[[Foo]] M https://en.wikipedia.org/w/index.php?diff=2&oldid=1 * Bob * (+1) typo",
        )
        .unwrap();
        let listener = Arc::new(ScriptedListener {
            events: vec![SourceEvent::Irc(rc.clone())],
        });

        forward(listener, ListenOptions::default(), bus.clone())
            .await
            .unwrap();

        let payload = irc.recv().await.unwrap();
        let forwarded: IrcChangeEvent = serde_json::from_slice(&payload).unwrap();
        assert_eq!(forwarded, rc);

        // nothing crosses over to the other source's topic
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), sse.recv())
                .await
                .is_err()
        );
    }
}
