//! Publish/subscribe glue between pipeline stages.
//!
//! Stages exchange JSON-encoded payloads over named topics. [`InMemoryBus`]
//! fans each topic out two ways. Plain subscribers share a
//! `tokio::sync::broadcast` channel: they only see messages published after
//! they subscribed, and one that falls more than the channel capacity behind
//! skips the oldest messages. Bounded subscribers each get their own
//! `tokio::sync::mpsc` queue and publishers wait while any of those queues is
//! full, so a stalled stage holds back everything upstream of it.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::BusError;

/// Default per-topic buffer
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Transport used to hand payloads between stages
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError>;

    /// Lossy subscription: lagging skips messages.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;

    /// Lossless subscription: publishing on `topic` waits while this
    /// subscriber's queue is full.
    async fn subscribe_bounded(&self, topic: &str) -> Result<Subscription, BusError>;
}

/// Encode `value` as JSON and publish it on `topic`.
pub async fn publish_json<T: Serialize + ?Sized>(
    bus: &dyn EventBus,
    topic: &str,
    value: &T,
) -> Result<(), BusError> {
    let payload = serde_json::to_vec(value).map_err(|source| BusError::Encode {
        topic: topic.to_string(),
        source,
    })?;
    bus.publish(topic, Bytes::from(payload)).await
}

enum Receiver {
    Broadcast(broadcast::Receiver<Bytes>),
    Bounded(mpsc::Receiver<Bytes>),
}

/// Receiving end of a topic
pub struct Subscription {
    topic: String,
    rx: Receiver,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next payload, or `None` once the topic has been dropped.
    ///
    /// Lagging is logged and skipped over rather than surfaced.
    pub async fn recv(&mut self) -> Option<Bytes> {
        let rx = match &mut self.rx {
            Receiver::Bounded(rx) => return rx.recv().await,
            Receiver::Broadcast(rx) => rx,
        };
        loop {
            match rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    let err = BusError::Lagged {
                        topic: self.topic.clone(),
                        skipped,
                    };
                    warn!(error = %err, "Subscriber fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

struct Topic {
    broadcast: broadcast::Sender<Bytes>,
    bounded: Vec<mpsc::Sender<Bytes>>,
}

/// In-process bus: per topic, one broadcast channel plus one queue per
/// bounded subscriber. Both are sized by `capacity`.
#[derive(Clone)]
pub struct InMemoryBus {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
    capacity: usize,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn with_topic<T>(&self, topic: &str, f: impl FnOnce(&mut Topic) -> T) -> Result<T, BusError> {
        let mut topics = self
            .topics
            .lock()
            .map_err(|_| BusError::Closed(topic.to_string()))?;
        let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
            broadcast: broadcast::channel(self.capacity).0,
            bounded: Vec::new(),
        });
        Ok(f(entry))
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        let (fan_out, bounded) = self.with_topic(topic, |t| {
            t.bounded.retain(|tx| !tx.is_closed());
            (t.broadcast.clone(), t.bounded.clone())
        })?;

        // No subscribers is not an error: the message is simply dropped
        if fan_out.send(payload.clone()).is_err() && bounded.is_empty() {
            debug!(topic, "Published with no subscribers");
        }
        for tx in bounded {
            // a subscriber dropped mid-send is pruned on the next publish
            let _ = tx.send(payload.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let rx = self.with_topic(topic, |t| t.broadcast.subscribe())?;
        Ok(Subscription {
            topic: topic.to_string(),
            rx: Receiver::Broadcast(rx),
        })
    }

    async fn subscribe_bounded(&self, topic: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.with_topic(topic, |t| t.bounded.push(tx))?;
        Ok(Subscription {
            topic: topic.to_string(),
            rx: Receiver::Bounded(rx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = InMemoryBus::default();
        let mut a = bus.subscribe("t").await.unwrap();
        let mut b = bus.subscribe("t").await.unwrap();

        bus.publish("t", Bytes::from_static(b"one")).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(a.topic(), "t");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryBus::default();
        let mut other = bus.subscribe("other").await.unwrap();
        bus.publish("t", Bytes::from_static(b"x")).await.unwrap();
        bus.publish("other", Bytes::from_static(b"y")).await.unwrap();
        assert_eq!(other.recv().await.unwrap(), Bytes::from_static(b"y"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InMemoryBus::default();
        assert!(bus.publish("nobody", Bytes::from_static(b"x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_oldest() {
        let bus = InMemoryBus::new(2);
        let mut sub = bus.subscribe("t").await.unwrap();
        for i in 0..4u8 {
            bus.publish("t", Bytes::from(vec![i])).await.unwrap();
        }
        assert_eq!(sub.recv().await.unwrap(), Bytes::from(vec![2u8]));
        assert_eq!(sub.recv().await.unwrap(), Bytes::from(vec![3u8]));
    }

    #[tokio::test]
    async fn test_bounded_subscriber_holds_back_publisher() {
        let bus = InMemoryBus::new(2);
        let mut sub = bus.subscribe_bounded("t").await.unwrap();
        bus.publish("t", Bytes::from(vec![0u8])).await.unwrap();
        bus.publish("t", Bytes::from(vec![1u8])).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            bus.publish("t", Bytes::from(vec![2u8])),
        )
        .await;
        assert!(blocked.is_err());

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 2..6u8 {
                    bus.publish("t", Bytes::from(vec![i])).await.unwrap();
                }
            })
        };
        for i in 0..6u8 {
            assert_eq!(sub.recv().await.unwrap(), Bytes::from(vec![i]));
        }
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_bounded_subscriber_does_not_block() {
        let bus = InMemoryBus::new(1);
        let sub = bus.subscribe_bounded("t").await.unwrap();
        drop(sub);
        for i in 0..3u8 {
            bus.publish("t", Bytes::from(vec![i])).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_publish_json() {
        let bus = InMemoryBus::default();
        let mut sub = bus.subscribe("t").await.unwrap();
        publish_json(&bus, "t", &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(sub.recv().await.unwrap(), Bytes::from_static(br#"{"a":1}"#));
    }
}
