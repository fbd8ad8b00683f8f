//! Final pipeline stage: turns deduplicated changes into archived diffs.

pub mod archiver;

pub use archiver::{Archiver, FileArchiver};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Subscription};
use crate::constants::{DEDUPLICATED_TOPIC, SSE_FORWARD_TOPIC};
use crate::diffs::{parse_compare, DiffQueue};
use crate::error::{DiffError, Result};
use crate::metrics::DiffMetrics;
use crate::recentchanges::{NormalizedChangeEvent, SseChangeEvent};

pub struct Monitor {
    queue: Arc<DiffQueue>,
    archiver: Arc<dyn Archiver>,
}

impl Monitor {
    pub fn new(queue: Arc<DiffQueue>, archiver: Arc<dyn Archiver>) -> Self {
        Self { queue, archiver }
    }

    /// Queue a diff fetch for `rc` when it is an edit with a known revision.
    ///
    /// Returns whether a job was queued.
    pub async fn handle_change(
        &self,
        rc: &NormalizedChangeEvent,
    ) -> std::result::Result<bool, DiffError> {
        let Some(revision) = rc.fetchable_revision() else {
            debug!(
                title = %rc.title,
                kind = ?rc.kind,
                "Recent change has no fetchable revision, discarding"
            );
            return Ok(false);
        };

        let archiver = self.archiver.clone();
        self.queue
            .enqueue(revision, move |result| {
                handle_fetch_response(archiver.as_ref(), revision, result)
            })
            .await?;
        Ok(true)
    }

    /// Subscribe to the deduplicated and raw SSE topics and process them
    /// until the bus closes.
    ///
    /// The deduplicated feed is a bounded subscription: while the fetch queue
    /// is full, publishers upstream wait instead of changes being skipped.
    pub async fn spawn(self, bus: Arc<dyn EventBus>) -> Result<Vec<JoinHandle<()>>> {
        let changes = bus.subscribe_bounded(DEDUPLICATED_TOPIC).await?;
        let raw = bus.subscribe(SSE_FORWARD_TOPIC).await?;

        let changes_task = tokio::spawn(self.run(changes));
        let deletes_task = tokio::spawn(watch_deletes(raw));
        Ok(vec![changes_task, deletes_task])
    }

    async fn run(self, mut changes: Subscription) {
        while let Some(payload) = changes.recv().await {
            let rc: NormalizedChangeEvent = match serde_json::from_slice(&payload) {
                Ok(rc) => rc,
                Err(e) => {
                    warn!(topic = changes.topic(), error = %e, "Could not decode change");
                    continue;
                }
            };

            if let Err(e) = self.handle_change(&rc).await {
                error!(error = %e, "Could not queue revision, stopping monitor");
                return;
            }
        }
        info!("Deduplicated change stream closed");
    }
}

/// Validate a fetched diff and archive it. Errors are logged and dropped.
///
/// A payload that does not parse as a compare result is still archived.
pub fn handle_fetch_response(
    archiver: &dyn Archiver,
    revision: i64,
    result: std::result::Result<Vec<u8>, DiffError>,
) {
    let body = match result {
        Ok(body) => body,
        Err(e) => {
            error!(revision, error = %e, "Received fetch error");
            return;
        }
    };

    match parse_compare(&body) {
        Ok(compare) => debug!(
            revision,
            from = compare.from_rev_id,
            to = compare.to_rev_id,
            title = %compare.to_title,
            "Parsed diff"
        ),
        Err(e) => error!(revision, error = %e, "Encountered parsing error"),
    }

    match archiver.archive(revision, &body) {
        Ok(_) => DiffMetrics::record_archived(),
        Err(e) => {
            DiffMetrics::record_archive_error();
            error!(revision, error = %e, "Could not write file");
        }
    }
}

async fn watch_deletes(mut raw: Subscription) {
    while let Some(payload) = raw.recv().await {
        let Ok(rc) = SseChangeEvent::from_json(&payload) else {
            continue;
        };
        if rc.is_delete() {
            info!(title = %rc.title, wiki = %rc.wiki, "Recent change action delete noted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffs::DiffFetcher;
    use crate::recentchanges::{ChangeKind, Revision, Source};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct CannedFetcher;

    #[async_trait]
    impl DiffFetcher for CannedFetcher {
        async fn fetch(&self, revision: i64) -> std::result::Result<Vec<u8>, DiffError> {
            Ok(format!("diff-{}", revision).into_bytes())
        }
    }

    #[derive(Default)]
    struct RecordingArchiver {
        archived: Mutex<Vec<(i64, Vec<u8>)>>,
    }

    impl Archiver for RecordingArchiver {
        fn archive(&self, revision: i64, diff: &[u8]) -> Result<PathBuf> {
            self.archived.lock().unwrap().push((revision, diff.to_vec()));
            Ok(PathBuf::from(revision.to_string()))
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl DiffFetcher for SlowFetcher {
        async fn fetch(&self, revision: i64) -> std::result::Result<Vec<u8>, DiffError> {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            Ok(revision.to_string().into_bytes())
        }
    }

    fn change(kind: ChangeKind, new: Option<i64>) -> NormalizedChangeEvent {
        NormalizedChangeEvent {
            id: None,
            kind,
            title: "Example".to_string(),
            comment: String::new(),
            user: "Alice".to_string(),
            bot: false,
            wiki: "en".to_string(),
            minor: false,
            revision: Revision { new, old: new.map(|n| n - 1) },
            source: Source::Sse,
        }
    }

    #[tokio::test]
    async fn test_edit_is_fetched_and_archived() {
        let queue = Arc::new(DiffQueue::new(Arc::new(CannedFetcher), 10));
        let archiver = Arc::new(RecordingArchiver::default());
        let monitor = Monitor::new(queue.clone(), archiver.clone());

        assert!(monitor.handle_change(&change(ChangeKind::Edit, Some(900))).await.unwrap());
        drop(monitor);
        Arc::try_unwrap(queue).ok().unwrap().drain().await;

        let archived = archiver.archived.lock().unwrap();
        assert_eq!(archived.as_slice(), &[(900, b"diff-900".to_vec())]);
    }

    #[tokio::test]
    async fn test_new_pages_and_missing_revisions_are_skipped() {
        let queue = Arc::new(DiffQueue::new(Arc::new(CannedFetcher), 10));
        let archiver = Arc::new(RecordingArchiver::default());
        let monitor = Monitor::new(queue, archiver.clone());

        assert!(!monitor.handle_change(&change(ChangeKind::New, Some(5))).await.unwrap());
        assert!(!monitor.handle_change(&change(ChangeKind::Edit, None)).await.unwrap());
    }

    #[tokio::test]
    async fn test_full_queue_holds_back_the_bus_without_losing_edits() {
        use crate::bus::{publish_json, InMemoryBus};

        // far more edits than either the topic or the queue can buffer
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new(4));
        let queue = Arc::new(DiffQueue::new(Arc::new(SlowFetcher), 2));
        let archiver = Arc::new(RecordingArchiver::default());
        let _handles = Monitor::new(queue, archiver.clone())
            .spawn(bus.clone())
            .await
            .unwrap();

        for revision in 1..=60 {
            publish_json(bus.as_ref(), DEDUPLICATED_TOPIC, &change(ChangeKind::Edit, Some(revision)))
                .await
                .unwrap();
        }

        for _ in 0..250 {
            if archiver.archived.lock().unwrap().len() == 60 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let revisions: Vec<i64> = archiver
            .archived
            .lock()
            .unwrap()
            .iter()
            .map(|(revision, _)| *revision)
            .collect();
        assert_eq!(revisions, (1..=60).collect::<Vec<_>>());
    }

    #[test]
    fn test_unparsable_payload_still_archived() {
        let dir = tempdir().unwrap();
        let archiver = FileArchiver::new(dir.path());

        handle_fetch_response(&archiver, 42, Ok(b"not json".to_vec()));

        assert_eq!(std::fs::read(dir.path().join("42")).unwrap(), b"not json");
    }

    #[test]
    fn test_fetch_error_writes_nothing() {
        let dir = tempdir().unwrap();
        let archiver = FileArchiver::new(dir.path());

        handle_fetch_response(&archiver, 42, Err(DiffError::QueueClosed));

        assert!(!dir.path().join("42").exists());
    }
}
