use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::DiffError;
use crate::metrics::DiffMetrics;

use super::fetcher::DiffFetcher;

/// Invoked exactly once with the outcome of a fetch.
pub type FetchCallback = Box<dyn FnOnce(Result<Vec<u8>, DiffError>) + Send + 'static>;

pub struct FetchJob {
    pub revision_id: i64,
    pub callback: FetchCallback,
}

impl fmt::Debug for FetchJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchJob")
            .field("revision_id", &self.revision_id)
            .finish_non_exhaustive()
    }
}

/// Bounded FIFO of fetch jobs drained by a single worker.
///
/// At most one fetch is in flight. Callers of [`enqueue`](Self::enqueue)
/// wait while `capacity` jobs are already pending.
pub struct DiffQueue {
    jobs: mpsc::Sender<FetchJob>,
    worker: JoinHandle<()>,
}

impl DiffQueue {
    pub fn new(fetcher: Arc<dyn DiffFetcher>, capacity: usize) -> Self {
        let (jobs, mut rx) = mpsc::channel::<FetchJob>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                debug!(revision = job.revision_id, "Dispatching fetch");
                let result = fetcher.fetch(job.revision_id).await;
                (job.callback)(result);
            }
            debug!("Fetch queue drained, worker exiting");
        });
        Self { jobs, worker }
    }

    /// Jobs accepted but not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.jobs.max_capacity() - self.jobs.capacity()
    }

    pub async fn enqueue<F>(&self, revision_id: i64, callback: F) -> Result<(), DiffError>
    where
        F: FnOnce(Result<Vec<u8>, DiffError>) + Send + 'static,
    {
        let pending = self.pending();
        info!(revision = revision_id, total = pending, "Queueing revision");
        self.jobs
            .send(FetchJob {
                revision_id,
                callback: Box::new(callback),
            })
            .await
            .map_err(|_| DiffError::QueueClosed)?;
        DiffMetrics::record_enqueued(pending + 1);
        Ok(())
    }

    /// Stop accepting jobs and wait until every queued job has been handled.
    pub async fn drain(self) {
        drop(self.jobs);
        let _ = self.worker.await;
    }
}
