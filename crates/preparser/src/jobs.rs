//! Runtime and cancellation plumbing shared by the pools.

use common::{MediaError, MediaResult};
use oxide_media::RequestId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

/// Build the multi-thread runtime owned by a pool.
pub(crate) fn build_runtime(name: &str, threads: usize) -> MediaResult<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads.max(1))
        .thread_name(name)
        .enable_all()
        .build()
        .map_err(|err| MediaError::worker(format!("{} runtime: {}", name, err)))
}

/// Cancellation signals of the jobs in flight.
#[derive(Debug, Default)]
pub(crate) struct CancelRegistry {
    senders: Mutex<HashMap<RequestId, oneshot::Sender<()>>>,
}

impl CancelRegistry {
    /// Track a new job.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        self.senders.lock().insert(id, sender);
        receiver
    }

    /// Signal a job. Returns false if it is not in flight.
    pub fn cancel(&self, id: RequestId) -> bool {
        match self.senders.lock().remove(&id) {
            Some(sender) => sender.send(()).is_ok(),
            None => false,
        }
    }

    /// Stop tracking a finished job.
    pub fn forget(&self, id: RequestId) {
        self.senders.lock().remove(&id);
    }

    /// Number of jobs in flight.
    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }
}

/// How a raced job ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Race<T> {
    Done(T),
    Cancelled,
    TimedOut,
}

/// Run `work` until it finishes, the job is cancelled or the deadline passes.
pub(crate) async fn race<F: Future>(
    work: F,
    cancel: oneshot::Receiver<()>,
    timeout: Option<Duration>,
) -> Race<F::Output> {
    tokio::select! {
        output = work => Race::Done(output),
        _ = cancel => Race::Cancelled,
        _ = deadline(timeout) => Race::TimedOut,
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}
