//! Hand-driven worker pools and discovery modules for tests.
//!
//! The pools queue every job they receive; the test then completes them
//! one by one, on its own thread or from another one.

use crate::discoverer::{DiscovererCategory, DiscoveryModule, DiscoverySession, DiscoverySink};
use crate::picture::RawFrame;
use crate::preparse::ParseReporter;
use crate::worker::{
    ParseJob, PreparseOutcome, Preparser, Refused, RequestId, ThumbnailJob, Thumbnailer,
};
use common::{MediaError, MediaResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Preparser whose jobs wait for the test to complete them.
#[derive(Debug, Default)]
pub struct ManualPreparser {
    jobs: Mutex<VecDeque<ParseJob>>,
    cancelled: Mutex<Vec<RequestId>>,
    refusing: AtomicBool,
}

impl ManualPreparser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `push` fail.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of queued jobs.
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Take the oldest job, to complete it by hand.
    pub fn take_next(&self) -> Option<ParseJob> {
        self.jobs.lock().pop_front()
    }

    /// Complete the oldest job. Returns false if none was queued.
    pub fn complete_next(&self, outcome: PreparseOutcome) -> bool {
        self.complete_next_with(|reporter| reporter.finish(outcome))
    }

    /// Hand the oldest job's reporter to `f`.
    pub fn complete_next_with(&self, f: impl FnOnce(ParseReporter)) -> bool {
        match self.take_next() {
            Some(job) => {
                f(job.reporter);
                true
            }
            None => false,
        }
    }

    /// Ids passed to `cancel`, in order.
    pub fn cancelled(&self) -> Vec<RequestId> {
        self.cancelled.lock().clone()
    }

    /// Complete every queued job that was cancelled, as interrupted.
    pub fn complete_cancelled(&self) {
        let cancelled = self.cancelled();
        let jobs: Vec<ParseJob> = {
            let mut queue = self.jobs.lock();
            let (matching, rest): (Vec<_>, Vec<_>) =
                queue.drain(..).partition(|job| cancelled.contains(&job.id));
            *queue = rest.into();
            matching
        };
        for job in jobs {
            job.reporter.finish(PreparseOutcome::Interrupted);
        }
    }

    /// Drop every queued job without finishing it.
    pub fn drop_all(&self) {
        let jobs: Vec<ParseJob> = self.jobs.lock().drain(..).collect();
        drop(jobs);
    }
}

impl Preparser for ManualPreparser {
    fn push(&self, job: ParseJob) -> Result<(), Refused<ParseJob>> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(Refused::new(job, MediaError::worker("manual preparser refusing")));
        }
        self.jobs.lock().push_back(job);
        Ok(())
    }

    fn cancel(&self, id: RequestId) {
        self.cancelled.lock().push(id);
    }
}

/// Thumbnailer whose jobs wait for the test to complete them.
#[derive(Debug, Default)]
pub struct ManualThumbnailer {
    jobs: Mutex<VecDeque<ThumbnailJob>>,
    cancelled: Mutex<Vec<RequestId>>,
}

impl ManualThumbnailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn take_next(&self) -> Option<ThumbnailJob> {
        self.jobs.lock().pop_front()
    }

    /// Deliver `frame` for the oldest job. Returns false if none was queued.
    pub fn complete_next(&self, frame: Option<RawFrame>) -> bool {
        match self.take_next() {
            Some(job) => {
                job.reporter.finish(frame);
                true
            }
            None => false,
        }
    }

    pub fn cancelled(&self) -> Vec<RequestId> {
        self.cancelled.lock().clone()
    }

    pub fn drop_all(&self) {
        let jobs: Vec<ThumbnailJob> = self.jobs.lock().drain(..).collect();
        drop(jobs);
    }
}

impl Thumbnailer for ManualThumbnailer {
    fn push(&self, job: ThumbnailJob) -> MediaResult<()> {
        self.jobs.lock().push_back(job);
        Ok(())
    }

    fn cancel(&self, id: RequestId) {
        self.cancelled.lock().push(id);
    }
}

/// Discovery module that hands its sink to the test.
#[derive(Debug)]
pub struct StaticDiscovery {
    name: String,
    category: DiscovererCategory,
    sink: Arc<Mutex<Option<DiscoverySink>>>,
    closed: Arc<AtomicUsize>,
}

impl StaticDiscovery {
    pub fn new(name: &str, category: DiscovererCategory) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            category,
            sink: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Sink of the open session, if any.
    pub fn sink(&self) -> Option<DiscoverySink> {
        self.sink.lock().clone()
    }

    /// Number of sessions closed so far.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct StaticSession {
    sink: Arc<Mutex<Option<DiscoverySink>>>,
    closed: Arc<AtomicUsize>,
}

impl DiscoverySession for StaticSession {
    fn close(&mut self) {
        self.sink.lock().take();
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl DiscoveryModule for StaticDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn long_name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> DiscovererCategory {
        self.category
    }

    fn open(&self, sink: DiscoverySink) -> MediaResult<Box<dyn DiscoverySession>> {
        *self.sink.lock() = Some(sink);
        Ok(Box::new(StaticSession {
            sink: self.sink.clone(),
            closed: self.closed.clone(),
        }))
    }
}
