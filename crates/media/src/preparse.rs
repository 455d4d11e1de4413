//! Preparse state machine of a media item.
//!
//! ```text
//! none --parse_request--> pending --completion--> failed | timeout | cancelled | done
//!   \--parse_request (nothing to do)--> skipped
//! ```
//!
//! At most one request is in flight per item. A request is refused while
//! the status is `pending` or `done`; an item that reached `done` is never
//! parsed again, use [`Media::duplicate`] for a fresh one.

use crate::event::EventPayload;
use crate::handle::OpGuard;
use crate::instance::Instance;
use crate::location::ItemType;
use crate::media::{FileStat, Media, Slave};
use crate::meta::MetaKey;
use crate::picture::{Attachment, PictureList};
use crate::track::Track;
use crate::worker::{ParseJob, PreparseOutcome, RequestId, SubTree};
use bitflags::bitflags;
use common::{MediaError, MediaResult, Millis};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Parse status of a media item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParseStatus {
    None = 0,
    Pending = 1,
    Skipped = 2,
    Failed = 3,
    Timeout = 4,
    Cancelled = 5,
    Done = 6,
}

impl ParseStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ParseStatus::Pending,
            2 => ParseStatus::Skipped,
            3 => ParseStatus::Failed,
            4 => ParseStatus::Timeout,
            5 => ParseStatus::Cancelled,
            6 => ParseStatus::Done,
            _ => ParseStatus::None,
        }
    }

    /// Check if a parse has concluded, one way or another.
    pub fn is_finished(&self) -> bool {
        !matches!(self, ParseStatus::None | ParseStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::None => "none",
            ParseStatus::Pending => "pending",
            ParseStatus::Skipped => "skipped",
            ParseStatus::Failed => "failed",
            ParseStatus::Timeout => "timeout",
            ParseStatus::Cancelled => "cancelled",
            ParseStatus::Done => "done",
        }
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PreparseOutcome> for ParseStatus {
    fn from(outcome: PreparseOutcome) -> Self {
        match outcome {
            PreparseOutcome::Success => ParseStatus::Done,
            PreparseOutcome::Failed => ParseStatus::Failed,
            PreparseOutcome::Timeout => ParseStatus::Timeout,
            PreparseOutcome::Interrupted => ParseStatus::Cancelled,
        }
    }
}

bitflags! {
    /// What a caller asks a parse request to do.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ParseFlags: u32 {
        /// Parse local items.
        const LOCAL = 0x01;
        /// Parse network items too.
        const NETWORK = 0x02;
        /// Parse whatever the item type.
        const FORCED = 0x04;
        /// Fetch metadata and art from local sources.
        const FETCH_LOCAL = 0x08;
        /// Fetch metadata and art from the network.
        const FETCH_NETWORK = 0x10;
        /// Allow the parser to ask the user questions.
        const DO_INTERACT = 0x20;
    }
}

bitflags! {
    /// What a pool is asked to do for one job.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ParseScope: u32 {
        const PARSE = 0x01;
        const FETCH_LOCAL = 0x02;
        const FETCH_NETWORK = 0x04;
        const INTERACT = 0x08;
        const SUBITEMS = 0x10;
    }
}

/// Compute the job scope for an item, or `None` if there is nothing to do.
pub fn parse_scope(flags: ParseFlags, item_type: ItemType, network: bool) -> Option<ParseScope> {
    let do_parse = if flags.contains(ParseFlags::FORCED) {
        true
    } else if network {
        flags.contains(ParseFlags::NETWORK)
    } else if flags.contains(ParseFlags::LOCAL) {
        matches!(
            item_type,
            ItemType::Node | ItemType::File | ItemType::Directory | ItemType::Playlist
        )
    } else {
        false
    };

    let mut scope = ParseScope::empty();
    if do_parse {
        scope |= ParseScope::PARSE;
    }
    if flags.contains(ParseFlags::FETCH_LOCAL) {
        scope |= ParseScope::FETCH_LOCAL;
    }
    if flags.contains(ParseFlags::FETCH_NETWORK) {
        scope |= ParseScope::FETCH_NETWORK;
    }
    if scope.is_empty() {
        return None;
    }

    if flags.contains(ParseFlags::DO_INTERACT) {
        scope |= ParseScope::INTERACT;
    }
    Some(scope | ParseScope::SUBITEMS)
}

/// Deadline of a parse or thumbnail request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseTimeout {
    /// Use the instance configuration.
    #[default]
    Default,
    /// Never time out.
    Infinite,
    After(Duration),
}

impl ParseTimeout {
    /// Map a millisecond count: -1 is the default, 0 is infinite.
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ms if ms < 0 => ParseTimeout::Default,
            0 => ParseTimeout::Infinite,
            ms => ParseTimeout::After(Duration::from_millis(ms as u64)),
        }
    }

    /// Resolve against a configured default; a zero default means no deadline.
    pub fn resolve(self, default: Duration) -> Option<Duration> {
        match self {
            ParseTimeout::Default if default.is_zero() => None,
            ParseTimeout::Default => Some(default),
            ParseTimeout::Infinite => None,
            ParseTimeout::After(duration) => Some(duration),
        }
    }
}

/// Per-item parse bookkeeping.
pub(crate) struct ParseState {
    status: AtomicU8,
    /// Request currently in flight, for cancellation.
    pending: Mutex<Option<RequestId>>,
    watch: watch::Sender<ParseStatus>,
}

impl ParseState {
    pub(crate) fn new() -> Self {
        let (watch, _) = watch::channel(ParseStatus::None);
        Self {
            status: AtomicU8::new(ParseStatus::None as u8),
            pending: Mutex::new(None),
            watch,
        }
    }

    pub(crate) fn status(&self) -> ParseStatus {
        ParseStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Move to `pending` unless a request is in flight or a parse succeeded.
    ///
    /// Returns the status it replaced.
    fn try_begin(&self) -> MediaResult<ParseStatus> {
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            match ParseStatus::from_u8(current) {
                ParseStatus::Pending => return Err(MediaError::busy("parse already pending")),
                ParseStatus::Done => return Err(MediaError::busy("already parsed")),
                _ => {}
            }
            match self.status.compare_exchange_weak(
                current,
                ParseStatus::Pending as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.watch.send_replace(ParseStatus::Pending);
                    return Ok(ParseStatus::from_u8(current));
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Undo [`ParseState::try_begin`] when no job could be started.
    fn restore(&self, previous: ParseStatus) {
        self.status.store(previous as u8, Ordering::Release);
        self.watch.send_replace(previous);
    }

    /// Store `status`, returning the previous one. Waiters are not woken.
    fn swap(&self, status: ParseStatus) -> ParseStatus {
        ParseStatus::from_u8(self.status.swap(status as u8, Ordering::AcqRel))
    }

    /// Wake waiters with the current status.
    fn publish(&self) {
        self.watch.send_replace(self.status());
    }

    fn set_pending(&self, id: Option<RequestId>) {
        *self.pending.lock() = id;
    }

    fn clear_pending(&self, id: RequestId) {
        let mut pending = self.pending.lock();
        if *pending == Some(id) {
            *pending = None;
        }
    }

    fn take_pending(&self) -> Option<RequestId> {
        self.pending.lock().take()
    }
}

impl Media {
    /// Start parsing this item in the background.
    ///
    /// Fails with [`MediaError::Busy`] while a request is pending or once a
    /// parse succeeded, without changing anything. A pool refusing the job
    /// also fails the call, with the status restored and nothing published. When the flags leave
    /// nothing to do for this item, `skipped` is published before returning.
    /// Otherwise the outcome arrives later as a `MediaParsedChanged` event.
    pub fn parse_request(
        self: &Arc<Self>,
        instance: &Instance,
        flags: ParseFlags,
        timeout: ParseTimeout,
    ) -> MediaResult<()> {
        let previous = match self.parse.try_begin() {
            Ok(previous) => previous,
            Err(err) => {
                tracing::warn!(media = %self.id(), status = %self.parsed_status(), "parse request refused");
                return Err(err);
            }
        };

        let guard = match self.ops().begin() {
            Ok(guard) => guard,
            Err(err) => {
                self.parse.restore(previous);
                return Err(err);
            }
        };

        let (item_type, network) = (self.item_type(), self.location().is_network());
        let Some(scope) = parse_scope(flags, item_type, network) else {
            tracing::debug!(media = %self.id(), ?flags, ?item_type, "nothing to parse");
            self.announce_parsed_changed(ParseStatus::Skipped);
            drop(guard);
            self.parse.publish();
            return Ok(());
        };

        let preparser = match instance.preparser() {
            Ok(preparser) => preparser,
            Err(err) => {
                self.parse.restore(previous);
                return Err(err);
            }
        };

        let id = RequestId::next();
        let timeout = timeout.resolve(instance.config().preparse_timeout);
        // Recorded before pushing: a pool may complete the job inside push.
        self.parse.set_pending(Some(id));
        let job = ParseJob {
            id,
            scope,
            timeout,
            reporter: ParseReporter {
                media: self.clone(),
                id,
                scope,
                guard: Some(guard),
            },
        };
        tracing::debug!(media = %self.id(), %id, ?scope, ?timeout, "parse requested");
        if let Err(refused) = preparser.push(job) {
            tracing::warn!(media = %self.id(), %id, err = %refused.error, "preparser refused job");
            refused.job.reporter.disarm();
            self.parse.set_pending(None);
            self.parse.restore(previous);
            return Err(refused.error);
        }
        Ok(())
    }

    /// Ask the worker pool to abandon the pending parse, if any.
    ///
    /// The completion still arrives, as cancelled or timed out.
    pub fn parse_stop(&self, instance: &Instance) {
        let Some(id) = self.parse.take_pending() else {
            return;
        };
        if let Some(preparser) = instance.preparser_if_created() {
            tracing::debug!(media = %self.id(), %id, "parse stop");
            preparser.cancel(id);
        }
    }

    /// Get the parse status.
    pub fn parsed_status(&self) -> ParseStatus {
        self.parse.status()
    }

    /// Wait until a parse concluded and return its status.
    ///
    /// Never resolves if no parse is ever requested.
    pub async fn wait_parsed(&self) -> ParseStatus {
        let mut rx = self.parse.watch.subscribe();
        let status = match rx.wait_for(|status| status.is_finished()).await {
            Ok(status) => *status,
            Err(_) => self.parsed_status(),
        };
        status
    }

    /// Publish a new status; a repeated status publishes nothing.
    pub(crate) fn send_parsed_changed(&self, status: ParseStatus) {
        self.announce_parsed_changed(status);
        self.parse.publish();
    }

    /// Store a new status and send its events, leaving waiters asleep.
    fn announce_parsed_changed(&self, status: ParseStatus) {
        if self.parse.swap(status) == status {
            return;
        }
        tracing::debug!(media = %self.id(), %status, "parsed status changed");

        self.event_bus().send(EventPayload::MediaDurationChanged {
            duration: self.raw_duration(),
        });
        self.event_bus()
            .send(EventPayload::MediaMetaChanged { key: None });
        self.event_bus()
            .send(EventPayload::MediaParsedChanged { status });

        self.subitems().end_reached();
    }

    /// Attach a discovered tree below this item, depth first.
    ///
    /// Each child is added to its parent's sub-items, then announced on the
    /// parent's bus, before its own children are visited.
    pub(crate) fn add_subtree(self: &Arc<Self>, tree: &SubTree) -> MediaResult<()> {
        let mut stack: Vec<(Arc<Media>, usize)> = Vec::new();
        stack
            .try_reserve(tree.roots().len())
            .map_err(|_| MediaError::oom("sub-tree walk"))?;
        stack.extend(tree.roots().iter().rev().map(|&index| (self.clone(), index)));

        while let Some((parent, index)) = stack.pop() {
            let Some(node) = tree.node(index) else {
                return Err(MediaError::internal(format!("dangling sub-tree node {}", index)));
            };
            let child = Media::from_descriptor(&node.descriptor);
            // Reserve before attaching, so a failure only drops the detached child.
            stack
                .try_reserve(node.children.len())
                .map_err(|_| MediaError::oom("sub-tree walk"))?;

            parent.subitems().lock().internal_add(child.clone());
            parent
                .event_bus()
                .send(EventPayload::MediaSubItemAdded { item: child.clone() });

            stack.extend(node.children.iter().rev().map(|&index| (child.clone(), index)));
        }

        self.event_bus()
            .send(EventPayload::MediaSubItemTreeAdded { item: self.clone() });
        Ok(())
    }

    fn finish_parse(&self, id: RequestId, outcome: PreparseOutcome) {
        tracing::debug!(media = %self.id(), %id, ?outcome, "parse ended");
        self.announce_parsed_changed(outcome.into());
        self.parse.clear_pending(id);
    }
}

/// Handle through which a pool reports on one parse job.
///
/// Holds the item alive until the job completes. Dropping the reporter
/// without calling [`ParseReporter::finish`] completes the job as
/// interrupted.
pub struct ParseReporter {
    media: Arc<Media>,
    id: RequestId,
    scope: ParseScope,
    guard: Option<OpGuard>,
}

impl ParseReporter {
    /// Get the item being parsed.
    pub fn media(&self) -> &Arc<Media> {
        &self.media
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn scope(&self) -> ParseScope {
        self.scope
    }

    /// Record the item type found by parsing.
    pub fn set_item_type(&self, item_type: ItemType) {
        self.media.with_descriptor(|d| d.item_type = item_type);
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.media.with_descriptor(|d| d.name = Some(name));
    }

    /// Record a metadata value. No event is sent until completion.
    pub fn set_meta(&self, key: MetaKey, value: Option<String>) {
        self.media.with_descriptor(|d| {
            d.meta.set(key, value);
        });
    }

    /// Check if a metadata value is already stored, not counting fallbacks.
    pub fn has_meta(&self, key: MetaKey) -> bool {
        self.media.with_descriptor(|d| d.meta.get(key).is_some())
    }

    pub fn set_extra_meta(&self, name: &str, value: Option<String>) {
        self.media.with_descriptor(|d| {
            d.meta.set_extra(name, value);
        });
    }

    pub fn set_duration(&self, duration: Option<Millis>) {
        self.media.with_descriptor(|d| d.duration = duration);
    }

    pub fn set_tracks(&self, tracks: Vec<Track>) {
        self.media.with_descriptor(|d| d.tracks = tracks);
    }

    pub fn set_file_stat(&self, stat: FileStat) {
        self.media.with_descriptor(|d| d.file_stat = stat);
    }

    pub fn add_slave(&self, slave: Slave) {
        self.media.with_descriptor(|d| d.slaves.push(slave));
    }

    /// Report a tree of discovered children.
    pub fn subtree(&self, tree: &SubTree) -> MediaResult<()> {
        self.media.add_subtree(tree)
    }

    /// Report attachments; supported pictures among them are published.
    pub fn attachments(&self, attachments: &[Attachment]) {
        let pictures = PictureList::from_attachments(attachments);
        if pictures.is_empty() {
            return;
        }
        self.media
            .event_bus()
            .send(EventPayload::MediaAttachedThumbnailsFound {
                pictures: Arc::new(pictures),
            });
    }

    /// Complete the job.
    pub fn finish(mut self, outcome: PreparseOutcome) {
        self.complete(outcome);
    }

    fn complete(&mut self, outcome: PreparseOutcome) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        self.media.finish_parse(self.id, outcome);
        // Ends the operation only once every event went out.
        drop(guard);
        self.media.parse.publish();
    }

    /// End the operation of a job that never started, publishing nothing.
    fn disarm(mut self) {
        drop(self.guard.take());
    }
}

impl Drop for ParseReporter {
    fn drop(&mut self) {
        self.complete(PreparseOutcome::Interrupted);
    }
}

impl fmt::Debug for ParseReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseReporter")
            .field("media", &self.media.id())
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("finished", &self.guard.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::event::{Event, EventCallback, EventType};
    use crate::location::Location;
    use crate::testing::ManualPreparser;
    use crate::worker::ItemDescriptor;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn instance_with(preparser: &Arc<ManualPreparser>) -> Arc<Instance> {
        Instance::builder(InstanceConfig::default())
            .with_preparser(preparser.clone())
            .build()
    }

    fn file(name: &str) -> Arc<Media> {
        Media::new_location(&format!("file:///media/{}", name)).unwrap()
    }

    fn record(media: &Media) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EventType::MediaDurationChanged,
            EventType::MediaMetaChanged,
            EventType::MediaParsedChanged,
            EventType::MediaSubItemAdded,
            EventType::MediaSubItemTreeAdded,
            EventType::MediaAttachedThumbnailsFound,
        ] {
            let sink = seen.clone();
            let callback: EventCallback = Arc::new(move |event: &Event| sink.lock().push(event.clone()));
            media.event_bus().attach(kind, callback).unwrap();
        }
        seen
    }

    fn kinds(events: &[Event]) -> Vec<EventType> {
        events.iter().map(Event::kind).collect()
    }

    fn parsed_count(events: &[Event]) -> usize {
        events
            .iter()
            .filter(|e| e.kind() == EventType::MediaParsedChanged)
            .count()
    }

    #[test]
    fn test_scope_classification() {
        let local = ParseFlags::LOCAL;
        assert_eq!(
            parse_scope(local, ItemType::File, false),
            Some(ParseScope::PARSE | ParseScope::SUBITEMS)
        );
        assert_eq!(parse_scope(local, ItemType::Disc, false), None);
        assert_eq!(parse_scope(local, ItemType::Stream, true), None);
        assert_eq!(
            parse_scope(ParseFlags::NETWORK, ItemType::Stream, true),
            Some(ParseScope::PARSE | ParseScope::SUBITEMS)
        );
        assert_eq!(
            parse_scope(ParseFlags::FORCED, ItemType::Unknown, false),
            Some(ParseScope::PARSE | ParseScope::SUBITEMS)
        );
        assert_eq!(
            parse_scope(ParseFlags::FETCH_NETWORK | ParseFlags::DO_INTERACT, ItemType::Disc, false),
            Some(ParseScope::FETCH_NETWORK | ParseScope::INTERACT | ParseScope::SUBITEMS)
        );
        // Interaction alone is not work.
        assert_eq!(parse_scope(ParseFlags::DO_INTERACT, ItemType::File, false), None);
    }

    #[test]
    fn test_timeout_resolution() {
        let default = Duration::from_secs(5);
        assert_eq!(ParseTimeout::from_millis(-1).resolve(default), Some(default));
        assert_eq!(ParseTimeout::from_millis(0).resolve(default), None);
        assert_eq!(
            ParseTimeout::from_millis(250).resolve(default),
            Some(Duration::from_millis(250))
        );
        assert_eq!(ParseTimeout::Default.resolve(Duration::ZERO), None);
    }

    #[test]
    fn test_second_request_refused_while_pending() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");
        let events = record(&media);

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        let err = media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap_err();
        assert!(err.is_busy());
        assert_eq!(pool.pending(), 1);
        assert_eq!(media.parsed_status(), ParseStatus::Pending);

        pool.complete_next(PreparseOutcome::Success);
        assert_eq!(media.parsed_status(), ParseStatus::Done);
        assert_eq!(parsed_count(&events.lock()), 1);
    }

    #[test]
    fn test_done_is_never_reparsed() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        pool.complete_next(PreparseOutcome::Success);

        assert!(media
            .parse_request(&instance, ParseFlags::FORCED, ParseTimeout::Default)
            .unwrap_err()
            .is_busy());
        assert_eq!(pool.pending(), 0);

        let copy = media.duplicate();
        assert_eq!(copy.parsed_status(), ParseStatus::None);
        copy.parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        assert_eq!(pool.pending(), 1);
    }

    #[test]
    fn test_failed_parse_can_be_retried() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        pool.complete_next(PreparseOutcome::Failed);
        assert_eq!(media.parsed_status(), ParseStatus::Failed);

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        assert_eq!(media.parsed_status(), ParseStatus::Pending);
    }

    #[test]
    fn test_completion_event_order() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");
        let events = record(&media);

        let ends = Arc::new(AtomicUsize::new(0));
        let seen_end = ends.clone();
        let on_end: EventCallback = Arc::new(move |_| {
            seen_end.fetch_add(1, Ordering::SeqCst);
        });
        media
            .subitems()
            .event_bus()
            .attach(EventType::ListEndReached, on_end)
            .unwrap();

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        pool.complete_next_with(|reporter| {
            reporter.set_duration(Some(Millis(90_000)));
            reporter.finish(PreparseOutcome::Success);
        });

        let events = events.lock();
        assert_eq!(
            kinds(&events),
            vec![
                EventType::MediaDurationChanged,
                EventType::MediaMetaChanged,
                EventType::MediaParsedChanged,
            ]
        );
        assert!(matches!(
            events[0].payload,
            EventPayload::MediaDurationChanged {
                duration: Some(Millis(90_000))
            }
        ));
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert_eq!(media.duration(), Some(Millis(90_000)));
    }

    #[test]
    fn test_repeated_status_is_silent() {
        let media = file("a.ogg");
        let events = record(&media);

        media.send_parsed_changed(ParseStatus::Done);
        media.send_parsed_changed(ParseStatus::Done);
        assert_eq!(events.lock().len(), 3);
        assert_eq!(parsed_count(&events.lock()), 1);
    }

    #[test]
    fn test_nothing_to_do_is_skipped() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = Media::new_location("https://example.com/live.ts").unwrap();
        let events = record(&media);

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        assert_eq!(media.parsed_status(), ParseStatus::Skipped);
        assert_eq!(pool.pending(), 0);
        assert_eq!(media.ops().outstanding(), 0);
        assert_eq!(parsed_count(&events.lock()), 1);
        assert_eq!(media.duration(), None);
    }

    #[test]
    fn test_dropped_job_reports_cancelled() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        pool.drop_all();
        assert_eq!(media.parsed_status(), ParseStatus::Cancelled);
        assert_eq!(media.ops().outstanding(), 0);
    }

    #[test]
    fn test_parse_stop_cancels_pending() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        media.parse_stop(&instance);
        assert_eq!(pool.cancelled().len(), 1);
        // The pool decides when the completion arrives.
        assert_eq!(media.parsed_status(), ParseStatus::Pending);

        pool.complete_cancelled();
        assert_eq!(media.parsed_status(), ParseStatus::Cancelled);

        // Nothing left to stop.
        media.parse_stop(&instance);
        assert_eq!(pool.cancelled().len(), 1);
    }

    #[test]
    fn test_parse_without_pool_fails_cleanly() {
        let instance = Instance::new(InstanceConfig::default());
        let media = file("a.ogg");
        assert!(matches!(
            media.parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default),
            Err(MediaError::WorkerUnavailable(_))
        ));
        assert_eq!(media.parsed_status(), ParseStatus::None);
        assert_eq!(media.ops().outstanding(), 0);
    }

    #[test]
    fn test_refused_job_unwinds_cleanly() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");
        let events = record(&media);

        pool.set_refusing(true);
        assert!(matches!(
            media.parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default),
            Err(MediaError::WorkerUnavailable(_))
        ));
        assert_eq!(media.parsed_status(), ParseStatus::None);
        assert_eq!(media.ops().outstanding(), 0);
        assert!(events.lock().is_empty());
        // Nothing is left pending to stop.
        media.parse_stop(&instance);
        assert!(pool.cancelled().is_empty());

        pool.set_refusing(false);
        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        assert_eq!(pool.pending(), 1);
        pool.complete_next(PreparseOutcome::Success);
        assert_eq!(parsed_count(&events.lock()), 1);
        assert_eq!(media.parsed_status(), ParseStatus::Done);
    }

    #[test]
    fn test_single_child_subtree() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("album.m3u");
        let events = record(&media);

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        pool.complete_next_with(|reporter| {
            let mut tree = SubTree::new();
            tree.add_root(ItemDescriptor::new(
                Location::parse("file:///media/track1.ogg").unwrap(),
            ));
            reporter.subtree(&tree).unwrap();
            reporter.finish(PreparseOutcome::Success);
        });

        assert_eq!(media.subitems().lock().count(), 1);
        let events = events.lock();
        let added: Vec<_> = events
            .iter()
            .filter(|e| e.kind() == EventType::MediaSubItemAdded)
            .collect();
        assert_eq!(added.len(), 1);
        assert_eq!(media.parsed_status(), ParseStatus::Done);
        assert_eq!(parsed_count(&events), 1);
        assert_eq!(
            kinds(&events)[..2],
            [EventType::MediaSubItemAdded, EventType::MediaSubItemTreeAdded]
        );
    }

    #[test]
    fn test_subtree_is_walked_depth_first() {
        let media = Media::new_as_node("root");
        let mut tree = SubTree::new();
        let loc = |name: &str| Location::parse(&format!("file:///t/{}", name)).unwrap();
        let a = tree.add_root(ItemDescriptor::new(loc("a")).with_type(ItemType::Directory));
        tree.add_child(a, ItemDescriptor::new(loc("a1")));
        tree.add_root(ItemDescriptor::new(loc("b")));

        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = order.clone();
        let on_added: EventCallback = Arc::new(move |event: &Event| {
            if let EventPayload::MediaSubItemAdded { item } = &event.payload {
                sink.lock().push(item.name());
            }
        });
        media
            .event_bus()
            .attach(EventType::MediaSubItemAdded, on_added.clone())
            .unwrap();

        media.add_subtree(&tree).unwrap();

        // Only direct children are announced on the root bus.
        assert_eq!(*order.lock(), vec!["a", "b"]);
        let first = media.subitems().lock().item_at_index(0).unwrap();
        assert_eq!(first.subitems().lock().count(), 1);
        assert_eq!(first.subitems().lock().item_at_index(0).unwrap().name(), "a1");
    }

    #[test]
    fn test_deep_subtree_does_not_recurse() {
        let media = Media::new_as_node("root");
        let mut tree = SubTree::new();
        let location = Location::parse("file:///deep/x").unwrap();
        let mut parent = tree.add_root(ItemDescriptor::new(location.clone()));
        for _ in 0..50_000 {
            parent = tree.add_child(parent, ItemDescriptor::new(location.clone()));
        }
        media.add_subtree(&tree).unwrap();
        assert_eq!(media.subitems().lock().count(), 1);
        drop(media);
    }

    #[test]
    fn test_attachments_event() {
        let media = file("song.mp3");
        let events = record(&media);
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        media
            .parse_request(&instance, ParseFlags::FETCH_LOCAL, ParseTimeout::Default)
            .unwrap();

        pool.complete_next_with(|reporter| {
            // Only unsupported attachments: no event.
            reporter.attachments(&[Attachment::new("a", "image/gif", b"GIF89a".to_vec())]);
            let png = crate::picture::Picture::from_frame(
                &crate::picture::RawFrame::new(1, 1, vec![0, 0, 0, 255]),
                crate::picture::PictureType::Png,
                0,
                0,
                false,
            )
            .unwrap();
            reporter.attachments(&[Attachment::new("cover.png", "", png.buffer().to_vec())]);
            reporter.finish(PreparseOutcome::Success);
        });

        let events = events.lock();
        let found: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::MediaAttachedThumbnailsFound { pictures } => Some(pictures.len()),
                _ => None,
            })
            .collect();
        assert_eq!(found, vec![1]);
    }

    #[test]
    fn test_release_waits_for_completion() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");
        let weak = Arc::downgrade(&media);

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        let job = pool.take_next().unwrap();

        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            // The item is still readable from the worker thread.
            let name = job.reporter.media().name();
            job.reporter.finish(PreparseOutcome::Success);
            name
        });

        media.release();
        assert_eq!(worker.join().unwrap(), "a.ogg");
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_wait_parsed() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");
        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();

        let job = pool.take_next().unwrap();
        let worker = thread::spawn(move || job.reporter.finish(PreparseOutcome::Timeout));

        assert_eq!(media.wait_parsed().await, ParseStatus::Timeout);
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn test_wait_parsed_sees_finished_completion() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = file("a.ogg");
        let events = record(&media);
        let ends = Arc::new(AtomicUsize::new(0));
        let seen_end = ends.clone();
        let on_end: EventCallback = Arc::new(move |_| {
            seen_end.fetch_add(1, Ordering::SeqCst);
        });
        media
            .subitems()
            .event_bus()
            .attach(EventType::ListEndReached, on_end)
            .unwrap();

        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        let job = pool.take_next().unwrap();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            job.reporter.finish(PreparseOutcome::Success);
        });

        assert_eq!(media.wait_parsed().await, ParseStatus::Done);
        // Every event went out and the operation ended before waiters woke.
        assert_eq!(parsed_count(&events.lock()), 1);
        assert_eq!(events.lock().len(), 3);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert_eq!(media.ops().outstanding(), 0);
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn test_wait_parsed_after_skip() {
        let pool = ManualPreparser::new();
        let instance = instance_with(&pool);
        let media = Media::new_location("https://example.com/live.ts").unwrap();
        media
            .parse_request(&instance, ParseFlags::LOCAL, ParseTimeout::Default)
            .unwrap();
        assert_eq!(media.wait_parsed().await, ParseStatus::Skipped);
        assert_eq!(media.ops().outstanding(), 0);
    }
}
