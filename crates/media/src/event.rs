//! Per-object event bus.
//!
//! Every event-emitting object owns one [`EventBus`]. Listeners are invoked
//! synchronously on the thread calling [`EventBus::send`], in attachment
//! order. A listener may attach or detach listeners on the same bus while it
//! runs.

use crate::media::Media;
use crate::meta::MetaKey;
use crate::picture::{Picture, PictureList};
use crate::preparse::ParseStatus;
use common::{MediaError, MediaResult, Millis, ObjectId};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// Event type enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    // Media item events
    MediaMetaChanged,
    MediaSubItemAdded,
    MediaDurationChanged,
    MediaParsedChanged,
    MediaSubItemTreeAdded,
    MediaThumbnailGenerated,
    MediaAttachedThumbnailsFound,

    // Collection events
    ListItemAdded,
    ListWillAddItem,
    ListItemDeleted,
    ListWillDeleteItem,
    ListEndReached,

    // List navigator events
    ListPlayerPlayed,
    ListPlayerNextItemSet,
    ListPlayerStopped,

    // Discoverer events
    DiscovererStarted,
    DiscovererStopped,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MediaMetaChanged => "MediaMetaChanged",
            EventType::MediaSubItemAdded => "MediaSubItemAdded",
            EventType::MediaDurationChanged => "MediaDurationChanged",
            EventType::MediaParsedChanged => "MediaParsedChanged",
            EventType::MediaSubItemTreeAdded => "MediaSubItemTreeAdded",
            EventType::MediaThumbnailGenerated => "MediaThumbnailGenerated",
            EventType::MediaAttachedThumbnailsFound => "MediaAttachedThumbnailsFound",
            EventType::ListItemAdded => "ListItemAdded",
            EventType::ListWillAddItem => "ListWillAddItem",
            EventType::ListItemDeleted => "ListItemDeleted",
            EventType::ListWillDeleteItem => "ListWillDeleteItem",
            EventType::ListEndReached => "ListEndReached",
            EventType::ListPlayerPlayed => "ListPlayerPlayed",
            EventType::ListPlayerNextItemSet => "ListPlayerNextItemSet",
            EventType::ListPlayerStopped => "ListPlayerStopped",
            EventType::DiscovererStarted => "DiscovererStarted",
            EventType::DiscovererStopped => "DiscovererStopped",
        }
    }

    /// Check if this is a media item event.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            EventType::MediaMetaChanged
                | EventType::MediaSubItemAdded
                | EventType::MediaDurationChanged
                | EventType::MediaParsedChanged
                | EventType::MediaSubItemTreeAdded
                | EventType::MediaThumbnailGenerated
                | EventType::MediaAttachedThumbnailsFound
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific event data.
#[derive(Clone, Debug)]
pub enum EventPayload {
    /// Metadata changed. `None` means several keys may have changed.
    MediaMetaChanged { key: Option<MetaKey> },
    MediaSubItemAdded { item: Arc<Media> },
    /// Duration as known after the change; `None` when unknown.
    MediaDurationChanged { duration: Option<Millis> },
    MediaParsedChanged { status: ParseStatus },
    /// Sent once after a whole discovered tree has been attached.
    MediaSubItemTreeAdded { item: Arc<Media> },
    /// `None` when generation failed or the request was cancelled.
    MediaThumbnailGenerated { picture: Option<Arc<Picture>> },
    MediaAttachedThumbnailsFound { pictures: Arc<PictureList> },

    ListItemAdded { item: Arc<Media>, index: usize },
    ListWillAddItem { item: Arc<Media>, index: usize },
    ListItemDeleted { item: Arc<Media>, index: usize },
    ListWillDeleteItem { item: Arc<Media>, index: usize },
    ListEndReached,

    ListPlayerPlayed,
    ListPlayerNextItemSet { item: Arc<Media> },
    ListPlayerStopped,

    DiscovererStarted,
    DiscovererStopped,
}

impl EventPayload {
    /// Get the event type of this payload.
    pub fn kind(&self) -> EventType {
        match self {
            EventPayload::MediaMetaChanged { .. } => EventType::MediaMetaChanged,
            EventPayload::MediaSubItemAdded { .. } => EventType::MediaSubItemAdded,
            EventPayload::MediaDurationChanged { .. } => EventType::MediaDurationChanged,
            EventPayload::MediaParsedChanged { .. } => EventType::MediaParsedChanged,
            EventPayload::MediaSubItemTreeAdded { .. } => EventType::MediaSubItemTreeAdded,
            EventPayload::MediaThumbnailGenerated { .. } => EventType::MediaThumbnailGenerated,
            EventPayload::MediaAttachedThumbnailsFound { .. } => {
                EventType::MediaAttachedThumbnailsFound
            }
            EventPayload::ListItemAdded { .. } => EventType::ListItemAdded,
            EventPayload::ListWillAddItem { .. } => EventType::ListWillAddItem,
            EventPayload::ListItemDeleted { .. } => EventType::ListItemDeleted,
            EventPayload::ListWillDeleteItem { .. } => EventType::ListWillDeleteItem,
            EventPayload::ListEndReached => EventType::ListEndReached,
            EventPayload::ListPlayerPlayed => EventType::ListPlayerPlayed,
            EventPayload::ListPlayerNextItemSet { .. } => EventType::ListPlayerNextItemSet,
            EventPayload::ListPlayerStopped => EventType::ListPlayerStopped,
            EventPayload::DiscovererStarted => EventType::DiscovererStarted,
            EventPayload::DiscovererStopped => EventType::DiscovererStopped,
        }
    }
}

/// An event as delivered to listeners.
#[derive(Clone, Debug)]
pub struct Event {
    /// Identity of the emitting object.
    pub source: ObjectId,
    /// Event data.
    pub payload: EventPayload,
}

impl Event {
    /// Get the event type.
    pub fn kind(&self) -> EventType {
        self.payload.kind()
    }
}

/// Event listener callback type.
///
/// Listener identity is the event type plus the callback allocation: two
/// clones of the same `Arc` name the same listener, two separately created
/// closures never do. User data is whatever the closure captures.
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Listener {
    kind: EventType,
    callback: EventCallback,
}

impl Listener {
    fn matches(&self, kind: EventType, callback: &EventCallback) -> bool {
        self.kind == kind && same_callback(&self.callback, callback)
    }
}

fn same_callback(a: &EventCallback, b: &EventCallback) -> bool {
    // Compare allocations only; vtable pointers are not unique per type.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Publish/subscribe broadcaster owned by one object.
pub struct EventBus {
    owner: ObjectId,
    listeners: ReentrantMutex<RefCell<Vec<Listener>>>,
}

impl EventBus {
    /// Create a bus with no listeners for the given owner.
    pub fn new(owner: ObjectId) -> Self {
        Self {
            owner,
            listeners: ReentrantMutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Get the owner identity stamped on every sent event.
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Append a listener for `kind`.
    ///
    /// Attaching the same callback twice yields two deliveries per event.
    pub fn attach(&self, kind: EventType, callback: EventCallback) -> MediaResult<()> {
        let guard = self.listeners.lock();
        let mut listeners = guard.borrow_mut();
        listeners
            .try_reserve(1)
            .map_err(|_| MediaError::oom("event listener storage"))?;
        listeners.push(Listener { kind, callback });
        tracing::trace!(owner = %self.owner, %kind, "listener attached");
        Ok(())
    }

    /// Remove the first listener matching `kind` and `callback`.
    ///
    /// # Panics
    ///
    /// Panics if no such listener is attached. Detaching twice, or detaching
    /// something never attached, is a lifetime bug in the caller.
    pub fn detach(&self, kind: EventType, callback: &EventCallback) {
        let guard = self.listeners.lock();
        let mut listeners = guard.borrow_mut();
        match listeners.iter().position(|l| l.matches(kind, callback)) {
            Some(index) => {
                listeners.remove(index);
                tracing::trace!(owner = %self.owner, %kind, "listener detached");
            }
            None => {
                drop(listeners);
                drop(guard);
                tracing::error!(owner = %self.owner, %kind, "detaching unknown listener");
                panic!("event listener for {} was never attached to {}", kind, self.owner);
            }
        }
    }

    /// Number of attached listeners, all kinds included.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().borrow().len()
    }

    /// Deliver `payload` to every listener of its kind, in attachment order.
    pub fn send(&self, payload: EventPayload) {
        let event = Event {
            source: self.owner,
            payload,
        };
        let kind = event.kind();
        tracing::trace!(owner = %self.owner, %kind, "send");

        let guard = self.listeners.lock();
        let mut index = 0;
        loop {
            // The borrow ends before the call so listeners can re-enter.
            let callback = {
                let listeners = guard.borrow();
                match listeners.get(index) {
                    Some(listener) if listener.kind == kind => Some(listener.callback.clone()),
                    Some(_) => None,
                    None => break,
                }
            };
            index += 1;
            if let Some(callback) = callback {
                callback(&event);
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("owner", &self.owner)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, EventCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let callback: EventCallback = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, callback)
    }

    #[test]
    fn test_attach_then_send() {
        let owner = ObjectId::next();
        let bus = EventBus::new(owner);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let callback: EventCallback = Arc::new(move |event: &Event| {
            sink.lock().push(event.clone());
        });
        bus.attach(EventType::MediaParsedChanged, callback).unwrap();

        bus.send(EventPayload::MediaParsedChanged {
            status: ParseStatus::Done,
        });

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].source, owner);
        assert!(matches!(
            received[0].payload,
            EventPayload::MediaParsedChanged {
                status: ParseStatus::Done
            }
        ));
    }

    #[test]
    fn test_detach_then_send() {
        let bus = EventBus::new(ObjectId::next());
        let (hits, callback) = counter();
        bus.attach(EventType::ListEndReached, callback.clone()).unwrap();
        bus.detach(EventType::ListEndReached, &callback);

        bus.send(EventPayload::ListEndReached);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_kind_filtering() {
        let bus = EventBus::new(ObjectId::next());
        let (hits, callback) = counter();
        bus.attach(EventType::ListEndReached, callback).unwrap();

        bus.send(EventPayload::ListPlayerStopped);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.send(EventPayload::ListEndReached);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_attach_delivers_twice() {
        let bus = EventBus::new(ObjectId::next());
        let (hits, callback) = counter();
        bus.attach(EventType::ListEndReached, callback.clone()).unwrap();
        bus.attach(EventType::ListEndReached, callback.clone()).unwrap();

        bus.send(EventPayload::ListEndReached);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        // Only the first match goes away.
        bus.detach(EventType::ListEndReached, &callback);
        bus.send(EventPayload::ListEndReached);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_same_callback_different_kind_is_distinct() {
        let bus = EventBus::new(ObjectId::next());
        let (_hits, callback) = counter();
        bus.attach(EventType::ListItemAdded, callback.clone()).unwrap();
        bus.attach(EventType::ListItemDeleted, callback.clone()).unwrap();

        bus.detach(EventType::ListItemDeleted, &callback);
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    #[should_panic(expected = "never attached")]
    fn test_detach_unknown_panics() {
        let bus = EventBus::new(ObjectId::next());
        let (_hits, callback) = counter();
        bus.detach(EventType::ListEndReached, &callback);
    }

    #[test]
    #[should_panic(expected = "never attached")]
    fn test_double_detach_panics() {
        let bus = EventBus::new(ObjectId::next());
        let (_hits, callback) = counter();
        bus.attach(EventType::ListEndReached, callback.clone()).unwrap();
        bus.detach(EventType::ListEndReached, &callback);
        bus.detach(EventType::ListEndReached, &callback);
    }

    #[test]
    fn test_listener_can_reenter_bus() {
        let bus = Arc::new(EventBus::new(ObjectId::next()));
        let (late_hits, late) = counter();

        let self_slot: Arc<Mutex<Option<EventCallback>>> = Arc::new(Mutex::new(None));
        let weak_bus = Arc::downgrade(&bus);
        let slot = self_slot.clone();
        let once: EventCallback = Arc::new(move |_| {
            let Some(bus) = weak_bus.upgrade() else { return };
            // Replace ourselves with another listener while being delivered.
            if let Some(me) = slot.lock().take() {
                bus.detach(EventType::ListEndReached, &me);
                bus.attach(EventType::ListEndReached, late.clone()).unwrap();
            }
        });
        *self_slot.lock() = Some(once.clone());
        bus.attach(EventType::ListEndReached, once).unwrap();

        bus.send(EventPayload::ListEndReached);
        assert_eq!(bus.listener_count(), 1);

        bus.send(EventPayload::ListEndReached);
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delivery_order() {
        let bus = EventBus::new(ObjectId::next());
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let order = order.clone();
            let callback: EventCallback = Arc::new(move |_| order.lock().push(tag));
            bus.attach(EventType::DiscovererStarted, callback).unwrap();
        }
        bus.send(EventPayload::DiscovererStarted);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
