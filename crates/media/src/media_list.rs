//! Ordered, lockable collections of media items.

use crate::event::{EventBus, EventPayload};
use crate::media::Media;
use common::{MediaError, MediaResult, ObjectId};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// An ordered collection of media items.
///
/// Items are held strongly while they are in the list. Positional access
/// goes through [`MediaList::lock`]; the lock is not reentrant, so listeners
/// of this list's bus must not lock the list again. Mutation events are sent
/// while the lock is held.
pub struct MediaList {
    id: ObjectId,
    bus: EventBus,
    items: Mutex<Vec<Arc<Media>>>,
    read_only: AtomicBool,
    /// Item whose sub-items this list holds.
    owner: OnceCell<Weak<Media>>,
    /// Item carrying the metadata of a user list.
    media: Mutex<Option<Arc<Media>>>,
}

impl MediaList {
    /// Create an empty writable list.
    pub fn new() -> Arc<Self> {
        let id = ObjectId::next();
        Arc::new(Self {
            id,
            bus: EventBus::new(id),
            items: Mutex::new(Vec::new()),
            read_only: AtomicBool::new(false),
            owner: OnceCell::new(),
            media: Mutex::new(None),
        })
    }

    /// Create the read-only sub-item list of `owner`.
    pub(crate) fn new_subitems(owner: Weak<Media>) -> Arc<Self> {
        let list = Self::new();
        list.read_only.store(true, Ordering::Release);
        let _ = list.owner.set(owner);
        list
    }

    /// Get this list's identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Check if callers may mutate this list.
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    pub(crate) fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    /// Lock the list for positional access.
    pub fn lock(&self) -> MediaListGuard<'_> {
        MediaListGuard {
            list: self,
            items: self.items.lock(),
        }
    }

    /// Set the item carrying this list's own metadata.
    ///
    /// Refused for sub-item and read-only lists.
    pub fn set_media(&self, media: Option<Arc<Media>>) -> MediaResult<()> {
        if self.owner.get().is_some() || self.is_read_only() {
            tracing::warn!(list = %self.id, "attempt to set the media of a read-only list");
            return Err(MediaError::read_only("media list"));
        }
        *self.media.lock() = media;
        Ok(())
    }

    /// Get the item carrying this list's metadata.
    ///
    /// For a sub-item list this is the owning item.
    pub fn media(&self) -> Option<Arc<Media>> {
        match self.owner.get() {
            Some(owner) => owner.upgrade(),
            None => self.media.lock().clone(),
        }
    }

    /// Snapshot of the current items.
    pub fn items(&self) -> Vec<Arc<Media>> {
        self.items.lock().clone()
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<Arc<Media>> {
        self.items.get_mut()
    }

    /// Publish end of list, after the owning parse finished.
    pub(crate) fn end_reached(&self) {
        let _items = self.items.lock();
        self.bus.send(EventPayload::ListEndReached);
    }
}

impl fmt::Debug for MediaList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaList")
            .field("id", &self.id)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

/// Exclusive access to a [`MediaList`].
pub struct MediaListGuard<'a> {
    list: &'a MediaList,
    items: MutexGuard<'a, Vec<Arc<Media>>>,
}

impl<'a> MediaListGuard<'a> {
    /// Number of items.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the locked items.
    pub fn items(&self) -> &[Arc<Media>] {
        &self.items
    }

    /// Append an item.
    pub fn add_media(&mut self, media: Arc<Media>) -> MediaResult<()> {
        self.check_writable()?;
        self.internal_add(media);
        Ok(())
    }

    /// Insert an item at `index`.
    pub fn insert_media(&mut self, media: Arc<Media>, index: usize) -> MediaResult<()> {
        self.check_writable()?;
        self.internal_insert(media, index)
    }

    /// Remove the item at `index`.
    pub fn remove_index(&mut self, index: usize) -> MediaResult<Arc<Media>> {
        self.check_writable()?;
        self.internal_remove(index)
    }

    /// Get the item at `index`.
    pub fn item_at_index(&self, index: usize) -> MediaResult<Arc<Media>> {
        self.items.get(index).cloned().ok_or_else(|| {
            tracing::debug!(list = %self.list.id, index, "index out of bounds");
            MediaError::out_of_bounds(index, self.items.len())
        })
    }

    /// Find the position of `media`, by identity.
    pub fn index_of_item(&self, media: &Arc<Media>) -> Option<usize> {
        self.items.iter().position(|item| Arc::ptr_eq(item, media))
    }

    pub(crate) fn internal_add(&mut self, media: Arc<Media>) {
        let index = self.items.len();
        self.notify_will_add(&media, index);
        self.items.push(media.clone());
        self.list
            .bus
            .send(EventPayload::ListItemAdded { item: media, index });
    }

    pub(crate) fn internal_insert(&mut self, media: Arc<Media>, index: usize) -> MediaResult<()> {
        if index > self.items.len() {
            return Err(MediaError::out_of_bounds(index, self.items.len()));
        }
        self.notify_will_add(&media, index);
        self.items.insert(index, media.clone());
        self.list
            .bus
            .send(EventPayload::ListItemAdded { item: media, index });
        Ok(())
    }

    pub(crate) fn internal_remove(&mut self, index: usize) -> MediaResult<Arc<Media>> {
        let media = self.item_at_index(index)?;
        self.list.bus.send(EventPayload::ListWillDeleteItem {
            item: media.clone(),
            index,
        });
        self.items.remove(index);
        self.list.bus.send(EventPayload::ListItemDeleted {
            item: media.clone(),
            index,
        });
        Ok(media)
    }

    fn notify_will_add(&self, media: &Arc<Media>, index: usize) {
        self.list.bus.send(EventPayload::ListWillAddItem {
            item: media.clone(),
            index,
        });
    }

    fn check_writable(&self) -> MediaResult<()> {
        if self.list.is_read_only() {
            tracing::warn!(list = %self.list.id, "attempt to write a read-only media list");
            return Err(MediaError::read_only("media list"));
        }
        Ok(())
    }
}
