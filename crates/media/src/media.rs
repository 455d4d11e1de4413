//! Media items.

use crate::event::{EventBus, EventPayload};
use crate::handle::AsyncOps;
use crate::location::{ItemType, Location, MediaType};
use crate::media_list::MediaList;
use crate::meta::{MetaKey, MetaStore};
use crate::preparse::{ParseState, ParseStatus};
use crate::track::{self, Fourcc, Track, TrackType};
use crate::worker::ItemDescriptor;
use bitflags::bitflags;
use common::{MediaError, MediaResult, Millis, ObjectId};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Opaque data attached to an item by its user.
pub type UserData = Arc<dyn Any + Send + Sync>;

bitflags! {
    /// Flags of an input option.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OptionFlags: u32 {
        /// The option may change security-sensitive settings.
        const TRUSTED = 0x2;
        /// Do not add the option if it is already present.
        const UNIQUE = 0x100;
    }
}

/// An input option such as `:no-audio`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaOption {
    pub text: String,
    pub flags: OptionFlags,
}

/// Type of a slave input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlaveType {
    Subtitle,
    Generic,
}

/// An additional input played along with the item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slave {
    pub slave_type: SlaveType,
    /// 0 (lowest) to 4 (highest).
    pub priority: u8,
    pub uri: String,
}

impl Slave {
    pub const MAX_PRIORITY: u8 = 4;
}

/// File statistic selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStatKind {
    /// Modification time, in seconds since the epoch.
    Mtime,
    /// Size in bytes.
    Size,
}

/// File statistics gathered by the preparser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileStat {
    pub mtime: Option<u64>,
    pub size: Option<u64>,
}

/// Everything describing an item apart from its runtime state.
#[derive(Clone, Debug)]
pub(crate) struct Descriptor {
    pub(crate) location: Location,
    pub(crate) name: Option<String>,
    pub(crate) item_type: ItemType,
    pub(crate) options: Vec<MediaOption>,
    pub(crate) meta: MetaStore,
    pub(crate) slaves: Vec<Slave>,
    pub(crate) duration: Option<Millis>,
    pub(crate) tracks: Vec<Track>,
    pub(crate) file_stat: FileStat,
}

impl Descriptor {
    fn new(location: Location) -> Self {
        let item_type = location.item_type();
        Self {
            location,
            name: None,
            item_type,
            options: Vec::new(),
            meta: MetaStore::new(),
            slaves: Vec::new(),
            duration: None,
            tracks: Vec::new(),
            file_stat: FileStat::default(),
        }
    }
}

/// A media item.
///
/// Shared through `Arc`. In-flight parse jobs hold their own reference, so
/// an item stays valid for its completion even after every caller dropped
/// theirs; [`Media::release`] additionally waits for that completion.
pub struct Media {
    id: ObjectId,
    bus: EventBus,
    descriptor: RwLock<Descriptor>,
    subitems: Arc<MediaList>,
    pub(crate) parse: ParseState,
    ops: Arc<AsyncOps>,
    user_data: RwLock<Option<UserData>>,
}

impl Media {
    fn with_descriptor_state(descriptor: Descriptor) -> Arc<Self> {
        let id = ObjectId::next();
        Arc::new_cyclic(|weak| Self {
            id,
            bus: EventBus::new(id),
            descriptor: RwLock::new(descriptor),
            subitems: MediaList::new_subitems(weak.clone()),
            parse: ParseState::new(),
            ops: Arc::new(AsyncOps::new()),
            user_data: RwLock::new(None),
        })
    }

    /// Create an item from a location string.
    pub fn new_location(mrl: &str) -> MediaResult<Arc<Self>> {
        Ok(Self::from_location(Location::parse(mrl)?))
    }

    /// Create an item for a filesystem path.
    pub fn new_path(path: impl AsRef<Path>) -> MediaResult<Arc<Self>> {
        Ok(Self::from_location(Location::from_path(path)?))
    }

    /// Create an item for an already open file descriptor.
    pub fn new_fd(fd: i32) -> MediaResult<Arc<Self>> {
        Ok(Self::from_location(Location::from_fd(fd)?))
    }

    /// Create an empty named node.
    pub fn new_as_node(name: &str) -> Arc<Self> {
        let mut descriptor = Descriptor::new(Location::node());
        descriptor.name = Some(name.to_string());
        Self::with_descriptor_state(descriptor)
    }

    pub fn from_location(location: Location) -> Arc<Self> {
        Self::with_descriptor_state(Descriptor::new(location))
    }

    pub(crate) fn from_descriptor(item: &ItemDescriptor) -> Arc<Self> {
        let mut descriptor = Descriptor::new(item.location.clone());
        descriptor.name = item.name.clone();
        descriptor.item_type = item.item_type;
        descriptor.meta = item.meta.clone();
        descriptor.duration = item.duration;
        Self::with_descriptor_state(descriptor)
    }

    /// Create a fresh item with the same description and no parse history.
    pub fn duplicate(&self) -> Arc<Self> {
        Self::with_descriptor_state(self.descriptor.read().clone())
    }

    /// Release this handle after every asynchronous operation started on
    /// the item has completed.
    ///
    /// Blocks for as long as the longest pending request, forever if one
    /// has no deadline. Must not be called from a listener of this item's
    /// own completion events.
    pub fn release(self: Arc<Self>) {
        self.ops.wait_idle();
        tracing::trace!(media = %self.id, "released");
    }

    /// Get this item's identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Get the read-only list of sub-items.
    pub fn subitems(&self) -> Arc<MediaList> {
        self.subitems.clone()
    }

    pub(crate) fn ops(&self) -> &Arc<AsyncOps> {
        &self.ops
    }

    pub(crate) fn with_descriptor<R>(&self, f: impl FnOnce(&mut Descriptor) -> R) -> R {
        f(&mut *self.descriptor.write())
    }

    /// Get the location string.
    pub fn mrl(&self) -> String {
        self.descriptor.read().location.mrl().to_string()
    }

    pub fn location(&self) -> Location {
        self.descriptor.read().location.clone()
    }

    /// Get the display name; defaults to the last location component.
    pub fn name(&self) -> String {
        let descriptor = self.descriptor.read();
        descriptor
            .name
            .clone()
            .unwrap_or_else(|| descriptor.location.default_name())
    }

    pub fn item_type(&self) -> ItemType {
        self.descriptor.read().item_type
    }

    /// Get the media type.
    pub fn media_type(&self) -> MediaType {
        self.item_type().into()
    }

    /// Add an option, unless already present.
    pub fn add_option(&self, option: &str) {
        self.add_option_flag(option, OptionFlags::UNIQUE | OptionFlags::TRUSTED);
    }

    /// Add an option with explicit flags.
    pub fn add_option_flag(&self, option: &str, flags: OptionFlags) {
        let mut descriptor = self.descriptor.write();
        if flags.contains(OptionFlags::UNIQUE)
            && descriptor.options.iter().any(|o| o.text == option)
        {
            return;
        }
        descriptor.options.push(MediaOption {
            text: option.to_string(),
            flags,
        });
    }

    pub fn options(&self) -> Vec<MediaOption> {
        self.descriptor.read().options.clone()
    }

    /// Get a metadata value. The title falls back to the item name.
    pub fn meta(&self, key: MetaKey) -> Option<String> {
        let descriptor = self.descriptor.read();
        match descriptor.meta.get(key) {
            Some(value) => Some(value.to_string()),
            None if key == MetaKey::Title => {
                drop(descriptor);
                let name = self.name();
                (!name.is_empty()).then_some(name)
            }
            None => None,
        }
    }

    /// Set or clear a metadata value.
    pub fn set_meta(&self, key: MetaKey, value: Option<&str>) {
        let changed = self
            .descriptor
            .write()
            .meta
            .set(key, value.map(str::to_string));
        if changed {
            self.bus
                .send(EventPayload::MediaMetaChanged { key: Some(key) });
        }
    }

    pub fn extra_meta(&self, name: &str) -> Option<String> {
        self.descriptor.read().meta.extra(name).map(str::to_string)
    }

    pub fn set_extra_meta(&self, name: &str, value: Option<&str>) {
        self.descriptor
            .write()
            .meta
            .set_extra(name, value.map(str::to_string));
    }

    pub fn extra_meta_names(&self) -> Vec<String> {
        self.descriptor.read().meta.extra_names()
    }

    /// Get the duration, once a parse succeeded.
    pub fn duration(&self) -> Option<Millis> {
        if self.parsed_status() != ParseStatus::Done {
            return None;
        }
        self.raw_duration()
    }

    pub(crate) fn raw_duration(&self) -> Option<Millis> {
        self.descriptor.read().duration
    }

    /// Get a file statistic, if the preparser found it.
    pub fn file_stat(&self, kind: FileStatKind) -> Option<u64> {
        let stat = self.descriptor.read().file_stat;
        match kind {
            FileStatKind::Mtime => stat.mtime,
            FileStatKind::Size => stat.size,
        }
    }

    /// Add a slave input.
    pub fn add_slave(&self, slave_type: SlaveType, priority: u8, uri: &str) -> MediaResult<()> {
        if priority > Slave::MAX_PRIORITY {
            return Err(MediaError::invalid(format!("slave priority {}", priority)));
        }
        Location::parse(uri)?;
        self.descriptor.write().slaves.push(Slave {
            slave_type,
            priority,
            uri: uri.to_string(),
        });
        Ok(())
    }

    pub fn clear_slaves(&self) {
        self.descriptor.write().slaves.clear();
    }

    pub fn slaves(&self) -> Vec<Slave> {
        self.descriptor.read().slaves.clone()
    }

    pub fn user_data(&self) -> Option<UserData> {
        self.user_data.read().clone()
    }

    pub fn set_user_data(&self, data: Option<UserData>) {
        *self.user_data.write() = data;
    }

    /// Get the tracks of one type.
    pub fn tracks(&self, track_type: TrackType) -> Vec<Track> {
        self.descriptor
            .read()
            .tracks
            .iter()
            .filter(|t| t.track_type() == track_type)
            .cloned()
            .collect()
    }

    /// Get a human-readable codec name.
    pub fn codec_description(track_type: TrackType, codec: Fourcc) -> &'static str {
        track::codec_description(track_type, codec)
    }
}

impl Drop for Media {
    fn drop(&mut self) {
        // Unlink uniquely owned descendants one level at a time so that
        // deep trees are freed without recursion.
        let Some(list) = Arc::get_mut(&mut self.subitems) else {
            return;
        };
        let mut orphans = std::mem::take(list.items_mut());
        while let Some(child) = orphans.pop() {
            if let Ok(mut child) = Arc::try_unwrap(child) {
                if let Some(list) = Arc::get_mut(&mut child.subitems) {
                    orphans.append(list.items_mut());
                }
            }
        }
    }
}

impl fmt::Debug for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Media")
            .field("id", &self.id)
            .field("mrl", &self.mrl())
            .field("status", &self.parsed_status())
            .finish()
    }
}
