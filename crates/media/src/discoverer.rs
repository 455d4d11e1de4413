//! Media discoverers: named services filling a read-only list.

use crate::event::{EventBus, EventPayload};
use crate::instance::Instance;
use crate::media::Media;
use crate::media_list::MediaList;
use crate::worker::ItemDescriptor;
use common::{MediaError, MediaResult, ObjectId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Category of a discovery service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscovererCategory {
    /// Devices such as discs or cameras.
    Devices,
    /// Network shares and servers.
    Lan,
    /// Podcasts.
    Podcasts,
    /// Local directories such as the music folder.
    LocalDirs,
}

/// Description of a registered discovery service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub long_name: String,
    pub category: DiscovererCategory,
}

/// A discovery service implementation.
pub trait DiscoveryModule: Send + Sync {
    /// Short name used to look the module up.
    fn name(&self) -> &str;

    fn long_name(&self) -> &str;

    fn category(&self) -> DiscovererCategory;

    /// Start discovering. Items are reported through `sink` from any thread
    /// until the returned session is closed.
    fn open(&self, sink: DiscoverySink) -> MediaResult<Box<dyn DiscoverySession>>;
}

/// A running discovery.
pub trait DiscoverySession: Send {
    /// Stop discovering. The sink ignores reports made after this returns.
    fn close(&mut self);
}

/// Receiver of the items found by a discovery session.
#[derive(Clone)]
pub struct DiscoverySink {
    list: Arc<MediaList>,
    active: Arc<AtomicBool>,
}

impl DiscoverySink {
    /// Check if the discoverer still accepts reports.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Report a found item.
    pub fn add_item(&self, media: Arc<Media>) {
        if !self.is_active() {
            return;
        }
        self.list.lock().internal_add(media);
    }

    /// Report a found item by description. Returns the created item.
    pub fn add_descriptor(&self, descriptor: &ItemDescriptor) -> Arc<Media> {
        let media = Media::from_descriptor(descriptor);
        self.add_item(media.clone());
        media
    }

    /// Report that an item disappeared.
    pub fn remove_item(&self, media: &Arc<Media>) -> bool {
        if !self.is_active() {
            return false;
        }
        let mut items = self.list.lock();
        match items.index_of_item(media) {
            Some(index) => items.internal_remove(index).is_ok(),
            None => false,
        }
    }
}

impl fmt::Debug for DiscoverySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverySink")
            .field("list", &self.list.id())
            .field("active", &self.is_active())
            .finish()
    }
}

struct Running {
    session: Box<dyn DiscoverySession>,
    active: Arc<AtomicBool>,
}

/// A named discoverer bound to an instance.
///
/// Dropping a running discoverer stops it.
pub struct MediaDiscoverer {
    id: ObjectId,
    bus: EventBus,
    name: String,
    instance: Arc<Instance>,
    list: Arc<MediaList>,
    running: Mutex<Option<Running>>,
}

impl MediaDiscoverer {
    /// Create a discoverer for the module called `name`.
    ///
    /// Podcast services are not supported.
    pub fn new(instance: &Arc<Instance>, name: &str) -> MediaResult<Self> {
        if name.starts_with("podcast") {
            return Err(MediaError::unsupported(format!("discoverer {}", name)));
        }
        let list = MediaList::new();
        list.set_read_only(true);
        let id = ObjectId::next();
        Ok(Self {
            id,
            bus: EventBus::new(id),
            name: name.to_string(),
            instance: instance.clone(),
            list,
            running: Mutex::new(None),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Get the list of discovered items.
    pub fn media_list(&self) -> Arc<MediaList> {
        self.list.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start discovering. Starting a running discoverer does nothing.
    pub fn start(&self) -> MediaResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }
        let module = self
            .instance
            .discovery_module(&self.name)
            .ok_or_else(|| MediaError::not_found(format!("discovery module {}", self.name)))?;

        let active = Arc::new(AtomicBool::new(true));
        let sink = DiscoverySink {
            list: self.list.clone(),
            active: active.clone(),
        };
        let session = module.open(sink)?;
        *running = Some(Running { session, active });
        drop(running);

        tracing::debug!(discoverer = %self.id, name = %self.name, "started");
        self.bus.send(EventPayload::DiscovererStarted);
        Ok(())
    }

    /// Stop discovering. Found items stay in the list.
    pub fn stop(&self) {
        let Some(mut running) = self.running.lock().take() else {
            return;
        };
        self.list.end_reached();
        running.active.store(false, Ordering::Release);
        running.session.close();

        tracing::debug!(discoverer = %self.id, name = %self.name, "stopped");
        self.bus.send(EventPayload::DiscovererStopped);
    }
}

impl Drop for MediaDiscoverer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for MediaDiscoverer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaDiscoverer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::event::{Event, EventCallback, EventType};
    use crate::location::Location;
    use crate::testing::StaticDiscovery;

    fn setup() -> (Arc<StaticDiscovery>, Arc<Instance>) {
        let module = StaticDiscovery::new("music", DiscovererCategory::LocalDirs);
        let instance = Instance::builder(InstanceConfig::default())
            .with_discovery_module(module.clone())
            .build();
        (module, instance)
    }

    fn record(bus: &EventBus, kinds: &[EventType]) -> Arc<Mutex<Vec<EventType>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in kinds {
            let sink = seen.clone();
            let callback: EventCallback = Arc::new(move |event: &Event| sink.lock().push(event.kind()));
            bus.attach(*kind, callback).unwrap();
        }
        seen
    }

    #[test]
    fn test_podcasts_rejected() {
        let (_, instance) = setup();
        assert!(matches!(
            MediaDiscoverer::new(&instance, "podcast"),
            Err(MediaError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unknown_module() {
        let (_, instance) = setup();
        let discoverer = MediaDiscoverer::new(&instance, "nope").unwrap();
        assert!(matches!(discoverer.start(), Err(MediaError::NotFound(_))));
        assert!(!discoverer.is_running());
    }

    #[test]
    fn test_start_stop() {
        let (module, instance) = setup();
        let discoverer = MediaDiscoverer::new(&instance, "music").unwrap();
        let events = record(
            discoverer.event_bus(),
            &[EventType::DiscovererStarted, EventType::DiscovererStopped],
        );
        let list = discoverer.media_list();
        let list_events = record(list.event_bus(), &[EventType::ListEndReached]);
        assert!(list.is_read_only());

        discoverer.start().unwrap();
        discoverer.start().unwrap();
        assert!(discoverer.is_running());

        let sink = module.sink().unwrap();
        let song = sink.add_descriptor(&ItemDescriptor::new(
            Location::parse("file:///music/a.ogg").unwrap(),
        ));
        sink.add_item(Media::new_as_node("b"));
        assert_eq!(list.lock().count(), 2);
        assert!(sink.remove_item(&song));
        assert!(!sink.remove_item(&song));
        assert_eq!(list.lock().count(), 1);

        discoverer.stop();
        assert!(!discoverer.is_running());
        assert_eq!(module.closed(), 1);
        sink.add_item(Media::new_as_node("late"));
        assert_eq!(list.lock().count(), 1);

        assert_eq!(
            *events.lock(),
            vec![EventType::DiscovererStarted, EventType::DiscovererStopped]
        );
        assert_eq!(list_events.lock().len(), 1);
    }

    #[test]
    fn test_drop_stops() {
        let (module, instance) = setup();
        let discoverer = MediaDiscoverer::new(&instance, "music").unwrap();
        discoverer.start().unwrap();
        drop(discoverer);
        assert_eq!(module.closed(), 1);
    }
}
