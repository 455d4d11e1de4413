//! Sequential navigation over a tree of lists.
//!
//! The navigator walks its root list in pre-order: an item with sub-items
//! is followed by its first sub-item, the last sub-item of a list by the
//! next sibling of its owner. Playback itself is left to a
//! [`PlaybackSink`].

use crate::event::{EventBus, EventPayload};
use crate::list_path::{self, ListPath};
use crate::media::Media;
use crate::media_list::MediaList;
use common::{MediaError, MediaResult, ObjectId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// How the navigator behaves at the ends of the list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Stop after the last item.
    #[default]
    Default,
    /// Wrap around at either end.
    Loop,
    /// Keep playing the current item.
    Repeat,
}

/// Receiver of the items the navigator selects.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, media: &Arc<Media>);

    fn stop(&self);
}

#[derive(Default)]
struct State {
    list: Option<Arc<MediaList>>,
    current: Option<ListPath>,
    mode: PlaybackMode,
}

/// Navigator over a list and its sub-items.
pub struct ListPlayer {
    id: ObjectId,
    bus: EventBus,
    state: Mutex<State>,
    sink: Mutex<Option<Arc<dyn PlaybackSink>>>,
}

impl ListPlayer {
    pub fn new() -> Self {
        let id = ObjectId::next();
        Self {
            id,
            bus: EventBus::new(id),
            state: Mutex::new(State::default()),
            sink: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Set the list to walk. Resets the position.
    pub fn set_media_list(&self, list: Arc<MediaList>) {
        let mut state = self.state.lock();
        state.list = Some(list);
        state.current = None;
    }

    pub fn media_list(&self) -> Option<Arc<MediaList>> {
        self.state.lock().list.clone()
    }

    pub fn set_sink(&self, sink: Option<Arc<dyn PlaybackSink>>) {
        *self.sink.lock() = sink;
    }

    pub fn set_playback_mode(&self, mode: PlaybackMode) {
        self.state.lock().mode = mode;
    }

    pub fn playback_mode(&self) -> PlaybackMode {
        self.state.lock().mode
    }

    /// Path of the current item.
    pub fn current_path(&self) -> Option<ListPath> {
        self.state.lock().current.clone()
    }

    /// Get the current item.
    pub fn current_item(&self) -> Option<Arc<Media>> {
        let state = self.state.lock();
        let list = state.list.as_ref()?;
        list_path::item_at_path(list, state.current.as_ref()?)
    }

    /// Play the current item, or the first one if none was selected.
    pub fn play(&self) -> MediaResult<Arc<Media>> {
        match self.current_item() {
            Some(media) => {
                self.start(&media);
                Ok(media)
            }
            None => self.next(),
        }
    }

    /// Move to the next item and play it.
    pub fn next(&self) -> MediaResult<Arc<Media>> {
        self.step(Direction::Next)
    }

    /// Move to the previous item and play it.
    pub fn previous(&self) -> MediaResult<Arc<Media>> {
        self.step(Direction::Previous)
    }

    /// Play the item at `index` of the root list.
    pub fn play_item_at(&self, index: usize) -> MediaResult<Arc<Media>> {
        let list = self.list()?;
        let path = ListPath::with_root_index(index);
        let media = list_path::item_at_path(&list, &path)
            .ok_or_else(|| MediaError::out_of_bounds(index, list.lock().count()))?;
        self.select(path, media)
    }

    /// Play `media`, wherever it is in the tree.
    pub fn play_item(&self, media: &Arc<Media>) -> MediaResult<Arc<Media>> {
        let list = self.list()?;
        let path = list_path::path_of_item(&list, media)
            .ok_or_else(|| MediaError::not_found(format!("media {} in list", media.id())))?;
        self.select(path, media.clone())
    }

    /// Stop playback and forget the position.
    pub fn stop(&self) {
        self.state.lock().current = None;
        if let Some(sink) = self.sink.lock().clone() {
            sink.stop();
        }
        self.bus.send(EventPayload::ListPlayerStopped);
    }

    /// Advance after the current item finished playing.
    ///
    /// Publishes `ListPlayerPlayed` when the end of the list is reached.
    pub fn item_end_reached(&self) {
        if self.next().is_err() {
            tracing::debug!(player = %self.id, "end of list");
            self.state.lock().current = None;
            self.bus.send(EventPayload::ListPlayerPlayed);
        }
    }

    fn list(&self) -> MediaResult<Arc<MediaList>> {
        self.media_list()
            .ok_or_else(|| MediaError::not_found("no media list set"))
    }

    fn step(&self, direction: Direction) -> MediaResult<Arc<Media>> {
        let (list, current, mode) = {
            let state = self.state.lock();
            let list = state
                .list
                .clone()
                .ok_or_else(|| MediaError::not_found("no media list set"))?;
            (list, state.current.clone(), state.mode)
        };

        let path = match (mode, current) {
            (PlaybackMode::Repeat, Some(current)) => Some(current),
            (mode, current) => {
                let wrap = mode == PlaybackMode::Loop;
                match direction {
                    Direction::Next => next_path(&list, current.as_ref(), wrap),
                    Direction::Previous => previous_path(&list, current.as_ref(), wrap),
                }
            }
        };
        let path = path.ok_or_else(|| MediaError::not_found("no item to play"))?;
        let media = list_path::item_at_path(&list, &path)
            .ok_or_else(|| MediaError::not_found(format!("no item at {}", path)))?;
        self.select(path, media)
    }

    fn select(&self, path: ListPath, media: Arc<Media>) -> MediaResult<Arc<Media>> {
        tracing::debug!(player = %self.id, %path, media = %media.id(), "item selected");
        self.state.lock().current = Some(path);
        self.bus
            .send(EventPayload::ListPlayerNextItemSet { item: media.clone() });
        self.start(&media);
        Ok(media)
    }

    fn start(&self, media: &Arc<Media>) {
        if let Some(sink) = self.sink.lock().clone() {
            sink.play(media);
        }
    }
}

impl Default for ListPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ListPlayer")
            .field("id", &self.id)
            .field("current", &state.current)
            .field("mode", &state.mode)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Next,
    Previous,
}

fn count_at(list: &Arc<MediaList>, path: &ListPath) -> usize {
    list_path::parent_list_at_path(list, path)
        .map(|parent| parent.lock().count())
        .unwrap_or(0)
}

/// Pre-order successor of `current`.
fn next_path(root: &Arc<MediaList>, current: Option<&ListPath>, wrap: bool) -> Option<ListPath> {
    let Some(current) = current else {
        return (root.lock().count() > 0).then(|| ListPath::with_root_index(0));
    };

    // Descend into sub-items first.
    if let Some(sublist) = list_path::sublist_at_path(root, current) {
        if sublist.lock().count() > 0 {
            return Some(current.copy_by_appending(0));
        }
    }

    let mut path = current.clone();
    loop {
        let last = path.last()?;
        path.set_last(last + 1);
        if last + 1 < count_at(root, &path) {
            return Some(path);
        }
        path.pop();
        if path.is_empty() {
            return (wrap && root.lock().count() > 0).then(|| ListPath::with_root_index(0));
        }
    }
}

/// Pre-order predecessor of `current`.
fn previous_path(root: &Arc<MediaList>, current: Option<&ListPath>, wrap: bool) -> Option<ListPath> {
    let Some(current) = current else {
        return (root.lock().count() > 0).then(|| ListPath::with_root_index(0));
    };

    let last = current.last()?;
    if last > 0 {
        let mut path = current.clone();
        path.set_last(last - 1);
        return Some(last_leaf(root, path));
    }
    if current.depth() > 1 {
        let mut parent = current.clone();
        parent.pop();
        return Some(parent);
    }
    if !wrap {
        return None;
    }
    let count = root.lock().count();
    (count > 0).then(|| last_leaf(root, ListPath::with_root_index(count - 1)))
}

/// Deepest last descendant of the item at `path`.
fn last_leaf(root: &Arc<MediaList>, mut path: ListPath) -> ListPath {
    while let Some(sublist) = list_path::sublist_at_path(root, &path) {
        let count = sublist.lock().count();
        if count == 0 {
            break;
        }
        path.append(count - 1);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventCallback, EventType};

    /// root: [a, b[b0, b1], c]
    fn setup() -> (ListPlayer, Arc<MediaList>) {
        let root = MediaList::new();
        let b = Media::new_as_node("b");
        for name in ["b0", "b1"] {
            b.subitems().lock().internal_add(Media::new_as_node(name));
        }
        {
            let mut guard = root.lock();
            guard.add_media(Media::new_as_node("a")).unwrap();
            guard.add_media(b).unwrap();
            guard.add_media(Media::new_as_node("c")).unwrap();
        }
        let player = ListPlayer::new();
        player.set_media_list(root.clone());
        (player, root)
    }

    fn walk(player: &ListPlayer, direction: Direction) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            let step = match direction {
                Direction::Next => player.next(),
                Direction::Previous => player.previous(),
            };
            match step {
                Ok(media) => names.push(media.name()),
                Err(_) => return names,
            }
            if names.len() > 20 {
                return names;
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<String>>,
        stops: Mutex<usize>,
    }

    impl PlaybackSink for RecordingSink {
        fn play(&self, media: &Arc<Media>) {
            self.played.lock().push(media.name());
        }

        fn stop(&self) {
            *self.stops.lock() += 1;
        }
    }

    #[test]
    fn test_next_walks_pre_order() {
        let (player, _) = setup();
        assert_eq!(walk(&player, Direction::Next), vec!["a", "b", "b0", "b1", "c"]);
        assert_eq!(player.current_path().unwrap().to_string(), "2");
    }

    #[test]
    fn test_previous_walks_back() {
        let (player, _) = setup();
        player.play_item_at(2).unwrap();
        assert_eq!(walk(&player, Direction::Previous), vec!["b1", "b0", "b", "a"]);
    }

    #[test]
    fn test_loop_wraps() {
        let (player, _) = setup();
        player.set_playback_mode(PlaybackMode::Loop);
        player.play_item_at(2).unwrap();
        assert_eq!(player.next().unwrap().name(), "a");
        assert_eq!(player.previous().unwrap().name(), "c");
        assert_eq!(player.previous().unwrap().name(), "b1");
    }

    #[test]
    fn test_repeat_stays() {
        let (player, _) = setup();
        player.set_playback_mode(PlaybackMode::Repeat);
        assert_eq!(player.next().unwrap().name(), "a");
        assert_eq!(player.next().unwrap().name(), "a");
        assert_eq!(player.previous().unwrap().name(), "a");
    }

    #[test]
    fn test_play_item() {
        let (player, root) = setup();
        let b1 = root.items()[1].subitems().items()[1].clone();
        player.play_item(&b1).unwrap();
        assert_eq!(player.current_path().unwrap().to_string(), "1/1");
        assert!(player.play_item(&Media::new_as_node("x")).is_err());
        assert!(player.play_item_at(9).is_err());
    }

    #[test]
    fn test_events_and_sink() {
        let (player, _) = setup();
        let sink = Arc::new(RecordingSink::default());
        player.set_sink(Some(sink.clone()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EventType::ListPlayerNextItemSet,
            EventType::ListPlayerPlayed,
            EventType::ListPlayerStopped,
        ] {
            let events = seen.clone();
            let callback: EventCallback =
                Arc::new(move |event: &Event| events.lock().push(event.kind()));
            player.event_bus().attach(kind, callback).unwrap();
        }

        player.play().unwrap();
        player.play().unwrap();
        player.play_item_at(2).unwrap();
        player.item_end_reached();
        player.stop();

        assert_eq!(*sink.played.lock(), vec!["a", "a", "c"]);
        assert_eq!(*sink.stops.lock(), 1);
        assert_eq!(
            *seen.lock(),
            vec![
                EventType::ListPlayerNextItemSet,
                EventType::ListPlayerNextItemSet,
                EventType::ListPlayerPlayed,
                EventType::ListPlayerStopped,
            ]
        );
        assert!(player.current_path().is_none());
    }

    #[test]
    fn test_empty_list() {
        let player = ListPlayer::new();
        assert!(player.next().is_err());
        player.set_media_list(MediaList::new());
        assert!(player.next().is_err());
        assert!(player.previous().is_err());
    }
}
