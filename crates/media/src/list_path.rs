//! Addressing items inside nested collections.
//!
//! A path is the sequence of indices leading from a root list, through
//! the sub-item lists of the items on the way, to one item: `[2, 0]` is the
//! first sub-item of the root's third item.
//!
//! Every resolution step holds its own references to the lists and items it
//! walks through, so a concurrent change elsewhere in the tree cannot free
//! them mid-walk. Results are not linearizable across calls: callers that
//! need a result to stay valid must hold the relevant list lock.

use crate::media::Media;
use crate::media_list::MediaList;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Path to an item in a tree of lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ListPath(SmallVec<[usize; 8]>);

impl ListPath {
    /// The empty path, addressing the root itself.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Path to an item of the root list.
    pub fn with_root_index(index: usize) -> Self {
        let mut path = Self::empty();
        path.append(index);
        path
    }

    /// Number of indices.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn append(&mut self, index: usize) {
        self.0.push(index);
    }

    /// Copy of this path extended by `index`.
    pub fn copy_by_appending(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.append(index);
        path
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Last index of the path.
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub(crate) fn set_last(&mut self, index: usize) {
        if let Some(last) = self.0.last_mut() {
            *last = index;
        }
    }

    /// Drop the last index.
    pub fn pop(&mut self) -> Option<usize> {
        self.0.pop()
    }
}

impl From<&[usize]> for ListPath {
    fn from(indices: &[usize]) -> Self {
        Self(SmallVec::from_slice(indices))
    }
}

impl fmt::Display for ListPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", index)?;
        }
        Ok(())
    }
}

/// Find the first occurrence of `target` below `root`, in pre-order.
pub fn path_of_item(root: &MediaList, target: &Arc<Media>) -> Option<ListPath> {
    struct Frame {
        items: Vec<Arc<Media>>,
        prefix: ListPath,
        next: usize,
    }

    let mut stack = vec![Frame {
        items: root.items(),
        prefix: ListPath::empty(),
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        let Some(item) = frame.items.get(frame.next).cloned() else {
            stack.pop();
            continue;
        };
        let path = frame.prefix.copy_by_appending(frame.next);
        frame.next += 1;

        if Arc::ptr_eq(&item, target) {
            return Some(path);
        }
        let items = item.subitems().items();
        if !items.is_empty() {
            stack.push(Frame {
                items,
                prefix: path,
                next: 0,
            });
        }
    }
    None
}

/// Resolve a path to an item.
///
/// Returns `None` for the empty path or when an index is out of range.
pub fn item_at_path(root: &MediaList, path: &ListPath) -> Option<Arc<Media>> {
    let (&last, parents) = path.indices().split_last()?;
    let mut sublist: Option<Arc<MediaList>> = None;
    for &index in parents {
        let list = sublist.as_deref().unwrap_or(root);
        let item = list.lock().item_at_index(index).ok()?;
        sublist = Some(item.subitems());
    }
    let list = sublist.as_deref().unwrap_or(root);
    let item = list.lock().item_at_index(last).ok();
    item
}

/// Resolve the list directly holding the item a path addresses.
pub fn parent_list_at_path(root: &Arc<MediaList>, path: &ListPath) -> Option<Arc<MediaList>> {
    let (_, parents) = path.indices().split_last()?;
    let mut list = root.clone();
    for &index in parents {
        let item = list.lock().item_at_index(index).ok()?;
        list = item.subitems();
    }
    Some(list)
}

/// Resolve the sub-item list of the item a path addresses.
pub fn sublist_at_path(root: &MediaList, path: &ListPath) -> Option<Arc<MediaList>> {
    item_at_path(root, path).map(|item| item.subitems())
}
