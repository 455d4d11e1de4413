//! Contracts of the preparse and thumbnail worker pools.
//!
//! A pool accepts jobs, runs them on its own threads and reports back
//! through the reporter carried by each job. Every accepted job is completed
//! exactly once: either explicitly through the reporter's `finish`, or, if
//! the pool drops the job without finishing it, as interrupted.

use crate::location::{ItemType, Location};
use crate::meta::{MetaKey, MetaStore};
use crate::preparse::{ParseReporter, ParseScope};
use crate::thumbnail::{SeekSpeed, SeekTarget, ThumbnailReporter};
use common::{MediaError, MediaResult, Millis};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Identity of one job pushed to a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocate a new unique request identity.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Terminal outcome of a preparse job, as reported by the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PreparseOutcome {
    Success,
    Failed,
    Timeout,
    /// Cancelled, or dropped by the pool before finishing.
    Interrupted,
}

/// A structural parse and/or metadata fetch of one item.
#[derive(Debug)]
pub struct ParseJob {
    pub id: RequestId,
    pub scope: ParseScope,
    /// `None` means no deadline.
    pub timeout: Option<Duration>,
    pub reporter: ParseReporter,
}

/// A single-shot thumbnail extraction.
#[derive(Debug)]
pub struct ThumbnailJob {
    pub id: RequestId,
    pub seek: SeekTarget,
    pub speed: SeekSpeed,
    pub hw_decode: bool,
    /// `None` means no deadline.
    pub timeout: Option<Duration>,
    pub reporter: ThumbnailReporter,
}

/// A job a pool would not take, handed back untouched.
#[derive(Debug)]
pub struct Refused<J> {
    pub job: J,
    pub error: MediaError,
}

impl<J> Refused<J> {
    pub fn new(job: J, error: MediaError) -> Self {
        Self { job, error }
    }
}

/// Pool performing preparse jobs.
pub trait Preparser: Send + Sync {
    /// Accept a job.
    ///
    /// A refused job must be returned, not dropped: the request is then
    /// unwound without any completion being published.
    fn push(&self, job: ParseJob) -> Result<(), Refused<ParseJob>>;

    /// Ask the pool to abandon a job. The job still completes, sooner and as
    /// interrupted or timed out. Unknown ids are ignored.
    fn cancel(&self, id: RequestId);
}

/// Pool performing thumbnail jobs.
pub trait Thumbnailer: Send + Sync {
    /// Accept a job. A refused job is dropped, which reports no thumbnail.
    fn push(&self, job: ThumbnailJob) -> MediaResult<()>;

    /// Ask the pool to abandon a job. Unknown ids are ignored.
    fn cancel(&self, id: RequestId);
}

/// Description of an item found while parsing another one.
#[derive(Clone, Debug)]
pub struct ItemDescriptor {
    pub location: Location,
    pub name: Option<String>,
    pub item_type: ItemType,
    pub meta: MetaStore,
    pub duration: Option<Millis>,
}

impl ItemDescriptor {
    pub fn new(location: Location) -> Self {
        let item_type = location.item_type();
        Self {
            location,
            name: None,
            item_type,
            meta: MetaStore::new(),
            duration: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, item_type: ItemType) -> Self {
        self.item_type = item_type;
        self
    }

    pub fn with_meta(mut self, key: MetaKey, value: impl Into<String>) -> Self {
        self.meta.set(key, Some(value.into()));
        self
    }

    pub fn with_duration(mut self, duration: Millis) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// A node of a [`SubTree`].
#[derive(Clone, Debug)]
pub struct SubTreeNode {
    pub descriptor: ItemDescriptor,
    /// Indices of the children, in order.
    pub children: Vec<usize>,
}

/// Tree of discovered items, stored flat.
///
/// Nodes refer to their children by index so that neither building,
/// walking nor dropping a tree recurses, whatever its depth.
#[derive(Clone, Debug, Default)]
pub struct SubTree {
    nodes: Vec<SubTreeNode>,
    roots: Vec<usize>,
}

impl SubTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a direct child of the parsed item. Returns the node index.
    pub fn add_root(&mut self, descriptor: ItemDescriptor) -> usize {
        let index = self.push_node(descriptor);
        self.roots.push(index);
        index
    }

    /// Add a child under node `parent`. Returns the node index.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a node of this tree.
    pub fn add_child(&mut self, parent: usize, descriptor: ItemDescriptor) -> usize {
        assert!(parent < self.nodes.len(), "no node {} in sub-tree", parent);
        let index = self.push_node(descriptor);
        self.nodes[parent].children.push(index);
        index
    }

    /// Indices of the direct children of the parsed item.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, index: usize) -> Option<&SubTreeNode> {
        self.nodes.get(index)
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push_node(&mut self, descriptor: ItemDescriptor) -> usize {
        self.nodes.push(SubTreeNode {
            descriptor,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ItemDescriptor {
        ItemDescriptor::new(Location::parse(&format!("file:///m/{}", name)).unwrap())
    }

    #[test]
    fn test_request_ids_unique() {
        assert_ne!(RequestId::next(), RequestId::next());
    }

    #[test]
    fn test_subtree_building() {
        let mut tree = SubTree::new();
        let dir = tree.add_root(descriptor("dir/").with_type(ItemType::Directory));
        let song = tree.add_child(dir, descriptor("dir/song.ogg"));
        tree.add_root(descriptor("other.ogg"));

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.roots(), &[0, 2]);
        assert_eq!(tree.node(dir).unwrap().children, vec![song]);
        assert_eq!(
            tree.node(song).unwrap().descriptor.location.default_name(),
            "song.ogg"
        );
    }

    #[test]
    #[should_panic]
    fn test_subtree_unknown_parent() {
        let mut tree = SubTree::new();
        tree.add_child(3, descriptor("x"));
    }
}
