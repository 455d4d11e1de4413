//! Directory discovery module.

use common::{MediaError, MediaResult};
use oxide_media::{
    DiscovererCategory, DiscoveryModule, DiscoverySession, DiscoverySink, ItemDescriptor, ItemType,
    Location,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Discovery module reporting the entries of one directory.
#[derive(Debug)]
pub struct DirectoryDiscovery {
    name: String,
    long_name: String,
    root: PathBuf,
}

impl DirectoryDiscovery {
    pub fn new(name: &str, long_name: &str, root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            long_name: long_name.to_string(),
            root: root.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DiscoveryModule for DirectoryDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn long_name(&self) -> &str {
        &self.long_name
    }

    fn category(&self) -> DiscovererCategory {
        DiscovererCategory::LocalDirs
    }

    fn open(&self, sink: DiscoverySink) -> MediaResult<Box<dyn DiscoverySession>> {
        if !self.root.is_dir() {
            return Err(MediaError::not_found(format!(
                "discovery root {}",
                self.root.display()
            )));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let root = self.root.clone();
        let flag = stop.clone();
        let worker = std::thread::Builder::new()
            .name(format!("discovery-{}", self.name))
            .spawn(move || scan_root(&root, &sink, &flag))?;

        Ok(Box::new(DirectorySession {
            stop,
            worker: Some(worker),
        }))
    }
}

fn scan_root(root: &Path, sink: &DiscoverySink, stop: &AtomicBool) {
    let mut entries: Vec<_> = match std::fs::read_dir(root) {
        Ok(reader) => reader.filter_map(Result::ok).collect(),
        Err(err) => {
            tracing::warn!(root = %root.display(), %err, "discovery root unreadable");
            return;
        }
    };
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let Ok(location) = Location::from_path(entry.path()) else {
            continue;
        };
        let mut descriptor = ItemDescriptor::new(location).with_name(name);
        if entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false) {
            descriptor = descriptor.with_type(ItemType::Directory);
        }
        sink.add_descriptor(&descriptor);
    }
    tracing::debug!(root = %root.display(), "discovery scan finished");
}

struct DirectorySession {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DiscoverySession for DirectorySession {
    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("discovery worker panicked");
            }
        }
    }
}

impl Drop for DirectorySession {
    fn drop(&mut self) {
        self.close();
    }
}
