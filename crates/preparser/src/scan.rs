//! Filesystem probing: statistics, directory trees and local art.

use common::{MediaError, MediaResult};
use oxide_media::{Attachment, FileStat, ItemDescriptor, ItemType, Location, SubTree};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Statistics of a filesystem entry.
pub(crate) fn file_stat(metadata: &Metadata) -> FileStat {
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_secs());
    FileStat {
        mtime,
        size: metadata.is_file().then(|| metadata.len()),
    }
}

struct Entry {
    path: PathBuf,
    name: String,
    is_dir: bool,
}

/// Visible entries of a directory, sorted by name.
async fn sorted_entries(dir: &Path) -> MediaResult<Vec<Entry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().await?.is_dir();
        entries.push(Entry {
            path: entry.path(),
            name,
            is_dir,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// List `root` into a tree, descending at most `max_depth` levels.
///
/// Unreadable sub-directories are reported empty.
pub(crate) async fn list_directory(root: &Path, max_depth: usize) -> MediaResult<SubTree> {
    let mut tree = SubTree::new();
    if max_depth == 0 {
        return Ok(tree);
    }

    let mut pending: Vec<(Option<usize>, PathBuf, usize)> = vec![(None, root.to_path_buf(), 1)];
    while let Some((parent, dir, depth)) = pending.pop() {
        let entries = match sorted_entries(&dir).await {
            Ok(entries) => entries,
            Err(err) if parent.is_some() => {
                tracing::warn!(dir = %dir.display(), %err, "skipping unreadable directory");
                continue;
            }
            Err(err) => return Err(err),
        };

        for entry in entries {
            let mut descriptor =
                ItemDescriptor::new(Location::from_path(&entry.path)?).with_name(entry.name);
            if entry.is_dir {
                descriptor = descriptor.with_type(ItemType::Directory);
            }
            let index = match parent {
                Some(parent) => tree.add_child(parent, descriptor),
                None => tree.add_root(descriptor),
            };
            if entry.is_dir && depth < max_depth {
                pending.push((Some(index), entry.path, depth + 1));
            }
        }
    }
    Ok(tree)
}

/// MIME type of an art file, from its extension.
pub(crate) fn art_mime(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Look for the first art file called one of `names` inside `dir`.
pub(crate) async fn find_art(dir: &Path, names: &[String]) -> Option<(PathBuf, Attachment)> {
    for name in names {
        let path = dir.join(name);
        let Some(mime) = art_mime(&path) else {
            continue;
        };
        match tokio::fs::read(&path).await {
            Ok(data) => return Some((path, Attachment::new(name.clone(), mime, data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "art not readable");
            }
        }
    }
    None
}

/// Local path of a location, or an error naming it.
pub(crate) fn local_path(location: &Location) -> MediaResult<PathBuf> {
    location
        .to_file_path()
        .ok_or_else(|| MediaError::unsupported(format!("not a local file: {}", location)))
}
