//! M3U playlist reading.

use common::{MediaError, MediaResult, Millis};
use oxide_media::{ItemDescriptor, Location, SubTree};
use std::path::Path;

/// Check if a playlist file is in a format this crate reads.
pub(crate) fn is_m3u(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "m3u" | "m3u8"))
        .unwrap_or(false)
}

/// Parse an M3U playlist. Relative entries are resolved against `base`.
pub(crate) fn parse_m3u(text: &str, base: &Path) -> MediaResult<SubTree> {
    let mut tree = SubTree::new();
    let mut info: Option<(Option<Millis>, Option<String>)> = None;

    for line in text.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            info = Some(parse_extinf(rest));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let location = match resolve(line, base) {
            Ok(location) => location,
            Err(err) => {
                tracing::debug!(entry = line, %err, "skipping playlist entry");
                info = None;
                continue;
            }
        };
        let mut descriptor = ItemDescriptor::new(location);
        if let Some((duration, title)) = info.take() {
            if let Some(duration) = duration {
                descriptor = descriptor.with_duration(duration);
            }
            if let Some(title) = title {
                descriptor = descriptor.with_name(title);
            }
        }
        tree.add_root(descriptor);
    }
    Ok(tree)
}

/// `#EXTINF:<seconds>[ attributes],<title>`
fn parse_extinf(rest: &str) -> (Option<Millis>, Option<String>) {
    let (head, title) = match rest.split_once(',') {
        Some((head, title)) => (head, Some(title.trim())),
        None => (rest, None),
    };
    let duration = head
        .split_whitespace()
        .next()
        .and_then(|seconds| seconds.parse::<f64>().ok())
        .filter(|seconds| *seconds >= 0.0)
        .map(|seconds| Millis((seconds * 1000.0).round() as i64));
    let title = title.filter(|title| !title.is_empty()).map(str::to_string);
    (duration, title)
}

fn resolve(entry: &str, base: &Path) -> MediaResult<Location> {
    if entry.contains("://") {
        return Location::parse(entry);
    }
    let path = Path::new(entry);
    if path.is_absolute() {
        Location::from_path(path)
    } else if base.is_absolute() {
        Location::from_path(base.join(path))
    } else {
        Err(MediaError::invalid(format!("relative entry {}", entry)))
    }
}
