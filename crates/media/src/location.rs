//! Media locations (MRLs) and item type classification.

use common::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Internal item type, as guessed from the location and refined by parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Unknown,
    File,
    Directory,
    Disc,
    Stream,
    Playlist,
    /// A named container with no location of its own.
    Node,
}

/// Media type as reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Unknown,
    File,
    Directory,
    Disc,
    Stream,
    Playlist,
}

impl From<ItemType> for MediaType {
    fn from(item_type: ItemType) -> Self {
        match item_type {
            ItemType::File => MediaType::File,
            ItemType::Node | ItemType::Directory => MediaType::Directory,
            ItemType::Disc => MediaType::Disc,
            ItemType::Stream => MediaType::Stream,
            ItemType::Playlist => MediaType::Playlist,
            ItemType::Unknown => MediaType::Unknown,
        }
    }
}

const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8", "pls", "xspf", "asx", "cue"];

const NODE_MRL: &str = "node:";

/// Guess the item type and locality of a scheme.
fn classify_scheme(scheme: &str) -> (ItemType, bool) {
    match scheme {
        "file" | "fd" => (ItemType::File, false),
        "directory" => (ItemType::Directory, false),
        "dvd" | "dvdnav" | "dvdsimple" | "vcd" | "cdda" | "bluray" => (ItemType::Disc, false),
        "http" | "https" | "rtsp" | "rtp" | "udp" | "mms" | "mmsh" | "rtmp" | "srt" | "ftp"
        | "ftps" => (ItemType::Stream, true),
        "smb" | "nfs" | "sftp" | "upnp" => (ItemType::Directory, true),
        _ => (ItemType::Unknown, false),
    }
}

/// Location of a media item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    mrl: String,
    item_type: ItemType,
    network: bool,
}

impl Location {
    /// Parse a location string such as `file:///music/a.ogg` or `https://host/x`.
    pub fn parse(mrl: &str) -> MediaResult<Self> {
        let url = Url::parse(mrl)?;
        let (mut item_type, network) = classify_scheme(url.scheme());
        if matches!(item_type, ItemType::File | ItemType::Stream) {
            if url.path().ends_with('/') && url.scheme() == "file" {
                item_type = ItemType::Directory;
            } else if has_playlist_extension(url.path()) {
                item_type = ItemType::Playlist;
            }
        }
        Ok(Self {
            mrl: mrl.to_string(),
            item_type,
            network,
        })
    }

    /// Build a `file://` location from a filesystem path.
    ///
    /// Relative paths are resolved against the current directory.
    pub fn from_path(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let url = Url::from_file_path(&absolute)
            .map_err(|_| MediaError::invalid(format!("not a file path: {}", path.display())))?;
        let mut location = Self::parse(url.as_str())?;
        if path.as_os_str().to_string_lossy().ends_with(std::path::MAIN_SEPARATOR) {
            location.item_type = ItemType::Directory;
        }
        Ok(location)
    }

    /// Location of an already open file descriptor.
    pub fn from_fd(fd: i32) -> MediaResult<Self> {
        if fd < 0 {
            return Err(MediaError::invalid(format!("bad file descriptor {}", fd)));
        }
        Ok(Self {
            mrl: format!("fd://{}", fd),
            item_type: ItemType::File,
            network: false,
        })
    }

    /// Location of a named node.
    pub fn node() -> Self {
        Self {
            mrl: NODE_MRL.to_string(),
            item_type: ItemType::Node,
            network: false,
        }
    }

    /// Get the location string.
    pub fn mrl(&self) -> &str {
        &self.mrl
    }

    /// Get the guessed item type.
    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    /// Check if the item is reached over the network.
    pub fn is_network(&self) -> bool {
        self.network
    }

    /// Get the local path for `file://` locations.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        let url = Url::parse(&self.mrl).ok()?;
        if url.scheme() != "file" {
            return None;
        }
        url.to_file_path().ok()
    }

    /// A display name derived from the location.
    pub fn default_name(&self) -> String {
        if self.item_type == ItemType::Node {
            return String::new();
        }
        if let Some(path) = self.to_file_path() {
            if let Some(name) = path.file_name() {
                return name.to_string_lossy().into_owned();
            }
        }
        Url::parse(&self.mrl)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(String::from))
            })
            .unwrap_or_else(|| self.mrl.clone())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mrl)
    }
}

fn has_playlist_extension(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            PLAYLIST_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
