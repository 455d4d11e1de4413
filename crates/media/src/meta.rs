//! Media metadata keys and storage.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Well-known metadata keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetaKey {
    Title,
    Artist,
    Genre,
    Copyright,
    Album,
    TrackNumber,
    Description,
    Rating,
    Date,
    Setting,
    Url,
    Language,
    NowPlaying,
    Publisher,
    EncodedBy,
    ArtworkUrl,
    TrackId,
    TrackTotal,
    Director,
    Season,
    Episode,
    ShowName,
    Actors,
    AlbumArtist,
    DiscNumber,
    DiscTotal,
}

impl MetaKey {
    /// All keys, in declaration order.
    pub const ALL: [MetaKey; 26] = [
        MetaKey::Title,
        MetaKey::Artist,
        MetaKey::Genre,
        MetaKey::Copyright,
        MetaKey::Album,
        MetaKey::TrackNumber,
        MetaKey::Description,
        MetaKey::Rating,
        MetaKey::Date,
        MetaKey::Setting,
        MetaKey::Url,
        MetaKey::Language,
        MetaKey::NowPlaying,
        MetaKey::Publisher,
        MetaKey::EncodedBy,
        MetaKey::ArtworkUrl,
        MetaKey::TrackId,
        MetaKey::TrackTotal,
        MetaKey::Director,
        MetaKey::Season,
        MetaKey::Episode,
        MetaKey::ShowName,
        MetaKey::Actors,
        MetaKey::AlbumArtist,
        MetaKey::DiscNumber,
        MetaKey::DiscTotal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKey::Title => "title",
            MetaKey::Artist => "artist",
            MetaKey::Genre => "genre",
            MetaKey::Copyright => "copyright",
            MetaKey::Album => "album",
            MetaKey::TrackNumber => "track_number",
            MetaKey::Description => "description",
            MetaKey::Rating => "rating",
            MetaKey::Date => "date",
            MetaKey::Setting => "setting",
            MetaKey::Url => "url",
            MetaKey::Language => "language",
            MetaKey::NowPlaying => "now_playing",
            MetaKey::Publisher => "publisher",
            MetaKey::EncodedBy => "encoded_by",
            MetaKey::ArtworkUrl => "artwork_url",
            MetaKey::TrackId => "track_id",
            MetaKey::TrackTotal => "track_total",
            MetaKey::Director => "director",
            MetaKey::Season => "season",
            MetaKey::Episode => "episode",
            MetaKey::ShowName => "show_name",
            MetaKey::Actors => "actors",
            MetaKey::AlbumArtist => "album_artist",
            MetaKey::DiscNumber => "disc_number",
            MetaKey::DiscTotal => "disc_total",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.as_str() == s)
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of one media item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaStore {
    values: HashMap<MetaKey, String>,
    /// Free-form entries, kept in insertion order.
    extra: IndexMap<String, String>,
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: MetaKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Set or clear a well-known key. Returns whether the value changed.
    pub fn set(&mut self, key: MetaKey, value: Option<String>) -> bool {
        match value {
            Some(value) => self.values.insert(key, value.clone()).as_deref() != Some(&value),
            None => self.values.remove(&key).is_some(),
        }
    }

    pub fn extra(&self, name: &str) -> Option<&str> {
        self.extra.get(name).map(String::as_str)
    }

    /// Set or clear a free-form entry. Returns whether the value changed.
    pub fn set_extra(&mut self, name: &str, value: Option<String>) -> bool {
        match value {
            Some(value) => {
                self.extra.insert(name.to_string(), value.clone()).as_deref() != Some(&value)
            }
            None => self.extra.shift_remove(name).is_some(),
        }
    }

    /// Names of all free-form entries.
    pub fn extra_names(&self) -> Vec<String> {
        self.extra.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extra.is_empty()
    }

    /// Copy every entry of `other` over this store.
    pub fn merge(&mut self, other: &MetaStore) {
        for (key, value) in &other.values {
            self.values.insert(*key, value.clone());
        }
        for (name, value) in &other.extra {
            self.extra.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_round_trip() {
        for key in MetaKey::ALL {
            assert_eq!(MetaKey::from_str(key.as_str()), Some(key));
        }
        assert_eq!(MetaKey::from_str("bogus"), None);
    }

    #[test]
    fn test_set_reports_change() {
        let mut meta = MetaStore::new();
        assert!(meta.set(MetaKey::Artist, Some("Nina".into())));
        assert!(!meta.set(MetaKey::Artist, Some("Nina".into())));
        assert!(meta.set(MetaKey::Artist, None));
        assert!(!meta.set(MetaKey::Artist, None));
        assert!(meta.is_empty());
    }

    #[test]
    fn test_extra_keeps_order() {
        let mut meta = MetaStore::new();
        meta.set_extra("zeta", Some("1".into()));
        meta.set_extra("alpha", Some("2".into()));
        assert_eq!(meta.extra_names(), vec!["zeta", "alpha"]);

        meta.set_extra("zeta", None);
        assert_eq!(meta.extra_names(), vec!["alpha"]);
        assert_eq!(meta.extra("alpha"), Some("2"));
    }
}
