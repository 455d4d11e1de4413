//! Elementary stream (track) descriptions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Track type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackType {
    Unknown,
    Audio,
    Video,
    Text,
}

/// A four character code identifying a codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fourcc(pub u32);

impl Fourcc {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(u32::from_le_bytes(*code))
    }

    pub fn bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.bytes() {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Type-specific track properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrackDetails {
    Unknown,
    Audio {
        channels: u32,
        rate: u32,
    },
    Video {
        width: u32,
        height: u32,
        sar_num: u32,
        sar_den: u32,
        frame_rate_num: u32,
        frame_rate_den: u32,
    },
    Text {
        encoding: Option<String>,
    },
}

impl TrackDetails {
    pub fn track_type(&self) -> TrackType {
        match self {
            TrackDetails::Unknown => TrackType::Unknown,
            TrackDetails::Audio { .. } => TrackType::Audio,
            TrackDetails::Video { .. } => TrackType::Video,
            TrackDetails::Text { .. } => TrackType::Text,
        }
    }
}

/// Description of one track of a media item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub codec: Fourcc,
    pub original_fourcc: Fourcc,
    pub id: i32,
    pub profile: i32,
    pub level: i32,
    pub bitrate: u32,
    pub language: Option<String>,
    pub description: Option<String>,
    pub details: TrackDetails,
}

impl Track {
    /// Create a track with the given codec and properties.
    pub fn new(id: i32, codec: Fourcc, details: TrackDetails) -> Self {
        Self {
            codec,
            original_fourcc: codec,
            id,
            profile: -1,
            level: -1,
            bitrate: 0,
            language: None,
            description: None,
            details,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Get the track type.
    pub fn track_type(&self) -> TrackType {
        self.details.track_type()
    }
}

const AUDIO_CODECS: &[(&[u8; 4], &str)] = &[
    (b"mp4a", "MPEG AAC Audio"),
    (b"mpga", "MPEG Audio layer 1/2"),
    (b"mp3 ", "MPEG Audio layer 3"),
    (b"opus", "Opus Audio"),
    (b"vorb", "Vorbis Audio"),
    (b"flac", "FLAC (Free Lossless Audio Codec)"),
    (b"a52 ", "A/52 Audio (aka AC3)"),
    (b"eac3", "A/52 B Audio (aka E-AC3)"),
    (b"araw", "PCM Audio"),
];

const VIDEO_CODECS: &[(&[u8; 4], &str)] = &[
    (b"h264", "H264 - MPEG-4 AVC (part 10)"),
    (b"hevc", "MPEG-H Part2/HEVC (H.265)"),
    (b"av01", "AOMedia's AV1 Video"),
    (b"VP80", "Google/On2's VP8 Video"),
    (b"VP90", "Google/On2's VP9 Video"),
    (b"mp4v", "MPEG-4 Video"),
    (b"mpgv", "MPEG-1/2 Video"),
    (b"theo", "Xiph.org's Theora Video"),
    (b"MJPG", "Motion JPEG Video"),
    (b"png ", "PNG Image"),
    (b"jpeg", "JPEG Image"),
    (b"webp", "WebP Image"),
];

const TEXT_CODECS: &[(&[u8; 4], &str)] = &[
    (b"subt", "Text subtitles with various tags"),
    (b"ssa ", "SubStation Alpha subtitles"),
    (b"tx3g", "MPEG-4 Timed Text"),
    (b"webv", "WEBVTT subtitles"),
    (b"dvbs", "DVB subtitles"),
    (b"spu ", "DVD Subtitles"),
];

/// Get a human-readable name for a codec, or an empty string if unknown.
pub fn codec_description(track_type: TrackType, codec: Fourcc) -> &'static str {
    let table = match track_type {
        TrackType::Audio => AUDIO_CODECS,
        TrackType::Video => VIDEO_CODECS,
        TrackType::Text => TEXT_CODECS,
        TrackType::Unknown => return "",
    };
    table
        .iter()
        .find(|(code, _)| Fourcc::new(code) == codec)
        .map(|(_, name)| *name)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_display() {
        assert_eq!(Fourcc::new(b"h264").to_string(), "h264");
        assert_eq!(Fourcc(0).to_string(), "....");
    }

    #[test]
    fn test_codec_description() {
        assert_eq!(
            codec_description(TrackType::Audio, Fourcc::new(b"opus")),
            "Opus Audio"
        );
        // Codec tables are per type.
        assert_eq!(codec_description(TrackType::Video, Fourcc::new(b"opus")), "");
        assert_eq!(codec_description(TrackType::Unknown, Fourcc::new(b"h264")), "");
    }

    #[test]
    fn test_track_builder() {
        let track = Track::new(
            1,
            Fourcc::new(b"mp4a"),
            TrackDetails::Audio {
                channels: 2,
                rate: 48_000,
            },
        )
        .with_language("en")
        .with_bitrate(128_000);

        assert_eq!(track.track_type(), TrackType::Audio);
        assert_eq!(track.language.as_deref(), Some("en"));
        assert_eq!(track.original_fourcc, track.codec);
    }
}
