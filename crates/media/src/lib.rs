//! Media library handle layer.
//!
//! This crate provides:
//! - Event buses with synchronous, reentrant delivery
//! - Media items with metadata, tracks, slaves and sub-items
//! - The asynchronous preparse and thumbnail state machine
//! - Lockable media lists and path addressing inside nested lists
//! - Media discoverers and a list navigator
//!
//! Actual parsing and decoding is done by worker pools implementing
//! [`Preparser`] and [`Thumbnailer`].

pub mod config;
pub mod discoverer;
pub mod event;
pub mod handle;
pub mod instance;
pub mod list_path;
pub mod list_player;
pub mod location;
pub mod media;
pub mod media_list;
pub mod meta;
pub mod picture;
pub mod preparse;
pub mod thumbnail;
pub mod track;
pub mod worker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use common::{MediaError, MediaResult, Millis, ObjectId};
pub use config::InstanceConfig;
pub use discoverer::{
    DiscovererCategory, DiscoveryModule, DiscoverySession, DiscoverySink, MediaDiscoverer,
    ServiceInfo,
};
pub use event::{Event, EventBus, EventCallback, EventPayload, EventType};
pub use handle::{AsyncOps, OpGuard};
pub use instance::{Instance, InstanceBuilder};
pub use list_path::ListPath;
pub use list_player::{ListPlayer, PlaybackMode, PlaybackSink};
pub use location::{ItemType, Location, MediaType};
pub use media::{FileStat, FileStatKind, Media, MediaOption, OptionFlags, Slave, SlaveType, UserData};
pub use media_list::{MediaList, MediaListGuard};
pub use meta::{MetaKey, MetaStore};
pub use picture::{Attachment, Picture, PictureList, PictureType, RawFrame};
pub use preparse::{ParseFlags, ParseReporter, ParseScope, ParseStatus, ParseTimeout};
pub use thumbnail::{SeekSpeed, SeekTarget, ThumbnailParams, ThumbnailReporter, ThumbnailRequest};
pub use track::{Fourcc, Track, TrackDetails, TrackType};
pub use worker::{
    ItemDescriptor, ParseJob, PreparseOutcome, Preparser, Refused, RequestId, SubTree, SubTreeNode,
    ThumbnailJob, Thumbnailer,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
