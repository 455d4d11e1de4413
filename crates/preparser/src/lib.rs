//! Local worker pools for the media layer.
//!
//! - [`LocalPreparser`] reads files, directories and M3U playlists
//! - [`LocalThumbnailer`] decodes still images into thumbnails
//! - [`DirectoryDiscovery`] reports the entries of a directory

pub mod discovery;
pub(crate) mod jobs;
pub mod local;
pub(crate) mod playlist;
pub(crate) mod scan;
pub mod thumbnailer;

pub use discovery::DirectoryDiscovery;
pub use local::LocalPreparser;
pub use thumbnailer::LocalThumbnailer;

use oxide_media::{Instance, InstanceConfig, Preparser, Thumbnailer};
use std::sync::Arc;

/// Build an instance whose pools are the local ones.
///
/// Pools are created on first use.
pub fn local_instance(config: InstanceConfig) -> Arc<Instance> {
    Instance::builder(config)
        .with_preparser_factory(|config| {
            let pool: Arc<dyn Preparser> = LocalPreparser::new(config)?;
            Ok(pool)
        })
        .with_thumbnailer_factory(|config| {
            let pool: Arc<dyn Thumbnailer> = LocalThumbnailer::new(config)?;
            Ok(pool)
        })
        .build()
}
