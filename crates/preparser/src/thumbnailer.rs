//! Still image thumbnailer.

use crate::jobs::{build_runtime, race, CancelRegistry, Race};
use crate::scan;
use common::{MediaError, MediaResult, Millis};
use oxide_media::{InstanceConfig, Location, RawFrame, RequestId, ThumbnailJob, Thumbnailer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Thumbnailer decoding local still images.
///
/// Items that are not decodable images get no thumbnail.
pub struct LocalThumbnailer {
    runtime: Option<Runtime>,
    cancels: Arc<CancelRegistry>,
}

impl LocalThumbnailer {
    /// Create the pool; fails when thumbnail threads are disabled.
    pub fn new(config: &InstanceConfig) -> MediaResult<Arc<Self>> {
        if config.thumbnail_threads == 0 {
            return Err(MediaError::worker("thumbnails disabled"));
        }
        let runtime = build_runtime("thumbnailer", config.thumbnail_threads)?;
        Ok(Arc::new(Self {
            runtime: Some(runtime),
            cancels: Arc::new(CancelRegistry::default()),
        }))
    }
}

impl Thumbnailer for LocalThumbnailer {
    fn push(&self, job: ThumbnailJob) -> MediaResult<()> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| MediaError::worker("thumbnailer shut down"))?;
        let cancel = self.cancels.register(job.id);
        let cancels = self.cancels.clone();

        runtime.spawn(async move {
            let ThumbnailJob {
                id,
                timeout,
                reporter,
                ..
            } = job;
            let location = reporter.media().location();
            let frame = match race(decode(location), cancel, timeout).await {
                Race::Done(Ok(frame)) => Some(frame),
                Race::Done(Err(err)) => {
                    tracing::debug!(%id, %err, "thumbnail failed");
                    None
                }
                Race::Cancelled | Race::TimedOut => None,
            };
            cancels.forget(id);
            reporter.finish(frame);
        });
        Ok(())
    }

    fn cancel(&self, id: RequestId) {
        self.cancels.cancel(id);
    }
}

impl Drop for LocalThumbnailer {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn decode(location: Location) -> MediaResult<RawFrame> {
    let path = scan::local_path(&location)?;
    tokio::task::spawn_blocking(move || decode_file(path))
        .await
        .map_err(|err| MediaError::internal(format!("decoder task: {}", err)))?
}

fn decode_file(path: PathBuf) -> MediaResult<RawFrame> {
    let image = image::open(&path)
        .map_err(|err| MediaError::unsupported(format!("{}: {}", path.display(), err)))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(RawFrame::new(width, height, image.into_raw()).with_time(Millis::ZERO))
}
