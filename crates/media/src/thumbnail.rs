//! Single-shot thumbnail requests.

use crate::event::EventPayload;
use crate::instance::Instance;
use crate::media::Media;
use crate::picture::{Picture, PictureType, RawFrame};
use crate::preparse::ParseTimeout;
use crate::worker::{RequestId, ThumbnailJob, Thumbnailer};
use common::{MediaResult, Millis};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where to take the thumbnail from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SeekTarget {
    Time(Millis),
    /// Fraction of the duration, `0.0..=1.0`.
    Position(f32),
}

/// Seek accuracy hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SeekSpeed {
    #[default]
    Precise,
    /// Nearest keyframe.
    Fast,
}

/// Parameters of a thumbnail request.
#[derive(Clone, Debug)]
pub struct ThumbnailParams {
    pub seek: SeekTarget,
    pub speed: SeekSpeed,
    /// Target width, 0 to derive it from the height.
    pub width: u32,
    /// Target height, 0 to derive it from the width.
    pub height: u32,
    pub crop: bool,
    pub picture_type: PictureType,
    pub timeout: ParseTimeout,
    pub hw_decode: bool,
}

impl ThumbnailParams {
    /// Thumbnail at a point in time.
    pub fn at_time(time: Millis) -> Self {
        Self::new(SeekTarget::Time(time))
    }

    /// Thumbnail at a fraction of the duration.
    pub fn at_position(position: f32) -> Self {
        Self::new(SeekTarget::Position(position.clamp(0.0, 1.0)))
    }

    fn new(seek: SeekTarget) -> Self {
        Self {
            seek,
            speed: SeekSpeed::Precise,
            width: 0,
            height: 0,
            crop: false,
            picture_type: PictureType::Png,
            timeout: ParseTimeout::Default,
            hw_decode: false,
        }
    }

    pub fn with_speed(mut self, speed: SeekSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_crop(mut self, crop: bool) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_picture_type(mut self, picture_type: PictureType) -> Self {
        self.picture_type = picture_type;
        self
    }

    pub fn with_timeout(mut self, timeout: ParseTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_hw_decode(mut self, hw_decode: bool) -> Self {
        self.hw_decode = hw_decode;
        self
    }
}

/// Handle through which a pool delivers one thumbnail.
///
/// Holds the item alive until delivery. Dropping the reporter without
/// calling [`ThumbnailReporter::finish`] reports that no thumbnail was
/// generated.
pub struct ThumbnailReporter {
    media: Arc<Media>,
    params: ThumbnailParams,
    cancelled: Arc<AtomicBool>,
    delivered: bool,
}

impl ThumbnailReporter {
    /// Get the target item.
    pub fn media(&self) -> &Arc<Media> {
        &self.media
    }

    /// Check if the request was destroyed; the pool may stop early.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Deliver the decoded frame, or `None` on failure.
    pub fn finish(mut self, frame: Option<RawFrame>) {
        let picture = match frame {
            Some(_) if self.is_cancelled() => None,
            Some(frame) => self.convert(&frame),
            None => None,
        };
        self.deliver(picture);
    }

    fn convert(&self, frame: &RawFrame) -> Option<Arc<Picture>> {
        let params = &self.params;
        match Picture::from_frame(
            frame,
            params.picture_type,
            params.width,
            params.height,
            params.crop,
        ) {
            Ok(picture) => Some(Arc::new(picture)),
            Err(err) => {
                tracing::warn!(media = %self.media.id(), %err, "thumbnail conversion failed");
                None
            }
        }
    }

    fn deliver(&mut self, picture: Option<Arc<Picture>>) {
        self.delivered = true;
        tracing::debug!(
            media = %self.media.id(),
            generated = picture.is_some(),
            "thumbnail delivered"
        );
        self.media
            .event_bus()
            .send(EventPayload::MediaThumbnailGenerated { picture });
    }
}

impl Drop for ThumbnailReporter {
    fn drop(&mut self) {
        if !self.delivered {
            self.deliver(None);
        }
    }
}

impl fmt::Debug for ThumbnailReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailReporter")
            .field("media", &self.media.id())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// An outstanding thumbnail request.
///
/// Dropping the request tells the pool to abandon the work. The
/// `MediaThumbnailGenerated` event is still sent once, without a picture.
pub struct ThumbnailRequest {
    id: RequestId,
    media: Arc<Media>,
    instance: Arc<Instance>,
    thumbnailer: Arc<dyn Thumbnailer>,
    cancelled: Arc<AtomicBool>,
}

impl ThumbnailRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Get the target item.
    pub fn media(&self) -> &Arc<Media> {
        &self.media
    }

    /// Get the instance whose thumbnailer runs the request.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Abandon the request.
    pub fn cancel(self) {}
}

impl Drop for ThumbnailRequest {
    fn drop(&mut self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            tracing::debug!(media = %self.media.id(), id = %self.id, "thumbnail request destroyed");
            self.thumbnailer.cancel(self.id);
        }
    }
}

impl fmt::Debug for ThumbnailRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThumbnailRequest")
            .field("id", &self.id)
            .field("media", &self.media.id())
            .finish()
    }
}

impl Media {
    /// Ask the instance's thumbnailer for a picture of this item.
    ///
    /// The result arrives as a `MediaThumbnailGenerated` event. Thumbnail
    /// requests run independently of parse requests.
    pub fn thumbnail_request(
        self: &Arc<Self>,
        instance: &Arc<Instance>,
        params: ThumbnailParams,
    ) -> MediaResult<ThumbnailRequest> {
        let thumbnailer = instance.thumbnailer()?;
        let id = RequestId::next();
        let cancelled = Arc::new(AtomicBool::new(false));
        let timeout = params.timeout.resolve(instance.config().thumbnail_timeout);

        let job = ThumbnailJob {
            id,
            seek: params.seek,
            speed: params.speed,
            hw_decode: params.hw_decode,
            timeout,
            reporter: ThumbnailReporter {
                media: self.clone(),
                params,
                cancelled: cancelled.clone(),
                delivered: false,
            },
        };
        tracing::debug!(media = %self.id(), %id, "thumbnail requested");
        thumbnailer.push(job)?;

        Ok(ThumbnailRequest {
            id,
            media: self.clone(),
            instance: instance.clone(),
            thumbnailer,
            cancelled,
        })
    }
}
