//! Thumbnails and attached pictures.

use common::{MediaError, MediaResult, Millis};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

const JPEG_QUALITY: u8 = 85;

/// Output encoding of a picture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PictureType {
    /// Raw pixels, one A, R, G, B byte each.
    Argb,
    Png,
    Jpeg,
    WebP,
    /// Raw pixels, one R, G, B, A byte each.
    Rgba,
}

impl PictureType {
    /// Detect an encoded picture type from magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            return Some(PictureType::Png);
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(PictureType::Jpeg);
        }
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(PictureType::WebP);
        }
        None
    }

    /// Map a MIME type onto an encoded picture type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(PictureType::Png),
            "image/jpeg" | "image/jpg" => Some(PictureType::Jpeg),
            "image/webp" => Some(PictureType::WebP),
            _ => None,
        }
    }

    /// Get MIME type, for encoded types.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            PictureType::Png => Some("image/png"),
            PictureType::Jpeg => Some("image/jpeg"),
            PictureType::WebP => Some("image/webp"),
            PictureType::Argb | PictureType::Rgba => None,
        }
    }

    /// Get file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            PictureType::Png => "png",
            PictureType::Jpeg => "jpg",
            PictureType::WebP => "webp",
            PictureType::Argb => "argb",
            PictureType::Rgba => "rgba",
        }
    }

    /// Check if the buffer holds raw pixels rather than an encoded file.
    pub fn is_raw(&self) -> bool {
        matches!(self, PictureType::Argb | PictureType::Rgba)
    }
}

/// A decoded frame as delivered by a thumbnailer.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA pixels.
    pub rgba: Vec<u8>,
    /// Presentation time of the frame.
    pub time: Option<Millis>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba,
            time: None,
        }
    }

    pub fn with_time(mut self, time: Millis) -> Self {
        self.time = Some(time);
        self
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .field("time", &self.time)
            .finish()
    }
}

/// A file attached to a media item, such as embedded cover art.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data,
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// An immutable picture.
#[derive(Clone)]
pub struct Picture {
    picture_type: PictureType,
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    time: Option<Millis>,
}

impl Picture {
    /// Convert a raw frame into `picture_type`.
    ///
    /// A zero `width` or `height` is derived from the other one keeping the
    /// frame aspect ratio; both zero keeps the frame size. Otherwise the
    /// frame is scaled to fit inside the box, or with `crop` scaled to fill
    /// it and centre-cropped.
    pub fn from_frame(
        frame: &RawFrame,
        picture_type: PictureType,
        width: u32,
        height: u32,
        crop: bool,
    ) -> MediaResult<Self> {
        if frame.width == 0 || frame.height == 0 {
            return Err(MediaError::invalid("empty frame"));
        }
        let image = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
            .ok_or_else(|| MediaError::invalid("frame buffer does not match its size"))?;
        let image = scale(DynamicImage::ImageRgba8(image), width, height, crop).to_rgba8();
        let (width, height) = image.dimensions();
        let buffer = encode(&image, picture_type)?;

        Ok(Self {
            picture_type,
            buffer,
            width,
            height,
            time: frame.time,
        })
    }

    /// Wrap an attachment, if it is a PNG, JPEG or WebP picture.
    pub fn from_attachment(attachment: &Attachment) -> Option<Self> {
        let picture_type = PictureType::from_mime(&attachment.mime)
            .or_else(|| PictureType::detect(&attachment.data))?;
        let (width, height) = image::ImageReader::new(Cursor::new(&attachment.data))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok())
            .unwrap_or((0, 0));

        Some(Self {
            picture_type,
            buffer: attachment.data.clone(),
            width,
            height,
            time: None,
        })
    }

    /// Get the picture type.
    pub fn picture_type(&self) -> PictureType {
        self.picture_type
    }

    /// Get the encoded buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row, for raw picture types only.
    pub fn stride(&self) -> Option<u32> {
        self.picture_type.is_raw().then(|| self.width * 4)
    }

    /// Presentation time of the source frame, if it came from one.
    pub fn time(&self) -> Option<Millis> {
        self.time
    }

    /// Write the buffer to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> MediaResult<()> {
        std::fs::write(path, &self.buffer)?;
        Ok(())
    }
}

impl fmt::Debug for Picture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Picture")
            .field("type", &self.picture_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.buffer.len())
            .field("time", &self.time)
            .finish()
    }
}

/// Pictures found in a media item's attachments.
#[derive(Clone, Debug, Default)]
pub struct PictureList {
    pictures: Vec<Arc<Picture>>,
}

impl PictureList {
    /// Keep the supported pictures among `attachments`.
    pub fn from_attachments(attachments: &[Attachment]) -> Self {
        Self {
            pictures: attachments
                .iter()
                .filter_map(Picture::from_attachment)
                .map(Arc::new)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pictures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pictures.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Picture>> {
        self.pictures.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Picture>> {
        self.pictures.iter()
    }
}

fn scale(image: DynamicImage, width: u32, height: u32, crop: bool) -> DynamicImage {
    let (src_w, src_h) = (image.width(), image.height());
    let (width, height) = match (width, height) {
        (0, 0) => return image,
        (0, h) => (((src_w as u64 * h as u64) / src_h as u64).max(1) as u32, h),
        (w, 0) => (w, ((src_h as u64 * w as u64) / src_w as u64).max(1) as u32),
        (w, h) => (w, h),
    };
    if (width, height) == (src_w, src_h) {
        return image;
    }
    if crop {
        image.resize_to_fill(width, height, FilterType::Triangle)
    } else {
        image.resize(width, height, FilterType::Triangle)
    }
}

fn encode(image: &RgbaImage, picture_type: PictureType) -> MediaResult<Vec<u8>> {
    let (width, height) = image.dimensions();
    let mut out = Vec::new();
    match picture_type {
        PictureType::Rgba => out.extend_from_slice(image.as_raw()),
        PictureType::Argb => {
            out.reserve(image.as_raw().len());
            for px in image.pixels() {
                let [r, g, b, a] = px.0;
                out.extend_from_slice(&[a, r, g, b]);
            }
        }
        PictureType::Png => PngEncoder::new(&mut out)
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| MediaError::encode(e.to_string()))?,
        PictureType::Jpeg => {
            // JPEG carries no alpha.
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| MediaError::encode(e.to_string()))?
        }
        PictureType::WebP => WebPEncoder::new_lossless(&mut out)
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| MediaError::encode(e.to_string()))?,
    }
    Ok(out)
}
