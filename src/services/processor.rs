//! Rendition rendering - decodes the source once and resizes per target size.
//!
//! Resizing preserves the aspect ratio (fit within the target box) and keeps
//! the source format and mime type. CPU-intensive work runs behind
//! `spawn_blocking` so it never stalls the async runtime.

use crate::error::{AppError, Result};
use crate::models::{ImageSize, Thumbnail};
use crate::paths;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

const JPEG_QUALITY: u8 = 85;

/// A decoded source image, shared across all per-size renditions of one
/// invocation
#[derive(Debug)]
pub struct SourceImage {
    image: DynamicImage,
    format: ImageFormat,
    mime_type: &'static str,
}

impl SourceImage {
    /// Decode raw object content. An undecodable payload aborts the whole
    /// invocation for this event.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let format = image::guess_format(data)
            .map_err(|e| AppError::UnsupportedImage(format!("Unrecognized format: {e}")))?;
        let image = image::load_from_memory_with_format(data, format)
            .map_err(|e| AppError::UnsupportedImage(format!("Failed to decode image: {e}")))?;
        Ok(Self {
            image,
            format,
            mime_type: mime_for_format(format),
        })
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    /// Render one rendition for the given source path and target size
    pub fn render(&self, source_path: &str, size: ImageSize) -> Result<Thumbnail> {
        // Aspect-preserving fit within the target box
        let resized = self.image.thumbnail(size.width, size.height);

        let out_format = match self.format {
            ImageFormat::Jpeg => ImageOutputFormat::Jpeg(JPEG_QUALITY),
            other => ImageOutputFormat::from(other),
        };

        let mut buf = Vec::new();
        resized
            .write_to(&mut Cursor::new(&mut buf), out_format)
            .map_err(|e| {
                AppError::Internal(format!("Failed to encode {} rendition: {e}", size))
            })?;

        let path = paths::thumbnail_path(source_path, size);
        debug!(path = %path, size = %size, bytes = buf.len(), "Rendition rendered");

        Ok(Thumbnail {
            content: Bytes::from(buf),
            path,
            size,
            mime_type: self.mime_type.to_string(),
        })
    }
}

/// Decode on the blocking thread pool
pub async fn decode_async(data: Bytes) -> Result<SourceImage> {
    tokio::task::spawn_blocking(move || SourceImage::decode(&data))
        .await
        .map_err(|e| AppError::Internal(format!("Image decode task panicked: {e}")))?
}

/// Render one rendition on the blocking thread pool
pub async fn render_async(
    source: Arc<SourceImage>,
    source_path: String,
    size: ImageSize,
) -> Result<Thumbnail> {
    tokio::task::spawn_blocking(move || source.render(&source_path, size))
        .await
        .map_err(|e| AppError::Internal(format!("Rendition task panicked: {e}")))?
}

fn mime_for_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Avif => "image/avif",
        _ => "application/octet-stream",
    }
}
