use anyhow::{Result, anyhow};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::models::ImageDimension;
use crate::services::storage::StorageService;

/// Square sizes offered to clients that don't pick their own
const PRESET_SIZES: [i32; 6] = [16, 32, 64, 128, 256, 512];

/// Extension used when the original filename has none
const DEFAULT_EXTENSION: &str = ".jpg";

/// A thumbnail that made it into storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredThumbnail {
    pub object_name: String,
    pub width: i32,
    pub height: i32,
}

pub struct ThumbnailService {
    storage: Arc<dyn StorageService>,
}

impl ThumbnailService {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self { storage }
    }

    pub fn is_image(content_type: &str) -> bool {
        content_type
            .parse::<mime::Mime>()
            .map(|m| m.type_() == mime::IMAGE)
            .unwrap_or(false)
    }

    pub fn preset_dimensions() -> Vec<ImageDimension> {
        PRESET_SIZES
            .iter()
            .map(|&s| ImageDimension::new(s, s))
            .collect()
    }

    /// Whether the bytes decode as an image
    pub fn validate_image(content: &[u8]) -> bool {
        image::load_from_memory(content).is_ok()
    }

    /// `photo.png` stored as `<uuid>_photo.png` at 64x64 becomes `<uuid>_photo_64x64.png`
    pub fn thumbnail_object_name(
        object_name: &str,
        dimension: &ImageDimension,
        original_filename: &str,
    ) -> String {
        let base = match object_name.rfind('.') {
            Some(idx) if idx > 0 => &object_name[..idx],
            _ => object_name,
        };
        let extension = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

        format!(
            "{}_{}x{}{}",
            base, dimension.width, dimension.height, extension
        )
    }

    /// Derive and store one thumbnail per dimension.
    ///
    /// Best-effort: a dimension that is invalid or fails to encode or store is
    /// logged and left out of the result. Non-image content yields nothing.
    pub async fn generate_thumbnails(
        &self,
        content: &[u8],
        content_type: &str,
        object_name: &str,
        original_filename: &str,
        dimensions: &[ImageDimension],
    ) -> Vec<StoredThumbnail> {
        if dimensions.is_empty() || !Self::is_image(content_type) {
            return Vec::new();
        }

        let source_format = image::guess_format(content).ok();
        let img = match image::load_from_memory(content) {
            Ok(img) => img,
            Err(e) => {
                warn!("Cannot decode {} as an image, skipping thumbnails: {}", object_name, e);
                return Vec::new();
            }
        };

        let mut unique: Vec<&ImageDimension> = Vec::with_capacity(dimensions.len());
        for dimension in dimensions {
            if !unique.contains(&dimension) {
                unique.push(dimension);
            }
        }

        let mut stored = Vec::with_capacity(unique.len());
        for dimension in unique {
            if let Err(e) = dimension.validate() {
                warn!(
                    "Skipping thumbnail {}x{} for {}: {}",
                    dimension.width, dimension.height, object_name, e
                );
                continue;
            }

            let key = Self::thumbnail_object_name(object_name, dimension, original_filename);
            let (data, format) = match Self::resize(&img, dimension, source_format) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!("Failed to generate thumbnail {}: {}", key, e);
                    continue;
                }
            };

            if let Err(e) = self
                .storage
                .put_object(&key, data, format.to_mime_type())
                .await
            {
                warn!("Failed to store thumbnail {}: {}", key, e);
                continue;
            }

            info!("Stored thumbnail {}", key);
            stored.push(StoredThumbnail {
                object_name: key,
                width: dimension.width,
                height: dimension.height,
            });
        }

        stored
    }

    /// Fit inside the box, keeping aspect ratio, and encode close to the source format
    fn resize(
        img: &DynamicImage,
        dimension: &ImageDimension,
        source_format: Option<ImageFormat>,
    ) -> Result<(Vec<u8>, ImageFormat)> {
        let scaled = img.thumbnail(dimension.width as u32, dimension.height as u32);
        let format = match source_format {
            Some(ImageFormat::Jpeg) => ImageFormat::Jpeg,
            Some(ImageFormat::Gif) => ImageFormat::Gif,
            _ => ImageFormat::Png,
        };

        // Encoders only take 8-bit buffers; JPEG has no alpha channel
        let prepared = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(scaled.to_rgb8()),
            ImageFormat::Gif => DynamicImage::ImageRgba8(scaled.to_rgba8()),
            _ => match scaled.color() {
                image::ColorType::Rgba16 | image::ColorType::La16 | image::ColorType::Rgba32F => {
                    DynamicImage::ImageRgba8(scaled.to_rgba8())
                }
                image::ColorType::Rgb16 | image::ColorType::L16 | image::ColorType::Rgb32F => {
                    DynamicImage::ImageRgb8(scaled.to_rgb8())
                }
                _ => scaled,
            },
        };

        let mut out = Cursor::new(Vec::new());
        prepared
            .write_to(&mut out, format)
            .map_err(|e| anyhow!("Failed to encode thumbnail: {}", e))?;
        Ok((out.into_inner(), format))
    }
}
