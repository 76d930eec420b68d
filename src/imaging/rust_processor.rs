//! Pure Rust image processor built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, TIFF, WebP) | `image::load_from_memory` |
//! | Identify | `ImageReader::into_dimensions` (header only) |
//! | Resize | `imageops::resize` / `resize_to_fill` with `Lanczos3` |
//! | Sharpening | `image::imageops::unsharpen` |
//! | Composite | `image::imageops::overlay` |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6) |
//! | Encode → other | `DynamicImage::write_to` |
//!
//! AVIF is encode-only: the `image` crate's `"avif"` feature ships the rav1e
//! encoder but no decoder, so AVIF sources fail with
//! [`ProcessingError::UnsupportedFormat`].

use super::params::{ConvertParams, ThumbnailParams, WatermarkParams};
use super::processor::{Dimensions, ImageProcessor, ProcessingError};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// Pure Rust processor using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustProcessor;

impl RustProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, ProcessingError> {
    let format = image::guess_format(bytes)
        .map_err(|e| ProcessingError::UnsupportedFormat(format!("unrecognized image data: {e}")))?;
    if !format.reading_enabled() || format == ImageFormat::Avif {
        return Err(ProcessingError::UnsupportedFormat(format!(
            "no decoder for {}",
            format.to_mime_type()
        )));
    }
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ProcessingError::ProcessingFailed(format!("Failed to decode image: {e}")))
}

/// Encode into `format`, converting the pixel layout where the codec needs it.
fn encode(img: &DynamicImage, format: ImageFormat, quality: u32) -> Result<Vec<u8>, ProcessingError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality as u8);
            rgb.write_with_encoder(encoder)
                .map_err(|e| ProcessingError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
        }
        ImageFormat::Avif => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            let encoder = AvifEncoder::new_with_speed_quality(&mut buf, 6, quality as u8);
            rgba.write_with_encoder(encoder)
                .map_err(|e| ProcessingError::ProcessingFailed(format!("AVIF encode failed: {e}")))?;
        }
        ImageFormat::Gif | ImageFormat::WebP => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_to(&mut Cursor::new(&mut buf), format)
                .map_err(|e| ProcessingError::ProcessingFailed(format!("Encode failed: {e}")))?;
        }
        ImageFormat::Png | ImageFormat::Tiff => {
            img.write_to(&mut Cursor::new(&mut buf), format)
                .map_err(|e| ProcessingError::ProcessingFailed(format!("Encode failed: {e}")))?;
        }
        other => {
            return Err(ProcessingError::UnsupportedFormat(format!(
                "no encoder for {}",
                other.to_mime_type()
            )));
        }
    }
    Ok(buf)
}

impl ImageProcessor for RustProcessor {
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, ProcessingError> {
        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| {
                ProcessingError::ProcessingFailed(format!("Failed to read dimensions: {e}"))
            })?;
        Ok(Dimensions { width, height })
    }

    fn convert(&self, params: &ConvertParams<'_>) -> Result<Vec<u8>, ProcessingError> {
        let img = decode(params.source)?;
        encode(&img, params.format, params.quality.value())
    }

    fn thumbnail(&self, params: &ThumbnailParams<'_>) -> Result<Vec<u8>, ProcessingError> {
        let img = decode(params.source)?;

        let resized = if params.crop {
            // Fill-resize then center-crop to exact dimensions
            img.resize_to_fill(params.width, params.height, FilterType::Lanczos3)
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };

        let final_img = if let Some(sharpening) = params.sharpening {
            DynamicImage::from(imageops::unsharpen(
                &resized,
                sharpening.sigma,
                sharpening.threshold,
            ))
        } else {
            resized
        };

        encode(&final_img, params.format, params.quality.value())
    }

    fn watermark(&self, params: &WatermarkParams<'_>) -> Result<Vec<u8>, ProcessingError> {
        let mut base = decode(params.source)?.to_rgba8();
        let overlay = decode(params.overlay)?.to_rgba8();

        let overlay = if overlay.dimensions() == (params.overlay_width, params.overlay_height) {
            overlay
        } else {
            imageops::resize(
                &overlay,
                params.overlay_width,
                params.overlay_height,
                FilterType::Lanczos3,
            )
        };

        for &(x, y) in params.positions {
            imageops::overlay(&mut base, &overlay, x, y);
        }

        encode(
            &DynamicImage::ImageRgba8(base),
            params.format,
            params.quality.value(),
        )
    }
}
