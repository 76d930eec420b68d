//! High-level image operations.
//!
//! These functions combine calculations with processor execution.
//! They take configuration, compute parameters, and call the processor.
//! The `plan_*` halves are pure so parameter generation can be tested on its
//! own.

use super::calculations::{
    MAX_OVERLAY_TILES, calculate_inset_dimensions, calculate_overlay_positions,
    calculate_overlay_size, count_overlay_positions,
};
use super::params::{
    ConvertParams, Quality, Sharpening, ThumbnailMode, ThumbnailParams, ThumbnailSpec,
    WatermarkParams, anchor, reduce, repeat,
};
use super::processor::{ImageProcessor, ProcessingError};
use image::ImageFormat;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Get image dimensions using the processor.
pub fn get_dimensions(processor: &dyn ImageProcessor, bytes: &[u8]) -> Result<(u32, u32)> {
    Ok(processor.identify(bytes)?.as_tuple())
}

/// Re-encode `source` as `format`.
pub fn convert_image(
    processor: &dyn ImageProcessor,
    source: &[u8],
    format: ImageFormat,
    quality: Quality,
) -> Result<Vec<u8>> {
    processor.convert(&ConvertParams {
        source,
        format,
        quality,
    })
}

/// Encoder settings shared by every thumbnail a thumbnailer produces.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailConfig {
    pub quality: Quality,
    pub sharpening: Option<Sharpening>,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            sharpening: Some(Sharpening::light()),
        }
    }
}

/// Plan a thumbnail operation without executing it.
///
/// Returns `None` when the operation would be a no-op: an inset bound the
/// source already fits in.
pub fn plan_thumbnail<'a>(
    source: &'a [u8],
    source_dims: (u32, u32),
    format: ImageFormat,
    spec: &ThumbnailSpec,
    config: &ThumbnailConfig,
) -> Option<ThumbnailParams<'a>> {
    let (width, height, crop) = match spec.mode {
        ThumbnailMode::Crop => (
            spec.width.unwrap_or(source_dims.0),
            spec.height.unwrap_or(source_dims.1),
            true,
        ),
        ThumbnailMode::Inset => {
            let (w, h) = calculate_inset_dimensions(source_dims, spec.width, spec.height);
            if (w, h) == source_dims {
                return None;
            }
            (w, h, false)
        }
    };

    Some(ThumbnailParams {
        source,
        format,
        width,
        height,
        crop,
        quality: config.quality,
        sharpening: config.sharpening,
    })
}

/// Create a thumbnail in the same format as the source.
///
/// Crop specs fill and center-crop to the exact box; inset specs shrink to
/// fit, and a source that already fits is returned unchanged.
pub fn create_thumbnail(
    processor: &dyn ImageProcessor,
    source: &[u8],
    format: ImageFormat,
    spec: &ThumbnailSpec,
    config: &ThumbnailConfig,
) -> Result<Vec<u8>> {
    let source_dims = get_dimensions(processor, source)?;
    match plan_thumbnail(source, source_dims, format, spec, config) {
        Some(params) => processor.thumbnail(&params),
        None => Ok(source.to_vec()),
    }
}

/// A decoded-once watermark overlay: its encoded bytes and native size.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Overlay {
    /// Identify `bytes` so later applications skip the header read.
    pub fn load(processor: &dyn ImageProcessor, bytes: Vec<u8>) -> Result<Self> {
        let (width, height) = get_dimensions(processor, &bytes)?;
        Ok(Self {
            bytes,
            width,
            height,
        })
    }
}

/// Placement policy for a watermark, as bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkConfig {
    pub anchor: u32,
    pub repeat: u32,
    pub reduce: u32,
    pub quality: Quality,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            anchor: anchor::MIDDLE | anchor::CENTER,
            repeat: repeat::NONE,
            reduce: reduce::ALL,
            quality: Quality::default(),
        }
    }
}

/// Overlay size and every draw position, for a base of `base_dims`.
///
/// Tiling that would draw the overlay more than [`MAX_OVERLAY_TILES`] times
/// fails before any position is built.
pub fn plan_watermark(
    base_dims: (u32, u32),
    overlay: &Overlay,
    config: &WatermarkConfig,
) -> Result<((u32, u32), Vec<(i64, i64)>)> {
    let size = calculate_overlay_size(base_dims, (overlay.width, overlay.height), config.reduce);
    let tiles = count_overlay_positions(base_dims, size, config.anchor, config.repeat);
    if tiles > MAX_OVERLAY_TILES {
        return Err(ProcessingError::ProcessingFailed(format!(
            "{}x{} watermark would be drawn {tiles} times on {}x{} (limit {MAX_OVERLAY_TILES})",
            size.0, size.1, base_dims.0, base_dims.1
        )));
    }
    let positions = calculate_overlay_positions(base_dims, size, config.anchor, config.repeat);
    Ok((size, positions))
}

/// Composite `overlay` onto `source`, keeping the source format.
pub fn apply_watermark(
    processor: &dyn ImageProcessor,
    source: &[u8],
    format: ImageFormat,
    overlay: &Overlay,
    config: &WatermarkConfig,
) -> Result<Vec<u8>> {
    let base_dims = get_dimensions(processor, source)?;
    let ((overlay_width, overlay_height), positions) = plan_watermark(base_dims, overlay, config)?;

    processor.watermark(&WatermarkParams {
        source,
        format,
        overlay: &overlay.bytes,
        overlay_width,
        overlay_height,
        positions: &positions,
        quality: config.quality,
    })
}
