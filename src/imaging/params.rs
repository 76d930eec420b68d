//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`operations`](super::operations) module (which turns
//! manipulator configuration into concrete numbers) and the
//! [`processor`](super::processor) (which does the actual pixel work). This
//! separation lets tests swap in a recording processor without changing
//! operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Sharpening`]: Unsharp-mask parameters (sigma + threshold) for thumbnail crispness.
//! - [`ThumbnailSpec`]: Parsed thumbnail format string (`200x150`, `<800x600`).
//! - [`anchor`], [`repeat`], [`reduce`]: Watermark placement bit flags.
//! - [`ConvertParams`], [`ThumbnailParams`], [`WatermarkParams`]: Full
//!   description of a single processor call.

use image::ImageFormat;
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Sharpening parameters for unsharp mask.
///
/// - `sigma`: Standard deviation of the Gaussian blur (higher = more sharpening)
/// - `threshold`: Minimum brightness difference to sharpen (0 = sharpen all pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sharpening {
    pub sigma: f32,
    pub threshold: i32,
}

impl Sharpening {
    /// Light sharpening suitable for thumbnails.
    pub fn light() -> Self {
        Self {
            sigma: 0.5,
            threshold: 0,
        }
    }
}

/// How a thumbnail fits its bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailMode {
    /// Fill the box, then center-crop to exactly the box size.
    Crop,
    /// Shrink to fit inside the box, preserving aspect ratio. Never upscales.
    Inset,
}

/// A thumbnail format produced by a thumbnail rule.
///
/// | Format | Meaning |
/// |---|---|
/// | `200x150` | crop to exactly 200×150 |
/// | `<800x600` | fit inside 800×600 |
/// | `<800x` | fit within 800 wide |
/// | `<x600` | fit within 600 high |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSpec {
    pub mode: ThumbnailMode,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ThumbnailSpec {
    pub fn crop(width: u32, height: u32) -> Self {
        Self {
            mode: ThumbnailMode::Crop,
            width: Some(width),
            height: Some(height),
        }
    }

    pub fn inset(width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            mode: ThumbnailMode::Inset,
            width,
            height,
        }
    }

    /// Largest requested edge, used to enforce a size ceiling.
    pub fn max_edge(&self) -> u32 {
        self.width.unwrap_or(0).max(self.height.unwrap_or(0))
    }
}

impl FromStr for ThumbnailSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (mode, dims) = match s.strip_prefix('<') {
            Some(rest) => (ThumbnailMode::Inset, rest),
            None => (ThumbnailMode::Crop, s),
        };
        let (w, h) = dims
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;

        let width = parse_edge(w)?;
        let height = parse_edge(h)?;
        match (mode, width, height) {
            (ThumbnailMode::Crop, Some(_), Some(_)) => {}
            (ThumbnailMode::Crop, _, _) => {
                return Err(format!("crop format '{s}' needs both width and height"));
            }
            (ThumbnailMode::Inset, None, None) => {
                return Err(format!("inset format '{s}' needs a width or a height"));
            }
            (ThumbnailMode::Inset, _, _) => {}
        }
        Ok(Self {
            mode,
            width,
            height,
        })
    }
}

fn parse_edge(s: &str) -> Result<Option<u32>, String> {
    if s.is_empty() {
        return Ok(None);
    }
    match s.parse::<u32>() {
        Ok(0) => Err("dimensions must be positive".to_string()),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(format!("invalid dimension '{s}'")),
    }
}

impl fmt::Display for ThumbnailSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode == ThumbnailMode::Inset {
            f.write_str("<")?;
        }
        if let Some(w) = self.width {
            write!(f, "{w}")?;
        }
        f.write_str("x")?;
        if let Some(h) = self.height {
            write!(f, "{h}")?;
        }
        Ok(())
    }
}

/// Watermark anchor flags. Vertical and horizontal flags combine with `|`.
pub mod anchor {
    pub const TOP: u32 = 0x01;
    pub const BOTTOM: u32 = 0x02;
    pub const MIDDLE: u32 = 0x04;
    pub const LEFT: u32 = 0x10;
    pub const RIGHT: u32 = 0x20;
    pub const CENTER: u32 = 0x40;

    pub const NAMES: &[(&str, u32)] = &[
        ("TOP", TOP),
        ("BOTTOM", BOTTOM),
        ("MIDDLE", MIDDLE),
        ("LEFT", LEFT),
        ("RIGHT", RIGHT),
        ("CENTER", CENTER),
    ];
}

/// Watermark tiling flags.
pub mod repeat {
    pub const NONE: u32 = 0x00;
    pub const X: u32 = 0x01;
    pub const Y: u32 = 0x02;
    pub const ALL: u32 = X | Y;

    pub const NAMES: &[(&str, u32)] = &[("NONE", NONE), ("X", X), ("Y", Y), ("ALL", ALL)];
}

/// Watermark reduction flags: which axes may shrink the overlay to fit.
pub mod reduce {
    pub const NONE: u32 = 0x00;
    pub const X: u32 = 0x01;
    pub const Y: u32 = 0x02;
    pub const ALL: u32 = X | Y;

    pub const NAMES: &[(&str, u32)] = &[("NONE", NONE), ("X", X), ("Y", Y), ("ALL", ALL)];
}

/// Parameters for a format conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertParams<'a> {
    pub source: &'a [u8],
    pub format: ImageFormat,
    pub quality: Quality,
}

/// Parameters for a thumbnail operation.
///
/// With `crop` set the image is filled and center-cropped to exactly
/// `width`×`height`; otherwise it is resized to exactly those dimensions
/// (already computed to preserve aspect ratio).
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailParams<'a> {
    pub source: &'a [u8],
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub crop: bool,
    pub quality: Quality,
    pub sharpening: Option<Sharpening>,
}

/// Parameters for compositing an overlay onto an image.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkParams<'a> {
    pub source: &'a [u8],
    pub format: ImageFormat,
    pub overlay: &'a [u8],
    /// Size the overlay is scaled to before compositing.
    pub overlay_width: u32,
    pub overlay_height: u32,
    /// Top-left corner of every copy of the overlay.
    pub positions: &'a [(i64, i64)],
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn sharpening_light_values() {
        let s = Sharpening::light();
        assert_eq!(s.sigma, 0.5);
        assert_eq!(s.threshold, 0);
    }

    // =========================================================================
    // ThumbnailSpec parsing
    // =========================================================================

    #[test]
    fn parse_crop_spec() {
        let spec: ThumbnailSpec = "200x150".parse().unwrap();
        assert_eq!(spec, ThumbnailSpec::crop(200, 150));
    }

    #[test]
    fn parse_inset_specs() {
        assert_eq!(
            "<800x600".parse::<ThumbnailSpec>().unwrap(),
            ThumbnailSpec::inset(Some(800), Some(600))
        );
        assert_eq!(
            "<800x".parse::<ThumbnailSpec>().unwrap(),
            ThumbnailSpec::inset(Some(800), None)
        );
        assert_eq!(
            "<x600".parse::<ThumbnailSpec>().unwrap(),
            ThumbnailSpec::inset(None, Some(600))
        );
    }

    #[test]
    fn parse_rejects_malformed_specs() {
        for bad in ["", "200", "200x", "x150", "<x", "0x10", "axb", "<-1x5"] {
            assert!(bad.parse::<ThumbnailSpec>().is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn spec_display_round_trips() {
        for s in ["200x150", "<800x600", "<800x", "<x600"] {
            assert_eq!(s.parse::<ThumbnailSpec>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn max_edge_ignores_missing_dimension() {
        assert_eq!(ThumbnailSpec::inset(None, Some(600)).max_edge(), 600);
        assert_eq!(ThumbnailSpec::crop(300, 200).max_edge(), 300);
    }
}
