use super::{ImageManipulator, ManipulatorError, image_format};
use crate::config::{ConfigError, FlagSpec};
use crate::imaging::{ImageProcessor, Overlay, WatermarkConfig, apply_watermark, anchor, reduce, repeat};
use crate::types::{Image, ImagePath};
use std::path::Path;
use std::sync::Arc;

/// Composites an overlay image onto every image passing through.
///
/// Placement is controlled by three flag sets (see
/// [`imaging::params`](crate::imaging::params)): `anchor` picks the corner or
/// edge, `repeat` tiles along X and/or Y from the anchored position, and
/// `reduce` lets the overlay shrink to fit a smaller image. The overlay is
/// read and identified once, when the manipulator is built.
pub struct Watermark {
    processor: Arc<dyn ImageProcessor>,
    overlay: Overlay,
    config: WatermarkConfig,
}

impl Watermark {
    pub fn new(processor: Arc<dyn ImageProcessor>, overlay: Overlay, config: WatermarkConfig) -> Self {
        Self {
            processor,
            overlay,
            config,
        }
    }

    /// Load the overlay from `path`. A missing or undecodable file is a
    /// configuration error.
    pub fn from_file(
        processor: Arc<dyn ImageProcessor>,
        path: &Path,
        config: WatermarkConfig,
    ) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        let overlay = Overlay::load(processor.as_ref(), bytes).map_err(|e| {
            ConfigError::Validation(format!("watermark {}: {e}", path.display()))
        })?;
        Ok(Self::new(processor, overlay, config))
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    /// Resolve the three flag settings, applying the defaults for unset ones.
    pub fn resolve_flags(
        anchor_flags: Option<&FlagSpec>,
        repeat_flags: Option<&FlagSpec>,
        reduce_flags: Option<&FlagSpec>,
    ) -> Result<(u32, u32, u32), ConfigError> {
        let defaults = WatermarkConfig::default();
        let resolve = |spec: Option<&FlagSpec>, kind, table, default| match spec {
            None => Ok(default),
            Some(FlagSpec::Bits(bits)) => Ok(*bits),
            Some(FlagSpec::Names(names)) => parse_flags(kind, names, table),
        };
        Ok((
            resolve(anchor_flags, "anchor", anchor::NAMES, defaults.anchor)?,
            resolve(repeat_flags, "repeat", repeat::NAMES, defaults.repeat)?,
            resolve(reduce_flags, "reduce", reduce::NAMES, defaults.reduce)?,
        ))
    }
}

impl ImageManipulator for Watermark {
    fn apply(&self, image: &Image, _path: &ImagePath) -> Result<Image, ManipulatorError> {
        let format = image_format(image)?;
        let bytes = apply_watermark(
            self.processor.as_ref(),
            image.bytes(),
            format,
            &self.overlay,
            &self.config,
        )?;
        Ok(image.with_bytes(bytes))
    }
}

/// Parse a flag value such as `"top left"`, `"BOTTOM|RIGHT"` or `"0x11"`.
///
/// A value that reads as an integer (decimal or `0x` hex) is taken as the
/// pre-combined mask, so `"17"` and `17` agree. Otherwise the value is
/// uppercased and split on any run of non-letters; each name is looked up in
/// `table` and the flags are OR-ed together. Empty tokens from leading or
/// trailing delimiters are ignored, but a value with no name at all, or with
/// an unknown name, fails with [`ConfigError::InvalidFlag`].
pub fn parse_flags(kind: &str, value: &str, table: &[(&str, u32)]) -> Result<u32, ConfigError> {
    if let Some(bits) = parse_mask(value.trim()) {
        return Ok(bits);
    }

    let invalid = |token: &str| ConfigError::InvalidFlag {
        kind: kind.to_string(),
        value: token.to_string(),
    };

    let upper = value.to_ascii_uppercase();
    let mut tokens = upper
        .split(|c: char| !c.is_ascii_uppercase())
        .filter(|token| !token.is_empty())
        .peekable();
    if tokens.peek().is_none() {
        return Err(invalid(value));
    }

    tokens.try_fold(0, |flags, token| {
        table
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, bit)| flags | bit)
            .ok_or_else(|| invalid(token))
    })
}

fn parse_mask(value: &str) -> Option<u32> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
