//! Image processing trait and shared types.
//!
//! The [`ImageProcessor`] trait is the boundary between the pipeline and the
//! pixel library. Every operation takes encoded bytes and returns encoded
//! bytes, so manipulators never hold a decoded image across calls.
//!
//! The production implementation is
//! [`RustProcessor`](super::rust_processor::RustProcessor), built on the
//! `image` crate.

use super::params::{ConvertParams, ThumbnailParams, WatermarkParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for pixel-level image processing.
///
/// Implementations must be shareable across threads: a single processor
/// serves every manipulator of every stack.
pub trait ImageProcessor: Send + Sync {
    /// Decode just enough to report the image dimensions.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, ProcessingError>;

    /// Re-encode into another format.
    fn convert(&self, params: &ConvertParams<'_>) -> Result<Vec<u8>, ProcessingError>;

    /// Resize (and optionally center-crop) into a thumbnail.
    fn thumbnail(&self, params: &ThumbnailParams<'_>) -> Result<Vec<u8>, ProcessingError>;

    /// Composite an overlay onto the image at the given positions.
    fn watermark(&self, params: &WatermarkParams<'_>) -> Result<Vec<u8>, ProcessingError>;
}
