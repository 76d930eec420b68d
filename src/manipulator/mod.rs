//! Image manipulators: the transform pipeline of a stack.
//!
//! A manipulator takes the current [`Image`] plus the requested
//! [`ImagePath`] and returns a new image. Stacks run their manipulators
//! strictly in declaration order, each one seeing the previous output.
//! There is no short-circuit: a manipulator that has nothing to do (a
//! thumbnailer with no matching rule, a converter with no table entry)
//! returns its input unchanged.
//!
//! | Manipulator | Does |
//! |---|---|
//! | [`Converter`] | re-encodes per a source→target format table |
//! | [`Thumbnailer`] | resizes/crops per the first rule matching the path |
//! | [`Watermark`] | composites an overlay with anchor/repeat/reduce flags |
//! | [`OptimizerManipulator`] | runs lossless optimizers over the bytes |

mod converter;
mod optimizer;
mod thumbnailer;
mod watermark;

pub use converter::{Converter, parse_target_format};
pub use optimizer::OptimizerManipulator;
pub use thumbnailer::{DEFAULT_MAX_DIMENSION, Thumbnailer};
pub use watermark::{Watermark, parse_flags};

use crate::imaging::ProcessingError;
use crate::optimizer::OptimizerError;
use crate::types::{Image, ImagePath};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManipulatorError {
    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessingError),
    #[error("Optimization failed: {0}")]
    Optimizer(#[from] OptimizerError),
    #[error("Invalid thumbnail format '{format}': {reason}")]
    InvalidThumbnail { format: String, reason: String },
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),
}

/// One step of a stack's transform pipeline.
pub trait ImageManipulator: Send + Sync {
    /// Transform `image`, which was requested as `path`.
    fn apply(&self, image: &Image, path: &ImagePath) -> Result<Image, ManipulatorError>;
}

/// The codec of `image`, or an error naming its MIME type.
fn image_format(image: &Image) -> Result<image::ImageFormat, ManipulatorError> {
    image
        .format()
        .ok_or_else(|| ManipulatorError::UnsupportedType(image.mime_type().to_string()))
}
