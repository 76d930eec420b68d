//! Image processing: pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Convert** | `image` encoders (JPEG quality, rav1e AVIF) |
//! | **Thumbnail** | `resize_to_fill` / `resize_exact` + `unsharpen` |
//! | **Watermark** | `imageops::overlay`, tiled per anchor/repeat flags |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and placement math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Processor**: [`ImageProcessor`] trait + [`RustProcessor`]
//! - **Operations**: High-level functions combining calculations + processor

mod calculations;
pub mod operations;
pub mod params;
pub mod processor;
pub mod rust_processor;

pub use operations::{
    Overlay, ThumbnailConfig, WatermarkConfig, apply_watermark, convert_image, create_thumbnail,
    get_dimensions,
};
pub use params::{Quality, Sharpening, ThumbnailMode, ThumbnailSpec, anchor, reduce, repeat};
pub use processor::{Dimensions, ImageProcessor, ProcessingError};
pub use rust_processor::RustProcessor;
