//! The image stack: fetch, transform, store.
//!
//! [`ImageStack::stack_image`] is the whole request path:
//!
//! 1. fetch from the root backend (not-found ends the call);
//! 2. run every manipulator in declaration order, each on the previous output;
//! 3. write the result to storage, if configured;
//! 4. return the image.
//!
//! Only step 1 has a caller-visible "expected" failure. A manipulator error
//! ends the call as a processing failure and is never retried here. A storage
//! failure never fails the call: it is logged and handed back alongside the
//! image as [`StackedImage::storage_warning`].

use crate::backend::{BackendError, ImageBackend};
use crate::manipulator::{ImageManipulator, ManipulatorError};
use crate::storage::{StorageBackend, StorageError};
use crate::types::{Image, ImagePath};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(BackendError),
    #[error("Manipulation failed: {0}")]
    Manipulation(#[from] ManipulatorError),
}

impl StackError {
    /// Whether this should become a "not found" response at the boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<BackendError> for StackError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::NotFound(path) => Self::NotFound(path),
            other => Self::Backend(other),
        }
    }
}

/// Result of a successful [`ImageStack::stack_image`].
#[derive(Debug)]
pub struct StackedImage {
    pub image: Image,
    /// Set when write-back was attempted and failed.
    pub storage_warning: Option<StorageError>,
}

/// A backend, an ordered manipulator pipeline and optional write-back.
pub struct ImageStack {
    backend: Arc<dyn ImageBackend>,
    manipulators: Vec<Arc<dyn ImageManipulator>>,
    storage: Option<Arc<dyn StorageBackend>>,
}

impl ImageStack {
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        Self {
            backend,
            manipulators: Vec::new(),
            storage: None,
        }
    }

    pub fn with_manipulator(mut self, manipulator: Arc<dyn ImageManipulator>) -> Self {
        self.add_manipulator(manipulator);
        self
    }

    pub fn add_manipulator(&mut self, manipulator: Arc<dyn ImageManipulator>) {
        self.manipulators.push(manipulator);
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn manipulator_count(&self) -> usize {
        self.manipulators.len()
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub fn stack_image(&self, path: &ImagePath) -> Result<StackedImage, StackError> {
        let mut image = self.backend.fetch(path)?;
        debug!(path = %path, mime = image.mime_type(), bytes = image.len(), "fetched");

        for manipulator in &self.manipulators {
            image = manipulator.apply(&image, path)?;
        }

        let storage_warning = self.storage.as_ref().and_then(|storage| {
            storage
                .store(path, &image)
                .inspect_err(|e| warn!(path = %path, "storage write-back failed: {e}"))
                .err()
        });

        Ok(StackedImage {
            image,
            storage_warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CallbackBackend;
    use crate::backend::tests::{BrokenBackend, MapBackend};
    use crate::imaging::processor::tests::{MockProcessor, RecordedOp};
    use crate::imaging::{Overlay, Quality, WatermarkConfig};
    use crate::manipulator::{Converter, Watermark};
    use crate::storage::FileStorage;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Appends its tag to the bytes so the order of application is visible.
    struct Tag(&'static str);

    impl ImageManipulator for Tag {
        fn apply(&self, image: &Image, _path: &ImagePath) -> Result<Image, ManipulatorError> {
            let mut bytes = image.bytes().to_vec();
            bytes.extend_from_slice(self.0.as_bytes());
            Ok(image.with_bytes(bytes))
        }
    }

    struct Failing;

    impl ImageManipulator for Failing {
        fn apply(&self, image: &Image, _path: &ImagePath) -> Result<Image, ManipulatorError> {
            Err(ManipulatorError::UnsupportedType(image.mime_type().to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        stored: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl StorageBackend for RecordingStorage {
        fn store(&self, path: &ImagePath, image: &Image) -> Result<(), StorageError> {
            self.stored
                .lock()
                .push((path.cache_key(), image.bytes().to_vec()));
            Ok(())
        }
    }

    fn path(p: &str) -> ImagePath {
        ImagePath::new("s", p)
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    #[test]
    fn no_manipulators_returns_fetched_image() {
        let backend = Arc::new(MapBackend::new().with("a.jpg", b"raw"));
        let stack = ImageStack::new(backend);

        let out = stack.stack_image(&path("a.jpg")).unwrap();
        assert_eq!(out.image.bytes(), b"raw");
        assert!(out.storage_warning.is_none());
    }

    #[test]
    fn not_found_propagates_and_skips_everything_else() {
        let storage = Arc::new(RecordingStorage::default());
        let stack = ImageStack::new(Arc::new(MapBackend::new()))
            .with_manipulator(Arc::new(Failing))
            .with_storage(storage.clone());

        let err = stack.stack_image(&path("missing.jpg")).unwrap_err();
        assert!(err.is_not_found());
        assert!(storage.stored.lock().is_empty());
    }

    #[test]
    fn other_backend_errors_are_not_not_found() {
        let stack = ImageStack::new(Arc::new(BrokenBackend));
        let err = stack.stack_image(&path("a.jpg")).unwrap_err();
        assert!(matches!(err, StackError::Backend(_)));
        assert!(!err.is_not_found());
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    #[test]
    fn manipulators_apply_in_declaration_order() {
        let backend = Arc::new(MapBackend::new().with("a.jpg", b"raw"));
        let stack = ImageStack::new(backend)
            .with_manipulator(Arc::new(Tag("-1")))
            .with_manipulator(Arc::new(Tag("-2")))
            .with_manipulator(Arc::new(Tag("-3")));

        let out = stack.stack_image(&path("a.jpg")).unwrap();
        assert_eq!(out.image.bytes(), b"raw-1-2-3");
    }

    #[test]
    fn manipulator_failure_is_a_processing_error() {
        let backend = Arc::new(MapBackend::new().with("a.jpg", b"raw"));
        let stack = ImageStack::new(backend)
            .with_manipulator(Arc::new(Tag("-1")))
            .with_manipulator(Arc::new(Failing));

        let err = stack.stack_image(&path("a.jpg")).unwrap_err();
        assert!(matches!(err, StackError::Manipulation(_)));
    }

    #[test]
    fn converter_output_feeds_watermark() {
        let processor = Arc::new(MockProcessor::with_fixed_dimensions(200, 100));
        let backend = Arc::new(CallbackBackend::from_fn(|_| {
            Ok(Image::new(b"jpeg".to_vec(), "image/jpeg"))
        }));
        let converter = Converter::new(
            processor.clone(),
            [("image/jpeg", "png")],
            Quality::default(),
        )
        .unwrap();
        let overlay = Overlay {
            bytes: b"logo".to_vec(),
            width: 20,
            height: 10,
        };
        let watermark = Watermark::new(processor.clone(), overlay, WatermarkConfig::default());

        let stack = ImageStack::new(backend)
            .with_manipulator(Arc::new(converter))
            .with_manipulator(Arc::new(watermark));
        let out = stack.stack_image(&path("a.jpg")).unwrap();

        assert_eq!(out.image.bytes(), b"watermarked:converted:png");
        assert_eq!(out.image.mime_type(), "image/png");

        let ops = processor.get_operations();
        let convert_at = ops
            .iter()
            .position(|op| matches!(op, RecordedOp::Convert { .. }))
            .unwrap();
        let watermark_at = ops
            .iter()
            .position(|op| matches!(op, RecordedOp::Watermark { .. }))
            .unwrap();
        assert!(convert_at < watermark_at);
        assert!(matches!(
            &ops[watermark_at],
            RecordedOp::Watermark { input, .. } if *input == b"converted:png"
        ));
    }

    // =========================================================================
    // Storage
    // =========================================================================

    #[test]
    fn stores_final_image_under_requested_path() {
        let storage = Arc::new(RecordingStorage::default());
        let backend = Arc::new(MapBackend::new().with("a.jpg", b"raw"));
        let stack = ImageStack::new(backend)
            .with_manipulator(Arc::new(Tag("+")))
            .with_storage(storage.clone());

        stack.stack_image(&path("a.jpg")).unwrap();
        assert_eq!(
            *storage.stored.lock(),
            vec![("s/a.jpg".to_string(), b"raw+".to_vec())]
        );
    }

    #[test]
    fn storage_failure_is_a_warning_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let backend = Arc::new(MapBackend::new().with("a.jpg", b"raw"));
        let stack = ImageStack::new(backend).with_storage(Arc::new(FileStorage::new(&blocker)));

        let out = stack.stack_image(&path("a.jpg")).unwrap();
        assert_eq!(out.image.bytes(), b"raw");
        assert!(matches!(out.storage_warning, Some(StorageError::Io(_))));
    }
}
