use super::{BackendError, ImageBackend};
use crate::types::{Image, ImagePath};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tries each member in order; the first one that finds the image wins.
///
/// When every member fails the result is a plain not-found. Member errors
/// other than not-found are logged and skipped, not aggregated.
pub struct SequentialBackend {
    backends: Vec<Arc<dyn ImageBackend>>,
}

impl SequentialBackend {
    pub fn new(backends: Vec<Arc<dyn ImageBackend>>) -> Self {
        Self { backends }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl ImageBackend for SequentialBackend {
    fn fetch(&self, path: &ImagePath) -> Result<Image, BackendError> {
        for (index, backend) in self.backends.iter().enumerate() {
            match backend.fetch(path) {
                Ok(image) => {
                    debug!(path = %path, member = index, "sequential hit");
                    return Ok(image);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(path = %path, member = index, error = %e, "backend failed, trying next"),
            }
        }
        Err(BackendError::not_found(path))
    }
}
