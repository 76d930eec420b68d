use super::{ImageManipulator, ManipulatorError};
use crate::optimizer::{ImageOptimizer, optimize_all};
use crate::types::{Image, ImagePath};
use std::sync::Arc;

/// Runs an optimizer chain as a pipeline step.
///
/// The MIME type is preserved unless an optimizer produces a different
/// format.
pub struct OptimizerManipulator {
    optimizers: Vec<Arc<dyn ImageOptimizer>>,
}

impl OptimizerManipulator {
    pub fn new(optimizers: Vec<Arc<dyn ImageOptimizer>>) -> Self {
        Self { optimizers }
    }

    pub fn len(&self) -> usize {
        self.optimizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.optimizers.is_empty()
    }
}

impl ImageManipulator for OptimizerManipulator {
    fn apply(&self, image: &Image, _path: &ImagePath) -> Result<Image, ManipulatorError> {
        Ok(optimize_all(&self.optimizers, image.clone())?)
    }
}
