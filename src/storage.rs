//! Storage backends: where processed images are written back.
//!
//! Write-back is best effort. A stack that fails to store its result still
//! returns the image; the failure comes back as a warning on the
//! [`StackedImage`](crate::stack::StackedImage).
//!
//! Files land at `root/path`, or `root/prefix/path` with `use_prefix`, so a
//! web server can serve them directly on the next request.

use crate::backend::safe_join;
use crate::optimizer::{ImageOptimizer, OptimizerError, optimize_all};
use crate::types::{Image, ImagePath};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Refusing to store outside the storage root: {0}")]
    InvalidPath(String),
    #[error("Optimization failed: {0}")]
    Optimizer(#[from] OptimizerError),
}

/// Persists processed images.
pub trait StorageBackend: Send + Sync {
    fn store(&self, path: &ImagePath, image: &Image) -> Result<(), StorageError>;
}

/// Writes images under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    use_prefix: bool,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            use_prefix: false,
        }
    }

    /// Store under `root/prefix/` instead of directly under `root`.
    pub fn with_prefix(mut self, use_prefix: bool) -> Self {
        self.use_prefix = use_prefix;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `path` is written.
    pub fn target_path(&self, path: &ImagePath) -> Result<PathBuf, StorageError> {
        let relative = if self.use_prefix {
            format!("{}/{}", path.prefix(), path.path())
        } else {
            path.path().to_string()
        };
        safe_join(&self.root, &relative).ok_or_else(|| StorageError::InvalidPath(path.to_string()))
    }
}

impl StorageBackend for FileStorage {
    fn store(&self, path: &ImagePath, image: &Image) -> Result<(), StorageError> {
        let target = self.target_path(path)?;
        write_atomic(&target, image.bytes())?;
        Ok(())
    }
}

/// [`FileStorage`] that runs an optimizer chain before writing.
pub struct OptimizedFileStorage {
    file: FileStorage,
    optimizers: Vec<Arc<dyn ImageOptimizer>>,
}

impl OptimizedFileStorage {
    pub fn new(file: FileStorage, optimizers: Vec<Arc<dyn ImageOptimizer>>) -> Self {
        Self { file, optimizers }
    }
}

impl StorageBackend for OptimizedFileStorage {
    fn store(&self, path: &ImagePath, image: &Image) -> Result<(), StorageError> {
        let optimized = optimize_all(&self.optimizers, image.clone())?;
        self.file.store(path, &optimized)
    }
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
///
/// Parent directories are created as needed. Readers never observe a
/// partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other(format!("no parent directory: {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
