use super::{BackendError, ImageBackend};
use crate::types::{Image, ImagePath};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Reads images from a directory tree.
///
/// `path` is resolved relative to `root`. Paths that climb out of the root
/// (`..`, absolute paths, or a symlink pointing elsewhere) are reported as
/// not found rather than read.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageBackend for FileBackend {
    fn fetch(&self, path: &ImagePath) -> Result<Image, BackendError> {
        let Some(full) = safe_join(&self.root, path.path()) else {
            debug!(path = %path, "rejected path outside backend root");
            return Err(BackendError::not_found(path));
        };
        if !full.is_file() {
            return Err(BackendError::not_found(path));
        }

        // The lexical check passed; make sure no symlink leads out of the root.
        let canonical = full.canonicalize()?;
        if !canonical.starts_with(self.root.canonicalize()?) {
            debug!(path = %path, target = %canonical.display(), "rejected symlink escape");
            return Err(BackendError::not_found(path));
        }

        let bytes = std::fs::read(&canonical)?;
        Ok(Image::from_bytes_with_hint(bytes, path.path()))
    }
}

/// Join a relative, slash-separated path onto `root`.
///
/// Returns `None` for anything that is not a plain relative path: parent
/// components, root or drive prefixes, and empty paths.
pub(crate) fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    let mut pushed = false;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                out.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    pushed.then_some(out)
}
