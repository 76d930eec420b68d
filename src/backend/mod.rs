//! Image backends: where source bytes come from.
//!
//! Every backend answers one question, `fetch(path) -> Image | NotFound`, so
//! they nest freely. A typical chain looks like:
//!
//! ```text
//! CachingBackend
//!   └── SequentialBackend
//!         ├── PathRuleBackend (thumb/… → orig/…)
//!         │     └── FileBackend (/srv/images)
//!         └── HttpBackend (https://origin.example.com/images)
//! ```
//!
//! | Backend | Behaviour |
//! |---|---|
//! | [`FileBackend`] | reads `root/path`, rejecting traversal out of `root` |
//! | [`HttpBackend`] | GETs `root_url/path`; any failure is not-found |
//! | [`CachingBackend`] | read-through cache keyed by `prefix/path`; misses are never cached |
//! | [`SequentialBackend`] | first member that finds the image wins |
//! | [`PathRuleBackend`] | rewrites the path with the first matching rule, then delegates |
//! | [`CallbackBackend`] | delegates to a closure supplied in code |
//!
//! Backends hold their children as `Arc<dyn ImageBackend>`: a registry owns
//! the named instances and several stacks may share one chain.

mod cache;
mod callback;
mod file;
mod http;
mod path_rule;
mod sequential;

pub use cache::CachingBackend;
pub use callback::{CallbackBackend, FetchCallback};
pub use file::FileBackend;
pub(crate) use file::safe_join;
pub use http::{DEFAULT_TIMEOUT_SECS, HttpBackend};
pub use path_rule::PathRuleBackend;
pub use sequential::SequentialBackend;

use crate::types::{Image, ImagePath};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backend failed: {0}")]
    Failed(String),
}

impl BackendError {
    pub fn not_found(path: &ImagePath) -> Self {
        Self::NotFound(path.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A source of raw image bytes for a logical path.
pub trait ImageBackend: Send + Sync {
    /// Resolve `path` to an image, or [`BackendError::NotFound`].
    fn fetch(&self, path: &ImagePath) -> Result<Image, BackendError>;
}
