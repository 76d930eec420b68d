use super::{BackendError, ImageBackend};
use crate::rule::RuleSet;
use crate::types::{Image, ImagePath};
use std::sync::Arc;
use tracing::debug;

/// Rewrites the requested path with the first matching rule, then delegates.
///
/// When no rule matches, the inner backend sees the original path.
pub struct PathRuleBackend {
    inner: Arc<dyn ImageBackend>,
    rules: RuleSet,
}

impl PathRuleBackend {
    pub fn new(inner: Arc<dyn ImageBackend>, rules: RuleSet) -> Self {
        Self { inner, rules }
    }

    /// The path the inner backend is asked for.
    pub fn rewrite(&self, path: &ImagePath) -> ImagePath {
        match self.rules.first_match(path.path()) {
            Some(rewritten) => {
                debug!(from = path.path(), to = %rewritten, "path rule applied");
                path.with_path(rewritten)
            }
            None => path.clone(),
        }
    }
}

impl ImageBackend for PathRuleBackend {
    fn fetch(&self, path: &ImagePath) -> Result<Image, BackendError> {
        self.inner.fetch(&self.rewrite(path))
    }
}
