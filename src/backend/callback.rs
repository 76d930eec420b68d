use super::{BackendError, ImageBackend};
use crate::types::{Image, ImagePath};
use std::fmt;
use std::sync::Arc;

/// Resolver supplied in code for a [`CallbackBackend`].
pub type FetchCallback = Arc<dyn Fn(&ImagePath) -> Result<Image, BackendError> + Send + Sync>;

/// Delegates every fetch to a caller-supplied closure.
///
/// This is the extension point for sources the built-in backends do not
/// model. In configuration the closure is referenced by the name it was
/// registered under on the [`StackFactory`](crate::factory::StackFactory).
#[derive(Clone)]
pub struct CallbackBackend {
    callback: FetchCallback,
}

impl CallbackBackend {
    pub fn new(callback: FetchCallback) -> Self {
        Self { callback }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&ImagePath) -> Result<Image, BackendError> + Send + Sync + 'static,
    {
        Self::new(Arc::new(f))
    }
}

impl fmt::Debug for CallbackBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackBackend")
    }
}

impl ImageBackend for CallbackBackend {
    fn fetch(&self, path: &ImagePath) -> Result<Image, BackendError> {
        (self.callback)(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegates_to_closure() {
        let backend = CallbackBackend::from_fn(|path| {
            if path.path().ends_with(".png") {
                Ok(Image::new(path.cache_key().into_bytes(), "image/png"))
            } else {
                Err(BackendError::not_found(path))
            }
        });

        let image = backend.fetch(&ImagePath::new("s", "a.png")).unwrap();
        assert_eq!(image.bytes(), b"s/a.png");
        assert!(backend.fetch(&ImagePath::new("s", "a.jpg")).unwrap_err().is_not_found());
    }

    #[test]
    fn callback_errors_pass_through() {
        let backend = CallbackBackend::from_fn(|_| Err(BackendError::Failed("upstream".into())));
        let err = backend.fetch(&ImagePath::new("s", "a")).unwrap_err();
        assert!(matches!(err, BackendError::Failed(msg) if msg == "upstream"));
    }
}
