use super::{BackendError, ImageBackend};
use crate::cache::{CacheStats, CacheStore};
use crate::types::{Image, ImagePath};
use std::sync::Arc;
use tracing::{debug, warn};

/// Read-through cache in front of another backend.
///
/// Entries are keyed by [`ImagePath::cache_key`]. Only successful fetches
/// are stored: a not-found is passed through untouched, so an image added to
/// the source later shows up without any invalidation. Cache store errors
/// never fail a fetch; a broken read counts as a miss and a broken write is
/// logged.
///
/// The store keeps bytes only, so a hit resolves its MIME type from the
/// content and then from the requested path's extension (see
/// [`detect_mime_type`](crate::types::detect_mime_type)). A type that is
/// neither sniffable nor named by the extension comes back as
/// `application/octet-stream` on hits.
pub struct CachingBackend {
    inner: Arc<dyn ImageBackend>,
    cache: Arc<dyn CacheStore>,
    stats: CacheStats,
}

impl CachingBackend {
    pub fn new(inner: Arc<dyn ImageBackend>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            inner,
            cache,
            stats: CacheStats::default(),
        }
    }
}

impl ImageBackend for CachingBackend {
    fn fetch(&self, path: &ImagePath) -> Result<Image, BackendError> {
        let key = path.cache_key();

        match self.cache.get(&key) {
            Ok(Some(bytes)) => {
                self.stats.hit();
                debug!(key = %key, stats = %self.stats, "cache hit");
                return Ok(Image::from_bytes_with_hint(bytes, path.path()));
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "cache read failed, treating as miss"),
        }
        self.stats.miss();
        debug!(key = %key, stats = %self.stats, "cache miss");

        let image = self.inner.fetch(path)?;
        if let Err(e) = self.cache.set(&key, image.bytes()) {
            warn!(key = %key, error = %e, "cache write failed");
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::MapBackend;
    use crate::cache::{CacheError, MemoryCache};

    fn caching(inner: &Arc<MapBackend>) -> (CachingBackend, Arc<MemoryCache>) {
        let store = Arc::new(MemoryCache::default());
        let backend = CachingBackend::new(inner.clone(), store.clone());
        (backend, store)
    }

    #[test]
    fn second_fetch_is_served_from_cache() {
        let inner = Arc::new(MapBackend::new().with("a.jpg", b"original"));
        let (backend, _) = caching(&inner);
        let path = ImagePath::new("s", "a.jpg");

        let first = backend.fetch(&path).unwrap();
        let second = backend.fetch(&path).unwrap();

        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(inner.calls(), 1);
        assert_eq!((backend.stats.hits(), backend.stats.misses()), (1, 1));
    }

    #[test]
    fn misses_are_not_cached() {
        let inner = Arc::new(MapBackend::new());
        let (backend, store) = caching(&inner);
        let path = ImagePath::new("s", "late.jpg");

        assert!(backend.fetch(&path).unwrap_err().is_not_found());
        assert!(store.is_empty());

        // The image appears in the source; no invalidation needed
        inner.insert("late.jpg", b"now here");
        assert_eq!(backend.fetch(&path).unwrap().bytes(), b"now here");
        assert_eq!(inner.calls(), 2);
    }

    #[test]
    fn entries_are_namespaced_by_prefix() {
        let inner = Arc::new(MapBackend::new().with("a.jpg", b"x"));
        let (backend, store) = caching(&inner);

        backend.fetch(&ImagePath::new("one", "a.jpg")).unwrap();
        backend.fetch(&ImagePath::new("two", "a.jpg")).unwrap();

        assert_eq!(inner.calls(), 2);
        assert_eq!(store.len(), 2);
        assert!(store.get("one/a.jpg").unwrap().is_some());
    }

    struct SvgOrigin;

    impl ImageBackend for SvgOrigin {
        fn fetch(&self, _path: &ImagePath) -> Result<Image, BackendError> {
            Ok(Image::new(b"<svg/>".to_vec(), "image/svg+xml"))
        }
    }

    #[test]
    fn hit_keeps_mime_of_unsniffable_type() {
        let backend = CachingBackend::new(Arc::new(SvgOrigin), Arc::new(MemoryCache::default()));
        let path = ImagePath::new("s", "icons/logo.svg");

        let first = backend.fetch(&path).unwrap();
        let second = backend.fetch(&path).unwrap();

        assert_eq!(backend.stats.hits(), 1);
        assert_eq!(first.mime_type(), "image/svg+xml");
        assert_eq!(second.mime_type(), first.mime_type());
    }

    struct FailingStore;

    impl CacheStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(std::io::Error::other("disk gone").into())
        }

        fn set(&self, _key: &str, _bytes: &[u8]) -> Result<(), CacheError> {
            Err(std::io::Error::other("disk gone").into())
        }
    }

    #[test]
    fn store_errors_fall_through_to_source() {
        let inner = Arc::new(MapBackend::new().with("a.jpg", b"x"));
        let backend = CachingBackend::new(inner.clone(), Arc::new(FailingStore));

        let path = ImagePath::new("s", "a.jpg");
        assert_eq!(backend.fetch(&path).unwrap().bytes(), b"x");
        assert_eq!(backend.fetch(&path).unwrap().bytes(), b"x");
        assert_eq!(inner.calls(), 2);
    }
}
