//! Values that flow through every stage of a stack.
//!
//! An [`ImagePath`] names what the caller asked for; an [`Image`] is what the
//! backend chain and the manipulators hand to each other. Both are plain
//! values: manipulators build a new `Image` rather than mutating one in place.

use image::ImageFormat;
use std::fmt;
use std::path::Path;

/// MIME type used when neither the content nor the path identify the format.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A stack-relative logical path, namespaced by the owning stack.
///
/// The `prefix` is the stack name. It keeps cache keys from different stacks
/// apart even when they request the same `path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImagePath {
    prefix: String,
    path: String,
}

impl ImagePath {
    pub fn new(prefix: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Same prefix, different path. Used by path-rewriting backends.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            prefix: self.prefix.clone(),
            path: path.into(),
        }
    }

    /// Key under which cache stores file this path: `"{prefix}/{path}"`.
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.prefix, self.path)
    }

    /// Lowercased extension of the path, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.path)
    }
}

/// Encoded image bytes plus their MIME type.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    bytes: Vec<u8>,
    mime_type: String,
}

impl Image {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Build an image whose MIME type is sniffed from the bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = detect_mime_type(&bytes, None);
        Self { bytes, mime_type }
    }

    /// Like [`Image::from_bytes`], falling back to the extension of `path`.
    pub fn from_bytes_with_hint(bytes: Vec<u8>, path: &str) -> Self {
        let mime_type = detect_mime_type(&bytes, Some(path));
        Self { bytes, mime_type }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The codec matching the MIME type, when the `image` crate knows it.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime_type(&self.mime_type)
    }

    /// New image with `bytes`, keeping this image's MIME type.
    pub fn with_bytes(&self, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: self.mime_type.clone(),
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Image types the `image` crate cannot sniff, by extension.
const EXTRA_EXTENSIONS: &[(&str, &str)] = &[
    ("svg", "image/svg+xml"),
    ("svgz", "image/svg+xml"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("jxl", "image/jxl"),
];

/// Resolve a MIME type: content sniffing first, then the path extension.
pub fn detect_mime_type(bytes: &[u8], path: Option<&str>) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }
    let Some(path) = path else {
        return OCTET_STREAM.to_string();
    };
    if let Ok(format) = ImageFormat::from_path(path) {
        return format.to_mime_type().to_string();
    }
    let ext = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    ext.and_then(|ext| {
        EXTRA_EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, mime)| mime.to_string())
    })
    .unwrap_or_else(|| OCTET_STREAM.to_string())
}
