use super::{ImageManipulator, ManipulatorError, image_format};
use crate::config::ConfigError;
use crate::imaging::{ImageProcessor, Quality, convert_image};
use crate::types::{Image, ImagePath};
use image::ImageFormat;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Formats the processor can encode.
const ENCODABLE: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Tiff,
    ImageFormat::WebP,
    ImageFormat::Avif,
];

/// Wildcard table key matching any image.
const ANY: &str = "*";

/// Re-encodes images according to a conversion table.
///
/// Table keys are source MIME types (`image/png`), file extensions (`png`)
/// or `*`; values are target formats given as an extension or a MIME type.
/// Lookup tries the image's MIME type, then the requested path's extension,
/// then `*`. Images without an entry, or already in the target format, pass
/// through untouched.
pub struct Converter {
    processor: Arc<dyn ImageProcessor>,
    conversions: BTreeMap<String, ImageFormat>,
    quality: Quality,
}

impl Converter {
    pub fn new<I, K, V>(
        processor: Arc<dyn ImageProcessor>,
        conversions: I,
        quality: Quality,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let conversions = conversions
            .into_iter()
            .map(|(from, to)| {
                let target = parse_target_format(to.as_ref())?;
                Ok((from.as_ref().trim().to_ascii_lowercase(), target))
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self {
            processor,
            conversions,
            quality,
        })
    }

    /// Target format for `image` requested as `path`, if the table has one.
    pub fn target_for(&self, image: &Image, path: &ImagePath) -> Option<ImageFormat> {
        let mime = image.mime_type().to_ascii_lowercase();
        self.conversions
            .get(&mime)
            .or_else(|| path.extension().and_then(|ext| self.conversions.get(&ext)))
            .or_else(|| self.conversions.get(ANY))
            .copied()
    }
}

impl ImageManipulator for Converter {
    fn apply(&self, image: &Image, path: &ImagePath) -> Result<Image, ManipulatorError> {
        let Some(target) = self.target_for(image, path) else {
            return Ok(image.clone());
        };
        let source = image_format(image)?;
        if source == target {
            return Ok(image.clone());
        }

        debug!(path = %path, from = image.mime_type(), to = target.to_mime_type(), "converting");
        let bytes = convert_image(self.processor.as_ref(), image.bytes(), target, self.quality)?;
        Ok(Image::new(bytes, target.to_mime_type()))
    }
}

/// Parse a target format given as an extension (`webp`) or MIME type.
pub fn parse_target_format(value: &str) -> Result<ImageFormat, ConfigError> {
    let value = value.trim().to_ascii_lowercase();
    let format = ImageFormat::from_extension(value.trim_start_matches('.'))
        .or_else(|| ImageFormat::from_mime_type(&value))
        .ok_or_else(|| ConfigError::Validation(format!("unknown image format '{value}'")))?;
    if !ENCODABLE.contains(&format) {
        return Err(ConfigError::Validation(format!(
            "cannot encode to '{value}'"
        )));
    }
    Ok(format)
}
