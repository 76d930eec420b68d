use super::{ImageManipulator, ManipulatorError, image_format};
use crate::imaging::{ImageProcessor, ThumbnailConfig, ThumbnailSpec, create_thumbnail};
use crate::rule::RuleSet;
use crate::types::{Image, ImagePath};
use std::sync::Arc;
use tracing::debug;

/// Largest thumbnail edge accepted when none is configured.
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Resizes images according to the first rule matching the requested path.
///
/// Rules render a thumbnail format (see [`ThumbnailSpec`]), typically from
/// capture groups: `^t_(\d+)x(\d+)/` → `{1}x{2}`. The path matched is the
/// one the caller asked for, not whatever a path-rule backend rewrote it to.
/// No matching rule means the image passes through unchanged.
pub struct Thumbnailer {
    processor: Arc<dyn ImageProcessor>,
    rules: RuleSet,
    config: ThumbnailConfig,
    max_dimension: u32,
}

impl Thumbnailer {
    pub fn new(processor: Arc<dyn ImageProcessor>, rules: RuleSet, config: ThumbnailConfig) -> Self {
        Self {
            processor,
            rules,
            config,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// The thumbnail format selected for `path`, if any rule matches.
    pub fn spec_for(&self, path: &ImagePath) -> Result<Option<ThumbnailSpec>, ManipulatorError> {
        let Some(format) = self.rules.first_match(path.path()) else {
            return Ok(None);
        };
        let spec: ThumbnailSpec = format.parse().map_err(|reason| {
            ManipulatorError::InvalidThumbnail {
                format: format.clone(),
                reason,
            }
        })?;
        if spec.max_edge() > self.max_dimension {
            return Err(ManipulatorError::InvalidThumbnail {
                format,
                reason: format!("exceeds the {}px limit", self.max_dimension),
            });
        }
        Ok(Some(spec))
    }
}

impl ImageManipulator for Thumbnailer {
    fn apply(&self, image: &Image, path: &ImagePath) -> Result<Image, ManipulatorError> {
        let Some(spec) = self.spec_for(path)? else {
            return Ok(image.clone());
        };
        let format = image_format(image)?;

        debug!(path = %path, spec = %spec, "thumbnailing");
        let bytes = create_thumbnail(
            self.processor.as_ref(),
            image.bytes(),
            format,
            &spec,
            &self.config,
        )?;
        Ok(image.with_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::processor::tests::{MockProcessor, RecordedOp};
    use crate::rule::PatternRule;

    fn thumbnailer(rules: &[(&str, &str)]) -> (Arc<MockProcessor>, Thumbnailer) {
        let processor = Arc::new(MockProcessor::with_fixed_dimensions(800, 600));
        let rules = rules
            .iter()
            .map(|(p, t)| PatternRule::new(p, *t).unwrap())
            .collect();
        let thumbnailer = Thumbnailer::new(processor.clone(), rules, ThumbnailConfig::default());
        (processor, thumbnailer)
    }

    fn jpeg() -> Image {
        Image::new(b"jpeg".to_vec(), "image/jpeg")
    }

    #[test]
    fn matching_rule_crops_to_rendered_size() {
        let (processor, thumbs) = thumbnailer(&[(r"^t_(\d+)x(\d+)/(.+)$", "{1}x{2}")]);
        let out = thumbs.apply(&jpeg(), &ImagePath::new("s", "t_100x80/cat.jpg")).unwrap();

        assert_eq!(out.bytes(), b"thumb:100x80");
        assert_eq!(out.mime_type(), "image/jpeg");
        assert!(matches!(
            processor.get_operations().last(),
            Some(RecordedOp::Thumbnail {
                width: 100,
                height: 80,
                crop: true,
                ..
            })
        ));
    }

    #[test]
    fn inset_rule_preserves_aspect() {
        let (processor, thumbs) = thumbnailer(&[(r"^small/", "<400x")]);
        thumbs.apply(&jpeg(), &ImagePath::new("s", "small/a.jpg")).unwrap();

        assert!(matches!(
            processor.get_operations().last(),
            Some(RecordedOp::Thumbnail {
                width: 400,
                height: 300,
                crop: false,
                ..
            })
        ));
    }

    #[test]
    fn no_match_passes_through() {
        let (processor, thumbs) = thumbnailer(&[(r"^t_(\d+)x(\d+)/", "{1}x{2}")]);
        let out = thumbs.apply(&jpeg(), &ImagePath::new("s", "cat.jpg")).unwrap();
        assert_eq!(out, jpeg());
        assert!(processor.get_operations().is_empty());
    }

    #[test]
    fn first_rule_wins() {
        let (_, thumbs) = thumbnailer(&[("^a/", "10x10"), ("^a/b/", "20x20")]);
        let spec = thumbs.spec_for(&ImagePath::new("s", "a/b/c.jpg")).unwrap();
        assert_eq!(spec, Some(ThumbnailSpec::crop(10, 10)));
    }

    #[test]
    fn malformed_rendered_format_is_an_error() {
        let (_, thumbs) = thumbnailer(&[(r"^t_(\w+)/", "{1}")]);
        let err = thumbs.apply(&jpeg(), &ImagePath::new("s", "t_huge/a.jpg")).unwrap_err();
        assert!(matches!(err, ManipulatorError::InvalidThumbnail { ref format, .. } if format == "huge"));
    }

    #[test]
    fn oversized_request_is_rejected() {
        let (_, thumbs) = thumbnailer(&[(r"^t_(\d+)/", "{1}x{1}")]);
        let thumbs = thumbs.with_max_dimension(1000);
        assert!(thumbs.spec_for(&ImagePath::new("s", "t_1000/a.jpg")).is_ok());
        let err = thumbs.spec_for(&ImagePath::new("s", "t_1001/a.jpg")).unwrap_err();
        assert!(matches!(err, ManipulatorError::InvalidThumbnail { .. }));
    }
}
