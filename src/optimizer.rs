//! Lossless optimizers backed by external executables.
//!
//! An optimizer takes encoded bytes and returns smaller encoded bytes of the
//! same image. Every optimizer here shells out: the bytes are written to a
//! private temp directory, the tool rewrites them into a second file, and the
//! result is read back.
//!
//! | Optimizer | Handles | Invocation |
//! |---|---|---|
//! | [`ToolOptimizer::jpegtran`] | `image/jpeg` | `jpegtran -copy none -optimize [-progressive] -outfile OUT IN` |
//! | [`ToolOptimizer::pngcrush`] | `image/png` | `pngcrush -q [-brute] IN OUT` |
//! | [`ToolOptimizer::command`] | configured | any program, `{input}`/`{output}` substituted |
//!
//! Optimizers skip images whose MIME type they do not handle, so a mixed
//! chain (`jpegtran` then `pngcrush`) can run over every image.

use crate::types::{Image, OCTET_STREAM, detect_mime_type};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
}

/// A lossless byte-level optimizer.
pub trait ImageOptimizer: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Whether this optimizer understands images of `mime_type`.
    fn handles(&self, mime_type: &str) -> bool;

    /// Optimize `image`. Only called for handled MIME types.
    fn optimize(&self, image: &Image) -> Result<Image, OptimizerError>;
}

/// Run `optimizers` in order, each consuming the previous output.
///
/// Optimizers that do not handle the current MIME type are skipped.
pub fn optimize_all(
    optimizers: &[Arc<dyn ImageOptimizer>],
    image: Image,
) -> Result<Image, OptimizerError> {
    optimizers.iter().try_fold(image, |image, optimizer| {
        if !optimizer.handles(image.mime_type()) {
            debug!(optimizer = optimizer.name(), mime = image.mime_type(), "skipping optimizer");
            return Ok(image);
        }
        let before = image.len();
        let optimized = optimizer.optimize(&image)?;
        debug!(
            optimizer = optimizer.name(),
            before,
            after = optimized.len(),
            "optimized"
        );
        Ok(optimized)
    })
}

/// An optimizer that runs an external program over a temp file.
#[derive(Debug, Clone)]
pub struct ToolOptimizer {
    name: String,
    program: PathBuf,
    /// Arguments with `{input}` / `{output}` placeholders.
    args: Vec<String>,
    mime_types: Vec<String>,
}

impl ToolOptimizer {
    /// `jpegtran` with metadata stripped and Huffman tables optimized.
    pub fn jpegtran(binary: Option<PathBuf>, progressive: bool) -> Self {
        let mut args = vec!["-copy", "none", "-optimize"];
        if progressive {
            args.push("-progressive");
        }
        args.extend(["-outfile", OUTPUT_PLACEHOLDER, INPUT_PLACEHOLDER]);
        Self::from_parts("jpegtran", binary, &args, &["image/jpeg"])
    }

    /// `pngcrush`, optionally trying every filter/compression method.
    pub fn pngcrush(binary: Option<PathBuf>, brute: bool) -> Self {
        let mut args = vec!["-q"];
        if brute {
            args.push("-brute");
        }
        args.extend([INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER]);
        Self::from_parts("pngcrush", binary, &args, &["image/png"])
    }

    /// Any program. `args` should mention `{input}` and `{output}`.
    pub fn command(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        mime_types: Vec<String>,
    ) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        Self {
            name,
            program,
            args,
            mime_types: mime_types
                .into_iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
        }
    }

    fn from_parts(name: &str, binary: Option<PathBuf>, args: &[&str], mime_types: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            program: binary.unwrap_or_else(|| PathBuf::from(name)),
            args: args.iter().map(|a| a.to_string()).collect(),
            mime_types: mime_types.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Arguments as passed to the program for the given file paths.
    pub fn render_args(&self, input: &str, output: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, input)
                    .replace(OUTPUT_PLACEHOLDER, output)
            })
            .collect()
    }
}

impl ImageOptimizer for ToolOptimizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, mime_type: &str) -> bool {
        self.mime_types
            .iter()
            .any(|m| m == "*" || m.eq_ignore_ascii_case(mime_type))
    }

    fn optimize(&self, image: &Image) -> Result<Image, OptimizerError> {
        let dir = tempfile::TempDir::new()?;
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        std::fs::write(&input, image.bytes())?;

        let args = self.render_args(
            &input.to_string_lossy(),
            &output.to_string_lossy(),
        );
        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| OptimizerError::Spawn {
                tool: self.name.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(OptimizerError::ToolFailed {
                tool: self.name.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let bytes = std::fs::read(&output)?;
        // Keep the input MIME unless the tool produced a recognizably different format
        let sniffed = detect_mime_type(&bytes, None);
        let mime_type = if sniffed == OCTET_STREAM {
            image.mime_type().to_string()
        } else {
            sniffed
        };
        Ok(Image::new(bytes, mime_type))
    }
}
