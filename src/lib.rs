//! # Image Stack
//!
//! A composable image-serving pipeline. A caller asks a named *stack* for an
//! image path; the stack fetches the original from a *backend*, runs it
//! through an ordered list of *manipulators*, optionally writes the result to
//! a *storage*, and returns the bytes with their MIME type.
//!
//! ```text
//! (stack, path) ─► Backend chain ─► Manipulator 1 ─► … ─► Manipulator N ─► Image
//!                  (file, http,                                   │
//!                   cache, rules)                                 └─► Storage (best effort)
//! ```
//!
//! The HTTP layer that maps routes to `(stack, path)` and turns
//! [`stack::StackError::is_not_found`] into a 404 is not part of this crate.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`stack`] | The orchestrator: fetch, manipulate in order, store |
//! | [`backend`] | Image sources: file, HTTP, cache, sequential, path-rule, callback |
//! | [`manipulator`] | Pipeline steps: converter, thumbnailer, watermark, optimizer |
//! | [`storage`] | Write-back of processed images |
//! | [`optimizer`] | Lossless optimizers backed by external executables |
//! | [`cache`] | Byte stores behind the caching backend |
//! | [`imaging`] | Pixel work behind a trait: decode, resize, crop, composite, encode |
//! | [`rule`] | Regex pattern → template rules for path rewriting and thumbnail formats |
//! | [`config`] | TOML loading, shorthand normalization and validation |
//! | [`registry`] | Named, memoized, lazily built instances |
//! | [`factory`] | Driver dispatch from options to live instances |
//! | [`types`] | [`ImagePath`](types::ImagePath) and [`Image`](types::Image) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Everything Behind a Trait
//!
//! Each pluggable family is a trait object (`Arc<dyn ImageBackend>`,
//! `Arc<dyn ImageManipulator>`, ...). Composite backends hold their children
//! the same way, so a cache can wrap a sequential backend that wraps a
//! path-rule backend without any of them knowing the others' types. Pixel
//! work sits behind [`imaging::ImageProcessor`] so manipulator logic is
//! tested with a recording mock instead of real encodes.
//!
//! ## Named Instances Are Built Once
//!
//! Configuration declares entries by name. The [`factory::StackFactory`]
//! builds a named entry on first use and hands out the same `Arc` afterwards,
//! even under concurrent first access. Inline tables build a private
//! instance every time. Misconfiguration (unknown name or driver, bad regex,
//! unknown flag, unreadable watermark) is a [`config::ConfigError`] raised at
//! load or construction time; `check` constructs everything up front.
//!
//! ## Caching Happens Before Manipulation
//!
//! The cache is a backend. It stores what the backend chain returned, not
//! what the manipulators made of it. Persisting processed output is the job
//! of a storage, typically a directory a web server serves from directly.
//!
//! ## Only "Not Found" Is Expected
//!
//! A missing image is the one structured failure a caller is expected to
//! handle. Processing failures propagate as errors. Storage failures never
//! fail a request; they come back as a warning next to the image.

pub mod backend;
pub mod cache;
pub mod config;
pub mod factory;
pub mod imaging;
pub mod manipulator;
pub mod optimizer;
pub mod output;
pub mod registry;
pub mod rule;
pub mod stack;
pub mod storage;
pub mod types;
