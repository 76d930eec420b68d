//! Stack configuration module.
//!
//! Handles loading, normalizing and validating the TOML file that declares
//! every stack and the pluggables it is built from.
//!
//! ## Layout
//!
//! Each pluggable family is a table of named entries. Every entry selects its
//! implementation with a `driver` key; the remaining keys are driver options.
//!
//! ```toml
//! [stacks.thumbs]
//! backend = "originals"                 # a name from [backends]
//! manipulators = ["thumbnail", "crush"] # applied in this order
//! storage = "public"                    # optional write-back
//!
//! [backends.originals]
//! driver = "file"
//! root = "/srv/images"
//!
//! [manipulators.thumbnail]
//! driver = "thumbnailer"
//! rules = [['^t_(\d+)x(\d+)/', '{1}x{2}']]
//!
//! [manipulators.crush]
//! driver = "optimizer"
//! optimizers = ["jpegtran"]
//!
//! [optimizers]
//! jpegtran = "jpegtran"                 # bare string = driver with no options
//!
//! [storages.public]
//! driver = "file"
//! root = "/srv/public"
//! ```
//!
//! Wherever one pluggable refers to another, the reference is either a name
//! or an inline table with its own `driver`. Inline tables build a private,
//! unshared instance.
//!
//! ## Single-entry shorthand
//!
//! A family with exactly one entry can be written as a flat singular block.
//! `[backend]` with no `[backends]` table is read as `[backends.default]`,
//! and likewise for `stack`, `storage`, `manipulator`, `optimizer` and
//! `cache`. This rewrite happens once, in [`normalize`], before anything is
//! deserialized.
//!
//! Unknown top-level keys and unknown stack keys are rejected to catch typos
//! early. Unknown drivers fail at load time.

use crate::backend::ImageBackend;
use crate::cache::CacheStore;
use crate::manipulator::ImageManipulator;
use crate::optimizer::ImageOptimizer;
use crate::registry::{DEFAULT_NAME, Source};
use crate::rule::{PatternRule, RuleSet};
use crate::storage::StorageBackend;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Unknown {family} '{name}'")]
    UnknownName { family: String, name: String },
    #[error("No default {family}: name one 'default' or configure exactly one")]
    NoDefault { family: String },
    #[error("Invalid rule pattern '{pattern}': {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Unknown {kind} flag '{value}'")]
    InvalidFlag { kind: String, value: String },
    #[error("No callback registered as '{0}'")]
    UnknownCallback(String),
}

pub type BackendRef = Source<BackendOptions, dyn ImageBackend>;
pub type CacheRef = Source<CacheOptions, dyn CacheStore>;
pub type StorageRef = Source<StorageOptions, dyn StorageBackend>;
pub type ManipulatorRef = Source<ManipulatorOptions, dyn ImageManipulator>;
pub type OptimizerRef = Source<OptimizerOptions, dyn ImageOptimizer>;

/// The whole configuration file, after normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    pub stacks: BTreeMap<String, StackOptions>,
    pub backends: BTreeMap<String, BackendOptions>,
    pub storages: BTreeMap<String, StorageOptions>,
    pub manipulators: BTreeMap<String, ManipulatorOptions>,
    pub optimizers: BTreeMap<String, OptimizerOptions>,
    pub caches: BTreeMap<String, CacheOptions>,
}

/// One stack: a backend, an ordered manipulator pipeline and optional
/// write-back storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackOptions {
    pub backend: BackendRef,
    #[serde(default)]
    pub manipulators: Vec<ManipulatorRef>,
    #[serde(default)]
    pub storage: Option<StorageRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum BackendOptions {
    /// Files under `root`.
    File { root: PathBuf },
    /// `GET root_url/path`.
    Http {
        root_url: String,
        timeout_secs: Option<u64>,
        user_agent: Option<String>,
    },
    /// Read-through `cache` in front of `backend`.
    Cache { backend: BackendRef, cache: CacheRef },
    /// First of `backends` that has the image.
    Sequential { backends: Vec<BackendRef> },
    /// Rewrite the path with `rules`, then ask `backend`.
    PathRule {
        backend: BackendRef,
        rules: Vec<RuleOptions>,
    },
    /// A closure registered on the factory under `callback`.
    Callback { callback: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum StorageOptions {
    File {
        root: PathBuf,
        #[serde(default)]
        use_prefix: bool,
    },
    OptimizedFile {
        root: PathBuf,
        #[serde(default)]
        use_prefix: bool,
        optimizers: Vec<OptimizerRef>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum ManipulatorOptions {
    /// Source type (MIME, extension or `*`) → target format.
    Converter {
        conversions: BTreeMap<String, String>,
        quality: Option<u32>,
    },
    Thumbnailer {
        rules: Vec<RuleOptions>,
        quality: Option<u32>,
        #[serde(default = "default_sharpen")]
        sharpen: bool,
        max_dimension: Option<u32>,
    },
    Watermark {
        /// Overlay image file.
        watermark: PathBuf,
        anchor: Option<FlagSpec>,
        repeat: Option<FlagSpec>,
        reduce: Option<FlagSpec>,
        quality: Option<u32>,
    },
    Optimizer { optimizers: Vec<OptimizerRef> },
}

fn default_sharpen() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum OptimizerOptions {
    Jpegtran {
        binary: Option<PathBuf>,
        #[serde(default)]
        progressive: bool,
    },
    Pngcrush {
        binary: Option<PathBuf>,
        #[serde(default)]
        brute: bool,
    },
    /// Any program; `args` use `{input}` and `{output}` placeholders.
    Command {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        mime_types: Vec<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum CacheOptions {
    RawFile { root: PathBuf },
    Memory { capacity: Option<usize> },
}

/// A `pattern → template` rule: `['^a/(.+)$', 'b/$1']` or
/// `{ pattern = '...', output = '...' }` (`format` is accepted for `output`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RuleOptions {
    Pair(String, String),
    Table {
        pattern: String,
        #[serde(alias = "format")]
        output: String,
    },
}

impl RuleOptions {
    pub fn pattern(&self) -> &str {
        match self {
            Self::Pair(pattern, _) | Self::Table { pattern, .. } => pattern,
        }
    }

    pub fn template(&self) -> &str {
        match self {
            Self::Pair(_, template) | Self::Table { output: template, .. } => template,
        }
    }

    pub fn compile(&self) -> Result<PatternRule, ConfigError> {
        PatternRule::new(self.pattern(), self.template()).map_err(|source| {
            ConfigError::InvalidRule {
                pattern: self.pattern().to_string(),
                source,
            }
        })
    }
}

/// Compile a rule list, keeping declaration order.
pub fn compile_rules(rules: &[RuleOptions]) -> Result<RuleSet, ConfigError> {
    rules.iter().map(RuleOptions::compile).collect()
}

/// A flag setting: a pre-combined bitmask or a list of symbolic names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FlagSpec {
    Bits(u32),
    Names(String),
}

impl BackendOptions {
    pub fn driver(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Http { .. } => "http",
            Self::Cache { .. } => "cache",
            Self::Sequential { .. } => "sequential",
            Self::PathRule { .. } => "path_rule",
            Self::Callback { .. } => "callback",
        }
    }
}

impl StorageOptions {
    pub fn driver(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::OptimizedFile { .. } => "optimized_file",
        }
    }
}

impl ManipulatorOptions {
    pub fn driver(&self) -> &'static str {
        match self {
            Self::Converter { .. } => "converter",
            Self::Thumbnailer { .. } => "thumbnailer",
            Self::Watermark { .. } => "watermark",
            Self::Optimizer { .. } => "optimizer",
        }
    }
}

impl OptimizerOptions {
    pub fn driver(&self) -> &'static str {
        match self {
            Self::Jpegtran { .. } => "jpegtran",
            Self::Pngcrush { .. } => "pngcrush",
            Self::Command { .. } => "command",
        }
    }
}

impl CacheOptions {
    pub fn driver(&self) -> &'static str {
        match self {
            Self::RawFile { .. } => "raw_file",
            Self::Memory { .. } => "memory",
        }
    }
}

// =============================================================================
// Config loading, normalization, and validation
// =============================================================================

/// `(plural table, singular shorthand, bare-string driver allowed)`
const FAMILIES: &[(&str, &str, bool)] = &[
    ("stacks", "stack", false),
    ("backends", "backend", false),
    ("storages", "storage", true),
    ("manipulators", "manipulator", true),
    ("optimizers", "optimizer", true),
    ("caches", "cache", true),
];

/// Rewrite shorthands into the canonical layout.
///
/// - A singular block (`[backend]`) with no plural table becomes
///   `[backends.default]`. When both exist the singular block is ignored.
/// - In families that allow it, a bare string entry `name = "driver"` becomes
///   `name = { driver = "driver" }`.
pub fn normalize(value: toml::Value) -> Result<toml::Value, ConfigError> {
    let toml::Value::Table(mut root) = value else {
        return Err(ConfigError::Validation("config must be a table".into()));
    };

    for &(plural, singular, bare_driver) in FAMILIES {
        if let Some(single) = root.remove(singular) {
            if root.contains_key(plural) {
                warn!(
                    "both [{singular}] and [{plural}] are configured; ignoring [{singular}]"
                );
            } else {
                let mut table = toml::map::Map::new();
                table.insert(DEFAULT_NAME.to_string(), single);
                root.insert(plural.to_string(), toml::Value::Table(table));
            }
        }

        if bare_driver && let Some(toml::Value::Table(entries)) = root.get_mut(plural) {
            for entry in entries.iter_mut().map(|(_, v)| v) {
                if let toml::Value::String(driver) = entry {
                    let mut table = toml::map::Map::new();
                    table.insert("driver".to_string(), toml::Value::String(driver.clone()));
                    *entry = toml::Value::Table(table);
                }
            }
        }
    }

    Ok(toml::Value::Table(root))
}

/// Parse, normalize, deserialize and validate a configuration document.
pub fn parse_config(content: &str) -> Result<StackConfig, ConfigError> {
    let raw: toml::Value = toml::from_str(content)?;
    let config: StackConfig = normalize(raw)?.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<StackConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

fn require<V>(map: &BTreeMap<String, V>, family: &str, name: &str) -> Result<(), ConfigError> {
    if map.contains_key(name) {
        Ok(())
    } else {
        Err(ConfigError::UnknownName {
            family: family.to_string(),
            name: name.to_string(),
        })
    }
}

impl StackConfig {
    /// Check every cross-reference and rule, and reject backend cycles.
    ///
    /// Checks that need I/O (watermark files, callbacks, encoder support)
    /// happen when the instance is built; see
    /// [`StackFactory::warm_up`](crate::factory::StackFactory::warm_up).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for stack in self.stacks.values() {
            self.check_backend_ref(&stack.backend)?;
            for manipulator in &stack.manipulators {
                self.check_manipulator_ref(manipulator)?;
            }
            if let Some(storage) = &stack.storage {
                self.check_storage_ref(storage)?;
            }
        }
        for backend in self.backends.values() {
            self.check_backend(backend)?;
        }
        for storage in self.storages.values() {
            self.check_storage(storage)?;
        }
        for manipulator in self.manipulators.values() {
            self.check_manipulator(manipulator)?;
        }
        self.check_backend_cycles()
    }

    fn check_backend_ref(&self, source: &BackendRef) -> Result<(), ConfigError> {
        match source {
            Source::Named(name) => require(&self.backends, "backend", name),
            Source::Inline(options) => self.check_backend(options),
            Source::Constructor(_) => Ok(()),
        }
    }

    fn check_backend(&self, options: &BackendOptions) -> Result<(), ConfigError> {
        match options {
            BackendOptions::Cache { backend, cache } => {
                self.check_backend_ref(backend)?;
                if let Source::Named(name) = cache {
                    require(&self.caches, "cache", name)?;
                }
                Ok(())
            }
            BackendOptions::Sequential { backends } => backends
                .iter()
                .try_for_each(|backend| self.check_backend_ref(backend)),
            BackendOptions::PathRule { backend, rules } => {
                self.check_backend_ref(backend)?;
                compile_rules(rules).map(|_| ())
            }
            BackendOptions::Http { root_url, .. } if root_url.trim().is_empty() => Err(
                ConfigError::Validation("http backend root_url must not be empty".into()),
            ),
            BackendOptions::File { .. }
            | BackendOptions::Http { .. }
            | BackendOptions::Callback { .. } => Ok(()),
        }
    }

    fn check_storage_ref(&self, source: &StorageRef) -> Result<(), ConfigError> {
        match source {
            Source::Named(name) => require(&self.storages, "storage", name),
            Source::Inline(options) => self.check_storage(options),
            Source::Constructor(_) => Ok(()),
        }
    }

    fn check_storage(&self, options: &StorageOptions) -> Result<(), ConfigError> {
        match options {
            StorageOptions::OptimizedFile { optimizers, .. } => self.check_optimizer_refs(optimizers),
            StorageOptions::File { .. } => Ok(()),
        }
    }

    fn check_manipulator_ref(&self, source: &ManipulatorRef) -> Result<(), ConfigError> {
        match source {
            Source::Named(name) => require(&self.manipulators, "manipulator", name),
            Source::Inline(options) => self.check_manipulator(options),
            Source::Constructor(_) => Ok(()),
        }
    }

    fn check_manipulator(&self, options: &ManipulatorOptions) -> Result<(), ConfigError> {
        match options {
            ManipulatorOptions::Thumbnailer { rules, .. } => compile_rules(rules).map(|_| ()),
            ManipulatorOptions::Optimizer { optimizers } => self.check_optimizer_refs(optimizers),
            ManipulatorOptions::Converter { .. } | ManipulatorOptions::Watermark { .. } => Ok(()),
        }
    }

    fn check_optimizer_refs(&self, optimizers: &[OptimizerRef]) -> Result<(), ConfigError> {
        optimizers
            .iter()
            .filter_map(Source::name)
            .try_for_each(|name| require(&self.optimizers, "optimizer", name))
    }

    /// Reject named backends that (directly or through inline tables)
    /// refer back to themselves.
    fn check_backend_cycles(&self) -> Result<(), ConfigError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            config: &'a StackConfig,
            name: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<(), ConfigError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    path.push(name);
                    return Err(ConfigError::Validation(format!(
                        "backend cycle: {}",
                        path.join(" -> ")
                    )));
                }
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            path.push(name);
            if let Some(options) = config.backends.get(name) {
                let mut deps = Vec::new();
                named_backend_deps(options, &mut deps);
                for dep in deps {
                    visit(config, dep, marks, path)?;
                }
            }
            path.pop();
            marks.insert(name, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for name in self.backends.keys() {
            visit(self, name, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }
}

/// Names of backends `options` refers to, looking through inline tables.
fn named_backend_deps<'a>(options: &'a BackendOptions, out: &mut Vec<&'a str>) {
    let push = |source: &'a BackendRef, out: &mut Vec<&'a str>| match source {
        Source::Named(name) => out.push(name),
        Source::Inline(inner) => named_backend_deps(inner, out),
        Source::Constructor(_) => {}
    };
    match options {
        BackendOptions::Cache { backend, .. } | BackendOptions::PathRule { backend, .. } => {
            push(backend, out)
        }
        BackendOptions::Sequential { backends } => {
            for backend in backends {
                push(backend, out);
            }
        }
        BackendOptions::File { .. } | BackendOptions::Http { .. } | BackendOptions::Callback { .. } => {}
    }
}

/// Returns a fully-commented stock configuration.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image Stack Configuration
# =========================
# Each family below is a table of named entries. Every entry picks its
# implementation with `driver`; the other keys are options for that driver.
# Wherever one entry refers to another you can use its name, or an inline
# table with its own `driver` for a private, unshared instance.
#
# A family with a single entry may be written as a flat singular block:
# [backend] instead of [backends.default].
# Unknown top-level keys and unknown drivers cause an error.

# ---------------------------------------------------------------------------
# Stacks: what callers ask for, as <stack>/<path>
# ---------------------------------------------------------------------------
[stacks.originals]
backend = "images"

[stacks.thumbs]
backend = "cached"
# Applied in this order, each on the previous output.
manipulators = ["thumbnail", "to_webp"]
# Optional write-back. Failures are reported, never fatal.
storage = "public"

# ---------------------------------------------------------------------------
# Backends: where source images come from
# ---------------------------------------------------------------------------
[backends.images]
driver = "file"
root = "images"

# [backends.origin]
# driver = "http"
# root_url = "https://origin.example.com/images"
# timeout_secs = 30
# user_agent = "image-stack"

# Tries each backend in order; the first hit wins.
# [backends.any]
# driver = "sequential"
# backends = ["images", "origin"]

# Strip the thumbnail prefix before looking up the original.
[backends.originals_for_thumbs]
driver = "path_rule"
backend = "images"
rules = [
    ['^t_\d+x\d+/(.+)$', '$1'],
    ['^w_\d+/(.+)$', '$1'],
]

# Read-through cache. Only successful fetches are cached.
[backends.cached]
driver = "cache"
backend = "originals_for_thumbs"
cache = "memory"

# A closure registered in code with StackFactory::with_callback.
# [backends.custom]
# driver = "callback"
# callback = "my_resolver"

# ---------------------------------------------------------------------------
# Manipulators: the transform pipeline
# ---------------------------------------------------------------------------
# Formats: WxH crops to exactly WxH; <WxH, <Wx, <xH shrink to fit.
# The first rule matching the requested path wins; no match = unchanged.
[manipulators.thumbnail]
driver = "thumbnailer"
rules = [
    ['^t_(\d+)x(\d+)/', '{1}x{2}'],
    { pattern = '^w_(\d+)/', format = '<{1}x' },
]
quality = 90
sharpen = true
max_dimension = 4096

# Keys: source MIME type, extension, or "*". Values: target format.
[manipulators.to_webp]
driver = "converter"
conversions = { "image/jpeg" = "webp", "png" = "webp" }
quality = 90

# anchor: TOP BOTTOM MIDDLE LEFT RIGHT CENTER (or a number)
# repeat / reduce: NONE X Y ALL
# [manipulators.logo]
# driver = "watermark"
# watermark = "logo.png"
# anchor = "bottom right"
# repeat = "none"
# reduce = "all"

# [manipulators.crush]
# driver = "optimizer"
# optimizers = ["jpegtran", "pngcrush"]

# ---------------------------------------------------------------------------
# Optimizers: external lossless compressors
# ---------------------------------------------------------------------------
[optimizers]
jpegtran = "jpegtran"
pngcrush = { driver = "pngcrush", brute = false }
# svgo = { driver = "command", program = "svgo", args = ["{input}", "-o", "{output}"], mime_types = ["image/svg+xml"] }

# ---------------------------------------------------------------------------
# Storages: write-back of processed images
# ---------------------------------------------------------------------------
[storages.public]
driver = "file"
root = "public"
# Store under public/<stack>/ instead of public/
use_prefix = true

# [storages.public_optimized]
# driver = "optimized_file"
# root = "public"
# optimizers = ["jpegtran", "pngcrush"]

# ---------------------------------------------------------------------------
# Caches: byte stores for cache backends
# ---------------------------------------------------------------------------
[caches.memory]
driver = "memory"
capacity = 256

# [caches.disk]
# driver = "raw_file"
# root = ".image-cache"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(toml: &str) -> Result<StackConfig, ConfigError> {
        parse_config(toml)
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn stock_config_parses_and_validates() {
        let config = parse(stock_config_toml()).unwrap();
        assert_eq!(config.stacks.len(), 2);
        assert!(matches!(
            config.backends["cached"],
            BackendOptions::Cache { .. }
        ));
        assert_eq!(config.optimizers["jpegtran"].driver(), "jpegtran");
    }

    #[test]
    fn empty_config_is_valid() {
        let config = parse("").unwrap();
        assert!(config.stacks.is_empty());
    }

    #[test]
    fn parses_full_stack() {
        let config = parse(
            r#"
[stacks.s]
backend = "files"
manipulators = ["thumbs", { driver = "optimizer", optimizers = ["jt"] }]
storage = { driver = "file", root = "/out", use_prefix = true }

[backends.files]
driver = "file"
root = "/img"

[manipulators.thumbs]
driver = "thumbnailer"
rules = [['^t_(\d+)x(\d+)/', '{1}x{2}']]

[optimizers.jt]
driver = "jpegtran"
progressive = true
"#,
        )
        .unwrap();

        let stack = &config.stacks["s"];
        assert_eq!(stack.backend.name(), Some("files"));
        assert_eq!(stack.manipulators.len(), 2);
        assert!(matches!(stack.manipulators[1], Source::Inline(_)));
        assert!(matches!(
            stack.storage,
            Some(Source::Inline(ref s)) if matches!(**s, StorageOptions::File { use_prefix: true, .. })
        ));
        assert!(matches!(
            config.optimizers["jt"],
            OptimizerOptions::Jpegtran { progressive: true, binary: None }
        ));
    }

    #[test]
    fn rule_forms_are_equivalent() {
        let config = parse(
            r#"
[manipulators.a]
driver = "thumbnailer"
rules = [
    ['^a/', '10x10'],
    { pattern = '^b/', output = '20x20' },
    { pattern = '^c/', format = '<30x' },
]
"#,
        )
        .unwrap();
        let ManipulatorOptions::Thumbnailer { rules, sharpen, .. } = &config.manipulators["a"] else {
            panic!("expected thumbnailer");
        };
        assert!(*sharpen);
        let templates: Vec<_> = rules.iter().map(RuleOptions::template).collect();
        assert_eq!(templates, vec!["10x10", "20x20", "<30x"]);
        assert_eq!(rules[2].pattern(), "^c/");
    }

    #[test]
    fn flag_specs_accept_numbers_and_names() {
        let config = parse(
            r#"
[manipulators.w]
driver = "watermark"
watermark = "logo.png"
anchor = 17
repeat = "x y"
"#,
        )
        .unwrap();
        let ManipulatorOptions::Watermark {
            anchor, repeat, reduce, ..
        } = &config.manipulators["w"]
        else {
            panic!("expected watermark");
        };
        assert_eq!(anchor, &Some(FlagSpec::Bits(17)));
        assert_eq!(repeat, &Some(FlagSpec::Names("x y".into())));
        assert_eq!(reduce, &None);
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let result = parse(
            r#"
[backends.x]
driver = "ftp"
root = "/"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        assert!(matches!(parse("colour = 1"), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_stack_key_is_rejected() {
        let result = parse(
            r#"
[stacks.s]
backend = { driver = "file", root = "/" }
manipulatorz = []
"#,
        );
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Normalization
    // =========================================================================

    #[test]
    fn singular_block_becomes_default_entry() {
        let config = parse(
            r#"
[stack]
backend = "default"

[backend]
driver = "file"
root = "/img"
"#,
        )
        .unwrap();
        assert!(config.stacks.contains_key("default"));
        assert!(matches!(
            config.backends["default"],
            BackendOptions::File { .. }
        ));
    }

    #[test]
    fn plural_table_wins_over_singular_block() {
        let config = parse(
            r#"
[backend]
driver = "file"
root = "/ignored"

[backends.main]
driver = "file"
root = "/img"
"#,
        )
        .unwrap();
        assert_eq!(config.backends.len(), 1);
        assert!(config.backends.contains_key("main"));
    }

    #[test]
    fn bare_string_is_driver_shorthand() {
        let config = parse(
            r#"
[optimizers]
jt = "jpegtran"

[caches]
mem = "memory"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.optimizers["jt"],
            OptimizerOptions::Jpegtran { progressive: false, .. }
        ));
        assert!(matches!(
            config.caches["mem"],
            CacheOptions::Memory { capacity: None }
        ));
    }

    #[test]
    fn bare_string_backend_is_not_shorthand() {
        // Backends always need options, so a string is just invalid
        assert!(parse("[backends]\nx = \"file\"").is_err());
    }

    #[test]
    fn normalize_rejects_non_table() {
        assert!(normalize(toml::Value::Integer(1)).is_err());
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn unknown_backend_reference_is_rejected() {
        let result = parse(
            r#"
[stacks.s]
backend = "missing"
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnknownName { ref family, ref name }) if family == "backend" && name == "missing"
        ));
    }

    #[test]
    fn unknown_references_inside_inline_tables_are_rejected() {
        let result = parse(
            r#"
[stacks.s]
backend = { driver = "sequential", backends = ["nope"] }
"#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownName { .. })));

        let result = parse(
            r#"
[storages.s]
driver = "optimized_file"
root = "/out"
optimizers = ["ghost"]
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnknownName { ref family, .. }) if family == "optimizer"
        ));
    }

    #[test]
    fn unknown_cache_reference_is_rejected() {
        let result = parse(
            r#"
[backends.c]
driver = "cache"
backend = { driver = "file", root = "/" }
cache = "nowhere"
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnknownName { ref family, .. }) if family == "cache"
        ));
    }

    #[test]
    fn invalid_rule_pattern_is_rejected() {
        let result = parse(
            r#"
[manipulators.t]
driver = "thumbnailer"
rules = [['(unclosed', '1x1']]
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRule { ref pattern, .. }) if pattern == "(unclosed"
        ));
    }

    #[test]
    fn backend_cycles_are_rejected() {
        let result = parse(
            r#"
[backends.a]
driver = "path_rule"
backend = "b"
rules = []

[backends.b]
driver = "sequential"
backends = [{ driver = "cache", backend = "a", cache = { driver = "memory" } }]
"#,
        );
        let Err(ConfigError::Validation(msg)) = result else {
            panic!("expected a cycle error");
        };
        assert!(msg.contains("a -> b -> a"), "{msg}");
    }

    #[test]
    fn shared_backends_are_not_cycles() {
        parse(
            r#"
[backends.files]
driver = "file"
root = "/img"

[backends.both]
driver = "sequential"
backends = ["files", "files"]
"#,
        )
        .unwrap();
    }

    #[test]
    fn empty_http_root_is_rejected() {
        let result = parse(
            r#"
[backends.h]
driver = "http"
root_url = " "
"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // load_config
    // =========================================================================

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stacks.toml");
        fs::write(
            &path,
            r#"
[backend]
driver = "file"
root = "/img"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.backends.contains_key("default"));
    }

    #[test]
    fn load_config_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(&tmp.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stacks.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }
}
