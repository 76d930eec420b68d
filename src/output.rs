//! CLI output formatting.
//!
//! # Check
//!
//! `check` prints an inventory of everything the configuration declares,
//! grouped by family. Each entry shows its name and driver, then indented
//! context lines for what it refers to and its key option:
//!
//! ```text
//! Stacks
//!     thumbs
//!         Backend: cached
//!         Manipulators: thumbnail → to_webp
//!         Storage: public
//!
//! Backends
//!     cached (cache)
//!         Uses: originals_for_thumbs, memory
//!     images (file)
//!         Root: images
//!
//! 2 stacks, 3 backends, 1 storage, 2 manipulators, 2 optimizers, 1 cache
//! ```
//!
//! References are shown by name. Inline tables show as `<inline DRIVER>` and
//! code-supplied constructors as `<constructor>`. `check --json` serializes
//! the same [`Inventory`] with `serde_json`.
//!
//! # Stack
//!
//! `stack` writes the image bytes to a file or stdout, so its report goes to
//! stderr:
//!
//! ```text
//! thumbs/t_100x100/cat.jpg: image/jpeg, 4812 bytes
//! Warning: not stored: IO error: permission denied
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that does the writing. Format
//! functions are pure.

use crate::config::{
    BackendOptions, CacheOptions, ManipulatorOptions, OptimizerOptions, StackConfig,
    StorageOptions,
};
use crate::registry::Source;
use crate::stack::StackedImage;
use crate::types::ImagePath;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a configuration declares, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub stacks: Vec<StackEntry>,
    pub backends: Vec<Entry>,
    pub storages: Vec<Entry>,
    pub manipulators: Vec<Entry>,
    pub optimizers: Vec<Entry>,
    pub caches: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackEntry {
    pub name: String,
    pub backend: String,
    pub manipulators: Vec<String>,
    pub storage: Option<String>,
}

/// A named pluggable.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub name: String,
    pub driver: &'static str,
    /// Other pluggables this entry is built from.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uses: Vec<String>,
    /// `(label, value)` pairs for the options worth showing.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<(String, String)>,
}

fn describe<O, T: ?Sized>(source: &Source<O, T>, driver: impl Fn(&O) -> &'static str) -> String {
    match source {
        Source::Named(name) => name.clone(),
        Source::Inline(options) => format!("<inline {}>", driver(options)),
        Source::Constructor(_) => "<constructor>".to_string(),
    }
}

fn entries<O>(
    map: &BTreeMap<String, O>,
    driver: impl Fn(&O) -> &'static str,
    uses: impl Fn(&O) -> Vec<String>,
    details: impl Fn(&O) -> Vec<(String, String)>,
) -> Vec<Entry> {
    map.iter()
        .map(|(name, options)| Entry {
            name: name.clone(),
            driver: driver(options),
            uses: uses(options),
            details: details(options),
        })
        .collect()
}

fn detail(label: &str, value: impl ToString) -> (String, String) {
    (label.to_string(), value.to_string())
}

fn backend_uses(options: &BackendOptions) -> Vec<String> {
    match options {
        BackendOptions::Cache { backend, cache } => vec![
            describe(backend, BackendOptions::driver),
            describe(cache, CacheOptions::driver),
        ],
        BackendOptions::Sequential { backends } => backends
            .iter()
            .map(|b| describe(b, BackendOptions::driver))
            .collect(),
        BackendOptions::PathRule { backend, .. } => vec![describe(backend, BackendOptions::driver)],
        BackendOptions::File { .. } | BackendOptions::Http { .. } | BackendOptions::Callback { .. } => {
            Vec::new()
        }
    }
}

fn backend_details(options: &BackendOptions) -> Vec<(String, String)> {
    match options {
        BackendOptions::File { root } => vec![detail("Root", root.display())],
        BackendOptions::Http { root_url, .. } => vec![detail("URL", root_url)],
        BackendOptions::PathRule { rules, .. } => vec![detail("Rules", rules.len())],
        BackendOptions::Callback { callback } => vec![detail("Callback", callback)],
        BackendOptions::Cache { .. } | BackendOptions::Sequential { .. } => Vec::new(),
    }
}

fn optimizer_names(optimizers: &[crate::config::OptimizerRef]) -> Vec<String> {
    optimizers
        .iter()
        .map(|o| describe(o, OptimizerOptions::driver))
        .collect()
}

fn storage_details(options: &StorageOptions) -> Vec<(String, String)> {
    let (StorageOptions::File { root, use_prefix } | StorageOptions::OptimizedFile { root, use_prefix, .. }) =
        options;
    let mut details = vec![detail("Root", root.display())];
    if *use_prefix {
        details.push(detail("Prefix", "per stack"));
    }
    details
}

fn manipulator_details(options: &ManipulatorOptions) -> Vec<(String, String)> {
    match options {
        ManipulatorOptions::Converter { conversions, .. } => conversions
            .iter()
            .map(|(from, to)| detail(from, to))
            .collect(),
        ManipulatorOptions::Thumbnailer { rules, .. } => rules
            .iter()
            .map(|rule| detail(rule.pattern(), rule.template()))
            .collect(),
        ManipulatorOptions::Watermark { watermark, .. } => {
            vec![detail("Overlay", watermark.display())]
        }
        ManipulatorOptions::Optimizer { .. } => Vec::new(),
    }
}

fn optimizer_details(options: &OptimizerOptions) -> Vec<(String, String)> {
    match options {
        OptimizerOptions::Jpegtran { binary, .. } | OptimizerOptions::Pngcrush { binary, .. } => binary
            .iter()
            .map(|b| detail("Binary", b.display()))
            .collect(),
        OptimizerOptions::Command { program, .. } => vec![detail("Program", program.display())],
    }
}

fn cache_details(options: &CacheOptions) -> Vec<(String, String)> {
    match options {
        CacheOptions::RawFile { root } => vec![detail("Root", root.display())],
        CacheOptions::Memory { capacity } => capacity
            .iter()
            .map(|c| detail("Capacity", c))
            .collect(),
    }
}

impl Inventory {
    pub fn from_config(config: &StackConfig) -> Self {
        let stacks = config
            .stacks
            .iter()
            .map(|(name, stack)| StackEntry {
                name: name.clone(),
                backend: describe(&stack.backend, BackendOptions::driver),
                manipulators: stack
                    .manipulators
                    .iter()
                    .map(|m| describe(m, ManipulatorOptions::driver))
                    .collect(),
                storage: stack
                    .storage
                    .as_ref()
                    .map(|s| describe(s, StorageOptions::driver)),
            })
            .collect();

        Self {
            stacks,
            backends: entries(
                &config.backends,
                BackendOptions::driver,
                backend_uses,
                backend_details,
            ),
            storages: entries(
                &config.storages,
                StorageOptions::driver,
                |options| match options {
                    StorageOptions::OptimizedFile { optimizers, .. } => optimizer_names(optimizers),
                    StorageOptions::File { .. } => Vec::new(),
                },
                storage_details,
            ),
            manipulators: entries(
                &config.manipulators,
                ManipulatorOptions::driver,
                |options| match options {
                    ManipulatorOptions::Optimizer { optimizers } => optimizer_names(optimizers),
                    _ => Vec::new(),
                },
                manipulator_details,
            ),
            optimizers: entries(
                &config.optimizers,
                OptimizerOptions::driver,
                |_| Vec::new(),
                optimizer_details,
            ),
            caches: entries(&config.caches, CacheOptions::driver, |_| Vec::new(), cache_details),
        }
    }
}

// ============================================================================
// Check
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {singular}")
    } else {
        format!("{count} {plural}")
    }
}

fn format_entries(title: &str, entries: &[Entry], lines: &mut Vec<String>) {
    if entries.is_empty() {
        return;
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(title.to_string());
    for entry in entries {
        lines.push(format!("{}{} ({})", indent(1), entry.name, entry.driver));
        if !entry.uses.is_empty() {
            lines.push(format!("{}Uses: {}", indent(2), entry.uses.join(", ")));
        }
        for (label, value) in &entry.details {
            lines.push(format!("{}{label}: {value}", indent(2)));
        }
    }
}

pub fn format_check_output(inventory: &Inventory) -> Vec<String> {
    let mut lines = Vec::new();

    if !inventory.stacks.is_empty() {
        lines.push("Stacks".to_string());
        for stack in &inventory.stacks {
            lines.push(format!("{}{}", indent(1), stack.name));
            lines.push(format!("{}Backend: {}", indent(2), stack.backend));
            if !stack.manipulators.is_empty() {
                lines.push(format!(
                    "{}Manipulators: {}",
                    indent(2),
                    stack.manipulators.join(" → ")
                ));
            }
            if let Some(storage) = &stack.storage {
                lines.push(format!("{}Storage: {storage}", indent(2)));
            }
        }
    }

    format_entries("Backends", &inventory.backends, &mut lines);
    format_entries("Storages", &inventory.storages, &mut lines);
    format_entries("Manipulators", &inventory.manipulators, &mut lines);
    format_entries("Optimizers", &inventory.optimizers, &mut lines);
    format_entries("Caches", &inventory.caches, &mut lines);

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(
        [
            plural(inventory.stacks.len(), "stack", "stacks"),
            plural(inventory.backends.len(), "backend", "backends"),
            plural(inventory.storages.len(), "storage", "storages"),
            plural(inventory.manipulators.len(), "manipulator", "manipulators"),
            plural(inventory.optimizers.len(), "optimizer", "optimizers"),
            plural(inventory.caches.len(), "cache", "caches"),
        ]
        .join(", "),
    );
    lines
}

pub fn print_check_output(inventory: &Inventory) {
    for line in format_check_output(inventory) {
        println!("{}", line);
    }
}

// ============================================================================
// Stack
// ============================================================================

pub fn format_stack_output(path: &ImagePath, result: &StackedImage) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {}, {} bytes",
        path,
        result.image.mime_type(),
        result.image.len()
    )];
    if let Some(warning) = &result.storage_warning {
        lines.push(format!("Warning: not stored: {warning}"));
    }
    lines
}

/// Report goes to stderr; stdout may be carrying the image.
pub fn print_stack_output(path: &ImagePath, result: &StackedImage) {
    for line in format_stack_output(path, result) {
        eprintln!("{}", line);
    }
}
