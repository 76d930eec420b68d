//! Named registries with memoized lazy construction.
//!
//! Every pluggable family (stacks, backends, storages, manipulators,
//! optimizers, caches) is configured as a table of `name → options`. A
//! [`Registry`] keeps those options and builds each instance the first time
//! its name is resolved; later resolutions return the same `Arc`.
//!
//! References between pluggables are [`Source`]s. A name goes through the
//! registry and is shared; an inline table or a constructor closure builds a
//! fresh, anonymous instance on every resolution.
//!
//! ## Concurrency
//!
//! Each entry holds a `once_cell::sync::OnceCell`. Concurrent first
//! resolutions of one name block on a single construction, so there is never
//! more than one live instance per name. A construction that fails leaves the
//! cell empty and the next resolution tries again.

use crate::config::ConfigError;
use once_cell::sync::OnceCell;
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name of the entry used when no name is given.
pub const DEFAULT_NAME: &str = "default";

/// Zero-argument constructor for an anonymous instance.
pub type Constructor<T> = Arc<dyn Fn() -> Result<Arc<T>, ConfigError> + Send + Sync>;

/// A reference to a pluggable instance.
///
/// In TOML a string is [`Source::Named`] and an inline table is
/// [`Source::Inline`]. [`Source::Constructor`] only exists in code.
pub enum Source<O, T: ?Sized> {
    Named(String),
    Inline(Box<O>),
    Constructor(Constructor<T>),
}

impl<O, T: ?Sized> Source<O, T> {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn inline(options: O) -> Self {
        Self::Inline(Box::new(options))
    }

    pub fn constructor<F>(f: F) -> Self
    where
        F: Fn() -> Result<Arc<T>, ConfigError> + Send + Sync + 'static,
    {
        Self::Constructor(Arc::new(f))
    }

    /// The registry name, if this is a named reference.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Resolve through `named` for names, `build` for inline options, or the
    /// constructor itself.
    pub fn resolve<N, B>(&self, named: N, build: B) -> Result<Arc<T>, ConfigError>
    where
        N: FnOnce(&str) -> Result<Arc<T>, ConfigError>,
        B: FnOnce(&O) -> Result<Arc<T>, ConfigError>,
    {
        match self {
            Self::Named(name) => named(name),
            Self::Inline(options) => build(options),
            Self::Constructor(constructor) => constructor(),
        }
    }
}

impl<O: Clone, T: ?Sized> Clone for Source<O, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Named(name) => Self::Named(name.clone()),
            Self::Inline(options) => Self::Inline(options.clone()),
            Self::Constructor(constructor) => Self::Constructor(Arc::clone(constructor)),
        }
    }
}

impl<O: fmt::Debug, T: ?Sized> fmt::Debug for Source<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Inline(options) => f.debug_tuple("Inline").field(options).finish(),
            Self::Constructor(_) => f.write_str("Constructor(..)"),
        }
    }
}

impl<'de, O: DeserializeOwned, T: ?Sized> Deserialize<'de> for Source<O, T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match toml::Value::deserialize(deserializer)? {
            toml::Value::String(name) => Ok(Self::Named(name)),
            value => value
                .try_into::<O>()
                .map(Self::inline)
                .map_err(D::Error::custom),
        }
    }
}

struct Entry<O, T: ?Sized> {
    options: O,
    instance: OnceCell<Arc<T>>,
}

/// Name → options table that builds and memoizes instances on demand.
pub struct Registry<O, T: ?Sized> {
    family: &'static str,
    entries: BTreeMap<String, Entry<O, T>>,
}

impl<O, T: ?Sized> Registry<O, T> {
    pub fn new(family: &'static str, options: BTreeMap<String, O>) -> Self {
        let entries = options
            .into_iter()
            .map(|(name, options)| {
                let entry = Entry {
                    options,
                    instance: OnceCell::new(),
                };
                (name, entry)
            })
            .collect();
        Self { family, entries }
    }

    /// Family name used in errors and logs (`"backend"`, `"stack"`, ...).
    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn options(&self, name: &str) -> Option<&O> {
        self.entries.get(name).map(|entry| &entry.options)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `name` has already been constructed.
    pub fn is_constructed(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.instance.get().is_some())
    }

    /// The name used when none is given: `default` if configured, otherwise
    /// the only entry.
    pub fn default_name(&self) -> Result<&str, ConfigError> {
        if self.entries.contains_key(DEFAULT_NAME) {
            return Ok(DEFAULT_NAME);
        }
        let mut names = self.entries.keys();
        match (names.next(), names.next()) {
            (Some(only), None) => Ok(only),
            _ => Err(ConfigError::NoDefault {
                family: self.family.to_string(),
            }),
        }
    }

    /// Return the instance for `name`, constructing it with `build` on first
    /// use.
    pub fn resolve_with<F>(&self, name: &str, build: F) -> Result<Arc<T>, ConfigError>
    where
        F: FnOnce(&O) -> Result<Arc<T>, ConfigError>,
    {
        let entry = self.entries.get(name).ok_or_else(|| ConfigError::UnknownName {
            family: self.family.to_string(),
            name: name.to_string(),
        })?;
        entry
            .instance
            .get_or_try_init(|| {
                debug!(family = self.family, name, "constructing");
                build(&entry.options)
            })
            .cloned()
    }
}

impl<O: fmt::Debug, T: ?Sized> fmt::Debug for Registry<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("family", &self.family)
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
