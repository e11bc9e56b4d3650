// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Providers of mixed fields.
//!
//! A [`JsonAdapter`] owns the extra key/value pairs that the layout appends
//! to every record. Adapters compute their fields once, when constructed;
//! the layout only borrows them per event.
//!
//! Adapters are selected by name through an [`AdapterRegistry`]. The
//! built-in names are:
//!
//! | Name       | Adapter                 | Fields            |
//! |------------|-------------------------|-------------------|
//! | `hostname` | [`HostnameAdapter`]     | `hostname`        |
//! | `none`     | [`StaticFieldsAdapter`] | none              |

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::LayoutError;
use crate::hostname::lookup_hostname;

/// Name of the adapter used when none is configured.
pub const DEFAULT_ADAPTER: &str = "hostname";

/// Key under which [`HostnameAdapter`] stores the host name.
pub const HOSTNAME_FIELD: &str = "hostname";

/// Source of the mixed fields appended to every serialized event.
pub trait JsonAdapter: fmt::Debug + Send + Sync {
    fn mixed_fields(&self) -> &Map<String, Value>;
}

/// Adds the local host name under `hostname`.
#[derive(Debug, Clone)]
pub struct HostnameAdapter {
    mixed_fields: Map<String, Value>,
}

impl HostnameAdapter {
    /// Looks up the host name now. A failed lookup leaves the field out.
    #[must_use]
    pub fn new() -> Self {
        Self::from_lookup(lookup_hostname())
    }

    #[must_use]
    pub fn from_lookup(lookup: Result<String, LayoutError>) -> Self {
        let mut mixed_fields = Map::new();
        match lookup {
            Ok(hostname) => {
                mixed_fields.insert(HOSTNAME_FIELD.to_string(), Value::String(hostname));
            }
            Err(e) => warn!("Could not get hostname: {e}"),
        }
        Self { mixed_fields }
    }
}

impl Default for HostnameAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonAdapter for HostnameAdapter {
    fn mixed_fields(&self) -> &Map<String, Value> {
        &self.mixed_fields
    }
}

/// Fixed, user-supplied fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticFieldsAdapter {
    mixed_fields: Map<String, Value>,
}

impl StaticFieldsAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.mixed_fields.insert(key.into(), value.into());
        self
    }

    /// Parses `key=value` pairs separated by commas, e.g. `env=prod,team=core`.
    ///
    /// Values are kept as strings. Entries without `=` or with an empty key
    /// are skipped with a warning.
    #[must_use]
    pub fn parse(pairs: &str) -> Self {
        let mut adapter = Self::new();
        for entry in pairs.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    adapter
                        .mixed_fields
                        .insert(key.trim().to_string(), Value::String(value.trim().to_string()));
                }
                _ => warn!("Ignoring malformed extra field '{entry}', expected key=value"),
            }
        }
        adapter
    }
}

impl JsonAdapter for StaticFieldsAdapter {
    fn mixed_fields(&self) -> &Map<String, Value> {
        &self.mixed_fields
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for StaticFieldsAdapter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            mixed_fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// Fields of several adapters merged in order; later adapters win on
/// duplicate keys.
#[derive(Debug, Clone, Default)]
pub struct CompositeAdapter {
    mixed_fields: Map<String, Value>,
}

impl CompositeAdapter {
    pub fn new<I, A>(adapters: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<dyn JsonAdapter>,
    {
        let mut mixed_fields = Map::new();
        for adapter in adapters {
            for (key, value) in adapter.as_ref().mixed_fields() {
                mixed_fields.insert(key.clone(), value.clone());
            }
        }
        Self { mixed_fields }
    }
}

impl JsonAdapter for CompositeAdapter {
    fn mixed_fields(&self) -> &Map<String, Value> {
        &self.mixed_fields
    }
}

type AdapterFactory = Box<dyn Fn() -> Box<dyn JsonAdapter> + Send + Sync>;

/// Named adapter constructors.
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    /// A registry without any adapters, not even the built-in ones.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn JsonAdapter> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            debug!("Replaced JSON adapter '{name}'");
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn JsonAdapter>, LayoutError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LayoutError::UnknownAdapter(name.to_string()))?;
        Ok(factory())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_ADAPTER, || Box::new(HostnameAdapter::new()));
        registry.register("none", || Box::new(StaticFieldsAdapter::new()));
        registry
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("AdapterRegistry").field("adapters", &names).finish()
    }
}
