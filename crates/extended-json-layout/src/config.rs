// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::adapter::{AdapterRegistry, CompositeAdapter, JsonAdapter, StaticFieldsAdapter, DEFAULT_ADAPTER};
use crate::error::LayoutError;
use crate::layout::{ExtendedJsonLayout, ExtendedJsonLayoutBuilder};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the extended JSON layout
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Emit a well-formed JSON array (header, separators, footer)
    pub complete: bool,
    /// Single-line output
    pub compact: bool,
    /// Terminate compact events with an end-of-line
    pub event_eol: bool,
    /// Include the event source location
    pub location_info: bool,
    /// Include the context map
    pub properties: bool,
    /// Write the context map as a key/value list
    pub properties_as_list: bool,
    /// Include stack traces of thrown errors
    pub include_stacktrace: bool,
    /// Write stack traces as one string
    pub stacktrace_as_string: bool,
    /// Header text for complete output (defaults to `[`)
    pub header: Option<String>,
    /// Footer text for complete output (defaults to `]`)
    pub footer: Option<String>,
    /// Registered name of the mixed-field adapter
    pub json_adapter: String,
    /// Extra static fields as `key=value,key=value`
    pub extra_fields: Option<String>,
    /// Log level filter (e.g., trace, debug, info, warn, error)
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            complete: false,
            compact: false,
            event_eol: false,
            location_info: false,
            properties: false,
            properties_as_list: false,
            include_stacktrace: true,
            stacktrace_as_string: true,
            header: None,
            footer: None,
            json_adapter: DEFAULT_ADAPTER.to_string(),
            extra_fields: None,
            log_level: "info".to_string(),
        }
    }
}

fn deserialize_log_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(String::deserialize(deserializer)?.to_ascii_lowercase())
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|val| val.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

impl LayoutConfig {
    /// Create configuration from `EXTJSON_*` environment variables
    pub fn from_env() -> Result<Self, LayoutError> {
        let defaults = Self::default();
        let config = Self {
            complete: env_flag("EXTJSON_COMPLETE", defaults.complete),
            compact: env_flag("EXTJSON_COMPACT", defaults.compact),
            event_eol: env_flag("EXTJSON_EVENT_EOL", defaults.event_eol),
            location_info: env_flag("EXTJSON_LOCATION_INFO", defaults.location_info),
            properties: env_flag("EXTJSON_PROPERTIES", defaults.properties),
            properties_as_list: env_flag("EXTJSON_PROPERTIES_AS_LIST", defaults.properties_as_list),
            include_stacktrace: env_flag("EXTJSON_INCLUDE_STACKTRACE", defaults.include_stacktrace),
            stacktrace_as_string: env_flag(
                "EXTJSON_STACKTRACE_AS_STRING",
                defaults.stacktrace_as_string,
            ),
            header: env::var("EXTJSON_HEADER").ok(),
            footer: env::var("EXTJSON_FOOTER").ok(),
            json_adapter: env::var("EXTJSON_ADAPTER").unwrap_or(defaults.json_adapter),
            extra_fields: env::var("EXTJSON_EXTRA_FIELDS")
                .ok()
                .filter(|val| !val.trim().is_empty()),
            log_level: env::var("EXTJSON_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.json_adapter.trim().is_empty() {
            return Err(LayoutError::InvalidConfig(
                "JSON adapter name cannot be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(LayoutError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Builder with every layout attribute copied from this configuration.
    /// The adapter is still resolved by name at build time.
    #[must_use]
    pub fn to_builder(&self) -> ExtendedJsonLayoutBuilder {
        let mut builder = ExtendedJsonLayout::builder()
            .complete(self.complete)
            .compact(self.compact)
            .event_eol(self.event_eol)
            .location_info(self.location_info)
            .properties(self.properties)
            .properties_as_list(self.properties_as_list)
            .include_stacktrace(self.include_stacktrace)
            .stacktrace_as_string(self.stacktrace_as_string)
            .json_adapter(self.json_adapter.clone());
        if let Some(header) = &self.header {
            builder = builder.header(header.clone());
        }
        if let Some(footer) = &self.footer {
            builder = builder.footer(footer.clone());
        }
        builder
    }

    /// Validates, resolves the adapter against `registry`, merges any
    /// `extra_fields` on top of it and builds the layout.
    pub fn build_layout(&self, registry: &AdapterRegistry) -> Result<ExtendedJsonLayout, LayoutError> {
        self.validate()?;
        let named = registry.create(&self.json_adapter)?;
        let adapter: Arc<dyn JsonAdapter> = match &self.extra_fields {
            Some(extra) => {
                let extra: Box<dyn JsonAdapter> = Box::new(StaticFieldsAdapter::parse(extra));
                Arc::new(CompositeAdapter::new([named, extra]))
            }
            None => Arc::from(named),
        };
        self.to_builder().adapter(adapter).build_with_registry(registry)
    }
}
