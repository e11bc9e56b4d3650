// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON layout that appends mixed fields to every event.
//!
//! # Complete vs. fragment output
//!
//! With `complete(true)` the layout produces a well-formed JSON array: the
//! caller writes [`ExtendedJsonLayout::header`] first and
//! [`ExtendedJsonLayout::footer`] last, and events after the first are
//! preceded by `", "`. By default the output is a stream of objects with no
//! brackets or separators, meant to be embedded elsewhere.
//!
//! # Pretty vs. compact
//!
//! By default events are pretty-printed with two-space indentation and end
//! with `\r\n`. With `compact(true)` events are written on one line and no
//! end-of-line is written unless `event_eol(true)` is also set.
//!
//! # Example
//!
//! ```text
//! {
//!   "timeMillis": 1,
//!   "thread": "main",
//!   "threadId": 1,
//!   "level": "INFO",
//!   "loggerName": "app::db",
//!   "message": "connected",
//!   "endOfBatch": false,
//!   "hostname": "web-1"
//! }
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use serde::ser::Error as _;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::debug;

use crate::adapter::{AdapterRegistry, JsonAdapter, DEFAULT_ADAPTER};
use crate::error::LayoutError;
use crate::event::{EventView, LogEvent, SerializeOptions};
use crate::wrapper::ExtendedJsonWrapper;

pub const DEFAULT_HEADER: &str = "[";
pub const DEFAULT_FOOTER: &str = "]";
pub const CONTENT_TYPE: &str = "application/json";

const DEFAULT_EOL: &str = "\r\n";
const COMPACT_EOL: &str = "";
const EVENT_SEPARATOR: &[u8] = b", ";
const PRETTY_INDENT: &[u8] = b"  ";

/// Builder for [`ExtendedJsonLayout`].
#[derive(Debug)]
pub struct ExtendedJsonLayoutBuilder {
    location_info: bool,
    properties: bool,
    properties_as_list: bool,
    complete: bool,
    compact: bool,
    event_eol: bool,
    include_stacktrace: bool,
    stacktrace_as_string: bool,
    header: Option<String>,
    footer: Option<String>,
    json_adapter: String,
    adapter: Option<Arc<dyn JsonAdapter>>,
}

impl Default for ExtendedJsonLayoutBuilder {
    fn default() -> Self {
        Self {
            location_info: false,
            properties: false,
            properties_as_list: false,
            complete: false,
            compact: false,
            event_eol: false,
            include_stacktrace: true,
            stacktrace_as_string: true,
            header: None,
            footer: None,
            json_adapter: DEFAULT_ADAPTER.to_string(),
            adapter: None,
        }
    }
}

impl ExtendedJsonLayoutBuilder {
    #[must_use]
    pub fn location_info(mut self, location_info: bool) -> Self {
        self.location_info = location_info;
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: bool) -> Self {
        self.properties = properties;
        self
    }

    /// Only takes effect together with `properties(true)`.
    #[must_use]
    pub fn properties_as_list(mut self, properties_as_list: bool) -> Self {
        self.properties_as_list = properties_as_list;
        self
    }

    #[must_use]
    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    #[must_use]
    pub fn compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    #[must_use]
    pub fn event_eol(mut self, event_eol: bool) -> Self {
        self.event_eol = event_eol;
        self
    }

    /// Include the stack trace of thrown errors. Defaults to `true`.
    #[must_use]
    pub fn include_stacktrace(mut self, include_stacktrace: bool) -> Self {
        self.include_stacktrace = include_stacktrace;
        self
    }

    #[must_use]
    pub fn stacktrace_as_string(mut self, stacktrace_as_string: bool) -> Self {
        self.stacktrace_as_string = stacktrace_as_string;
        self
    }

    #[must_use]
    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    #[must_use]
    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Name of the adapter to look up in the registry at build time.
    #[must_use]
    pub fn json_adapter(mut self, name: impl Into<String>) -> Self {
        self.json_adapter = name.into();
        self
    }

    /// Use this adapter instead of looking one up by name.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn JsonAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Builds the layout, resolving the adapter name against the built-in
    /// registry.
    pub fn build(self) -> Result<ExtendedJsonLayout, LayoutError> {
        self.build_with_registry(&AdapterRegistry::default())
    }

    pub fn build_with_registry(
        self,
        registry: &AdapterRegistry,
    ) -> Result<ExtendedJsonLayout, LayoutError> {
        let adapter = match self.adapter {
            Some(adapter) => adapter,
            None => Arc::from(registry.create(&self.json_adapter)?),
        };
        let options = SerializeOptions {
            location_info: self.location_info,
            properties: self.properties,
            properties_as_list: self.properties && self.properties_as_list,
            include_stacktrace: self.include_stacktrace,
            stacktrace_as_string: self.stacktrace_as_string,
        };
        let eol = if self.compact && !self.event_eol {
            COMPACT_EOL
        } else {
            DEFAULT_EOL
        };
        debug!(
            "Built extended JSON layout: complete={} compact={} mixed_fields={}",
            self.complete,
            self.compact,
            adapter.mixed_fields().len()
        );
        Ok(ExtendedJsonLayout {
            options,
            complete: self.complete,
            compact: self.compact,
            eol,
            header: self.header.unwrap_or_else(|| DEFAULT_HEADER.to_string()),
            footer: self.footer.unwrap_or_else(|| DEFAULT_FOOTER.to_string()),
            adapter,
            event_count: Mutex::new(0),
        })
    }
}

/// Serializes [`LogEvent`]s as JSON objects carrying the adapter's mixed
/// fields after the standard attributes.
#[derive(Debug)]
pub struct ExtendedJsonLayout {
    options: SerializeOptions,
    complete: bool,
    compact: bool,
    eol: &'static str,
    header: String,
    footer: String,
    adapter: Arc<dyn JsonAdapter>,
    /// Events fully written. Held while writing so that the separator
    /// decision and the bytes it guards stay together.
    event_count: Mutex<u64>,
}

impl ExtendedJsonLayout {
    #[must_use]
    pub fn builder() -> ExtendedJsonLayoutBuilder {
        ExtendedJsonLayoutBuilder::default()
    }

    /// Layout with default settings and the hostname adapter. Unlike the
    /// builder, stack traces are written as frame objects.
    #[must_use]
    pub fn create_default_layout() -> Self {
        Self::with_adapter(Arc::new(crate::adapter::HostnameAdapter::new()))
    }

    /// Default settings with an explicit adapter.
    #[must_use]
    pub fn with_adapter(adapter: Arc<dyn JsonAdapter>) -> Self {
        Self {
            options: SerializeOptions::default(),
            complete: false,
            compact: false,
            eol: DEFAULT_EOL,
            header: DEFAULT_HEADER.to_string(),
            footer: DEFAULT_FOOTER.to_string(),
            adapter,
            event_count: Mutex::new(0),
        }
    }

    /// Bytes opening the JSON array, or `None` for fragment output.
    #[must_use]
    pub fn header(&self) -> Option<Vec<u8>> {
        if !self.complete {
            return None;
        }
        Some(format!("{}{}", self.header, self.eol).into_bytes())
    }

    /// Bytes closing the JSON array, or `None` for fragment output.
    #[must_use]
    pub fn footer(&self) -> Option<Vec<u8>> {
        if !self.complete {
            return None;
        }
        Some(format!("{}{}{}", self.eol, self.footer, self.eol).into_bytes())
    }

    #[must_use]
    pub fn content_type(&self) -> String {
        format!("{CONTENT_TYPE}; charset=UTF-8")
    }

    #[must_use]
    pub fn content_format(&self) -> HashMap<String, String> {
        HashMap::from([("version".to_string(), "2.0".to_string())])
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn is_compact(&self) -> bool {
        self.compact
    }

    #[must_use]
    pub fn eol(&self) -> &'static str {
        self.eol
    }

    #[must_use]
    pub fn options(&self) -> SerializeOptions {
        self.options
    }

    #[must_use]
    pub fn adapter(&self) -> &dyn JsonAdapter {
        self.adapter.as_ref()
    }

    /// Number of events written so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        *self.event_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes one event: the separator when needed, the merged JSON object,
    /// then the end-of-line.
    ///
    /// The event is rendered before anything is written, and the count only
    /// moves once every byte is written, so a failed event never leaves a
    /// dangling separator for the next one.
    pub fn to_serializable<W: Write + ?Sized>(
        &self,
        event: &LogEvent,
        writer: &mut W,
    ) -> Result<(), LayoutError> {
        let body = self.render(event)?;
        let mut count = self.event_count.lock().unwrap_or_else(PoisonError::into_inner);
        if self.complete && *count > 0 {
            writer.write_all(EVENT_SEPARATOR)?;
        }
        writer.write_all(&body)?;
        writer.write_all(self.eol.as_bytes())?;
        *count += 1;
        Ok(())
    }

    pub fn to_byte_array(&self, event: &LogEvent) -> Result<Vec<u8>, LayoutError> {
        let mut buffer = Vec::new();
        self.to_serializable(event, &mut buffer)?;
        Ok(buffer)
    }

    pub fn to_json_string(&self, event: &LogEvent) -> Result<String, LayoutError> {
        let bytes = self.to_byte_array(event)?;
        String::from_utf8(bytes).map_err(|e| LayoutError::Serialize(serde_json::Error::custom(e)))
    }

    fn render(&self, event: &LogEvent) -> Result<Vec<u8>, LayoutError> {
        let view = EventView::new(event, self.options);
        let wrapper = ExtendedJsonWrapper::new(&view, self.adapter.mixed_fields());
        let mut buffer = Vec::with_capacity(256);
        if self.compact {
            serde_json::to_writer(&mut buffer, &wrapper)?;
        } else {
            let mut serializer = serde_json::Serializer::with_formatter(
                &mut buffer,
                PrettyFormatter::with_indent(PRETTY_INDENT),
            );
            wrapper.serialize(&mut serializer)?;
        }
        Ok(buffer)
    }
}
