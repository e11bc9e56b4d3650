// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `tracing` event formatter backed by [`ExtendedJsonLayout`].
//!
//! Every `tracing` event becomes a [`LogEvent`]:
//!
//! - `level` comes from the event metadata and `loggerName` from its target
//! - the `message` field becomes `message`, other fields go to `contextMap`
//! - a field recorded as an error becomes `thrown`, with its source chain
//! - active spans, root first, are pushed onto `contextStack` as
//!   `name{fields}` (braces only when the span has fields)
//! - module path, file and line become `source`
//!
//! # Usage
//!
//! ```rust,ignore
//! use extended_json_layout::{ExtendedJsonLayout, JsonLayoutFormatter};
//!
//! let layout = ExtendedJsonLayout::builder().compact(true).build()?;
//! let subscriber = tracing_subscriber::fmt::Subscriber::builder()
//!     .event_format(JsonLayoutFormatter::new(layout))
//!     .finish();
//!
//! tracing::subscriber::set_global_default(subscriber)?;
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing_core::field::{Field, Visit};
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::adapter::AdapterRegistry;
use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::event::{current_thread_id, LogEvent, Source, ThrownProxy};
use crate::layout::ExtendedJsonLayout;
use crate::level::Level;

const MESSAGE_FIELD: &str = "message";
const ESCAPE: char = '\u{1b}';

/// Formats `tracing` events through an [`ExtendedJsonLayout`].
#[derive(Debug, Clone)]
pub struct JsonLayoutFormatter {
    layout: Arc<ExtendedJsonLayout>,
}

impl JsonLayoutFormatter {
    #[must_use]
    pub fn new(layout: ExtendedJsonLayout) -> Self {
        Self::from_shared(Arc::new(layout))
    }

    /// Shares a layout with other writers, e.g. to emit its header and
    /// footer around the subscriber's output.
    #[must_use]
    pub fn from_shared(layout: Arc<ExtendedJsonLayout>) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn layout(&self) -> &Arc<ExtendedJsonLayout> {
        &self.layout
    }
}

impl<S, N> FormatEvent<S, N> for JsonLayoutFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut context_stack = Vec::new();
        let mut innermost_span = None;
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let ext = span.extensions();
                match ext.get::<FormattedFields<N>>() {
                    Some(fields) if !fields.is_empty() => {
                        let fields = strip_ansi(fields);
                        context_stack.push(format!("{}{{{fields}}}", span.name()));
                    }
                    _ => context_stack.push(span.name().to_string()),
                }
                innermost_span = Some(span.name());
            }
        }

        let current = std::thread::current();
        let log_event = LogEvent {
            time_millis: chrono::Utc::now().timestamp_millis(),
            thread: current.name().unwrap_or("unnamed").to_string(),
            thread_id: current_thread_id(),
            level: Level::from(metadata.level()),
            logger_name: metadata.target().to_string(),
            marker: None,
            message: visitor.message.unwrap_or_default(),
            thrown: visitor.thrown,
            logger_fqcn: None,
            end_of_batch: false,
            context_map: visitor.fields,
            context_stack,
            source: Some(Source {
                class_name: metadata
                    .module_path()
                    .unwrap_or_else(|| metadata.target())
                    .to_string(),
                method: innermost_span.map(str::to_string),
                file: metadata.file().map(str::to_string),
                line: metadata.line(),
            }),
        };

        // fmt::Error carries no payload, so the cause is dropped here.
        let text = self.layout.to_json_string(&log_event).map_err(|_| fmt::Error)?;
        writer.write_str(&text)?;

        // Compact output without event_eol has no terminator; fmt writers
        // still need one record per line.
        if self.layout.eol().is_empty() {
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Removes terminal escape sequences. Span fields are rendered by the
/// subscriber's field formatter, which colours them whenever ANSI output is
/// enabled on the subscriber.
fn strip_ansi(text: &str) -> Cow<'_, str> {
    if !text.contains(ESCAPE) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        // CSI sequences run from `ESC [` to a final byte in `@..=~`.
        if chars.next() == Some('[') {
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
    }
    Cow::Owned(out)
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
    thrown: Option<ThrownProxy>,
}

impl EventVisitor {
    fn record_value(&mut self, field: &Field, value: Value) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(match value {
                Value::String(message) => message,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if self.thrown.is_none() {
            self.thrown = Some(ThrownProxy::from_error(field.name(), value));
        }
        self.record_value(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, Value::from(format!("{value:?}")));
    }
}

/// Installs a global `fmt` subscriber that formats every event through a
/// layout built from `config`.
pub fn init_subscriber(config: &LayoutConfig) -> Result<Arc<ExtendedJsonLayout>, LayoutError> {
    let layout = Arc::new(config.build_layout(&AdapterRegistry::default())?);
    let env_filter = EnvFilter::try_new(config.log_level.to_ascii_lowercase())
        .map_err(|e| LayoutError::InvalidConfig(e.to_string()))?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .event_format(JsonLayoutFormatter::from_shared(Arc::clone(&layout)))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LayoutError::Subscriber(e.to_string()))?;

    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StaticFieldsAdapter;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn records(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn capture<F: FnOnce()>(layout: ExtendedJsonLayout, f: F) -> Vec<Value> {
        capture_with_ansi(layout, false, f)
    }

    fn capture_with_ansi<F: FnOnce()>(layout: ExtendedJsonLayout, ansi: bool, f: F) -> Vec<Value> {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(ansi)
            .with_writer(move || writer.clone())
            .event_format(JsonLayoutFormatter::new(layout))
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        buffer.records()
    }

    fn compact_layout() -> ExtendedJsonLayout {
        ExtendedJsonLayout::builder()
            .adapter(Arc::new(StaticFieldsAdapter::new().with_field("hostname", "web-1")))
            .compact(true)
            .properties(true)
            .location_info(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_event_message_fields_and_mixed_fields() {
        let records = capture(compact_layout(), || {
            tracing::warn!(target: "app::db", retries = 3, ok = false, "connection lost");
        });

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["level"], "WARN");
        assert_eq!(record["loggerName"], "app::db");
        assert_eq!(record["message"], "connection lost");
        assert_eq!(record["contextMap"]["retries"], 3);
        assert_eq!(record["contextMap"]["ok"], false);
        assert_eq!(record["hostname"], "web-1");
        assert!(record["source"]["line"].is_u64());
    }

    #[test]
    fn test_hostname_is_last_key() {
        let records = capture(compact_layout(), || tracing::info!("ready"));
        let keys: Vec<&String> = records[0].as_object().unwrap().keys().collect();
        assert_eq!(keys.last().map(|k| k.as_str()), Some("hostname"));
    }

    #[test]
    fn test_spans_become_context_stack() {
        let records = capture(compact_layout(), || {
            let outer = tracing::info_span!("request", id = 7);
            let _outer = outer.enter();
            let inner = tracing::info_span!("query");
            let _inner = inner.enter();
            tracing::debug!("running");
        });

        let record = &records[0];
        assert_eq!(record["contextStack"], serde_json::json!(["request{id=7}", "query"]));
        assert_eq!(record["source"]["method"], "query");
    }

    #[test]
    fn test_span_fields_have_no_escape_codes_with_ansi_enabled() {
        let records = capture_with_ansi(compact_layout(), true, || {
            let span = tracing::info_span!("request", id = 7, route = "/users");
            let _span = span.enter();
            tracing::info!("handled");
        });

        let stack = records[0]["contextStack"][0].as_str().unwrap();
        assert!(!stack.contains('\u{1b}'), "escape codes in {stack:?}");
        assert_eq!(stack, "request{id=7 route=\"/users\"}");
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(
            strip_ansi("\u{1b}[3mid\u{1b}[0m\u{1b}[2m=\u{1b}[0m7"),
            "id=7"
        );
        assert!(matches!(strip_ansi("id=7"), Cow::Borrowed("id=7")));
    }

    #[test]
    fn test_error_field_becomes_thrown() {
        let records = capture(compact_layout(), || {
            let error = io::Error::new(io::ErrorKind::TimedOut, "upstream timed out");
            tracing::error!(error = &error as &(dyn std::error::Error + 'static), "request failed");
        });

        let record = &records[0];
        assert_eq!(record["thrown"]["name"], "error");
        assert_eq!(record["thrown"]["message"], "upstream timed out");
        assert_eq!(record["contextMap"]["error"], "upstream timed out");
    }

    #[test]
    fn test_one_record_per_line_without_event_eol() {
        let records = capture(compact_layout(), || {
            tracing::info!("one");
            tracing::info!("two");
        });
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["message"], "two");
    }
}
