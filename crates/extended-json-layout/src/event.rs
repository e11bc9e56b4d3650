// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Standard log event attributes.
//!
//! [`LogEvent`] is the origin record that the layout serializes before any
//! mixed fields. It only implements `Deserialize`: output goes through
//! [`EventView`], which decides which attributes appear and in what shape
//! according to [`SerializeOptions`].
//!
//! Field order of a serialized event:
//!
//! ```text
//! timeMillis, thread, threadId, level, loggerName, marker, message, thrown,
//! loggerFqcn, endOfBatch, contextMap, contextStack, source
//! ```

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::level::Level;

const UNKNOWN_SOURCE: &str = "Unknown Source";
const CAUSE_CAPTION: &str = "Caused by: ";
const SUPPRESSED_CAPTION: &str = "Suppressed: ";

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Small, stable numeric id for the calling thread.
pub(crate) fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| {
        if id.get() == 0 {
            id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        }
        id.get()
    })
}

/// Which optional attributes an [`EventView`] writes, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Write the `source` location.
    pub location_info: bool,
    /// Write the `contextMap` properties.
    pub properties: bool,
    /// Write `contextMap` as a list of `{"key", "value"}` objects.
    pub properties_as_list: bool,
    /// Write `extendedStackTrace` for thrown errors.
    pub include_stacktrace: bool,
    /// Write `extendedStackTrace` as one string instead of frame objects.
    pub stacktrace_as_string: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            location_info: false,
            properties: false,
            properties_as_list: false,
            include_stacktrace: true,
            stacktrace_as_string: false,
        }
    }
}

/// A named marker, possibly with parent markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<Marker>,
}

impl Marker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: Marker) -> Self {
        self.parents.push(parent);
        self
    }
}

/// Where the event was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// One frame of an extended stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    #[serde(rename = "class")]
    pub class_name: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default = "unknown_line")]
    pub line: i32,
    #[serde(default)]
    pub exact: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn unknown_line() -> i32 {
    -1
}

impl StackFrame {
    pub fn new(class_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method: method.into(),
            file: None,
            line: -1,
            exact: false,
            location: None,
            version: None,
        }
    }

    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: i32) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    /// Parses a `class.method(file:line)` line, with or without a leading `at`.
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let line = line.strip_prefix("at ").unwrap_or(line);
        let (qualified, location) = line.split_once('(')?;
        let location = location.split(')').next()?;
        let (class_name, method) = qualified.rsplit_once('.')?;
        let mut frame = StackFrame::new(class_name, method);
        match location.rsplit_once(':') {
            Some((file, number)) => {
                frame.file = Some(file.to_string());
                frame.line = number.parse().unwrap_or(-1);
            }
            None if location != UNKNOWN_SOURCE && !location.is_empty() => {
                frame.file = Some(location.to_string());
            }
            None => {}
        }
        Some(frame)
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.class_name, self.method)?;
        match &self.file {
            Some(file) if self.line >= 0 => write!(f, "{file}:{})", self.line),
            Some(file) => write!(f, "{file})"),
            None => write!(f, "{UNKNOWN_SOURCE})"),
        }
    }
}

/// A thrown error with its stack and cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrownProxy {
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub localized_message: Option<String>,
    #[serde(default, deserialize_with = "deserialize_stack_trace")]
    pub extended_stack_trace: Vec<StackFrame>,
    #[serde(default)]
    pub cause: Option<Box<ThrownProxy>>,
    #[serde(default)]
    pub suppressed: Vec<ThrownProxy>,
    #[serde(default)]
    pub common_element_count: u32,
}

impl ThrownProxy {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: name.into(),
            localized_message: Some(message.clone()),
            message: Some(message),
            extended_stack_trace: Vec::new(),
            cause: None,
            suppressed: Vec::new(),
            common_element_count: 0,
        }
    }

    /// Captures an error and its `source()` chain. The error type is not
    /// available through a trait object, so `name` is supplied by the caller.
    pub fn from_error(name: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let name = name.into();
        let mut thrown = ThrownProxy::new(name.clone(), error.to_string());
        if let Some(source) = error.source() {
            thrown.cause = Some(Box::new(ThrownProxy::from_error(name, source)));
        }
        thrown
    }

    #[must_use]
    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.extended_stack_trace.push(frame);
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: ThrownProxy) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    #[must_use]
    pub fn with_suppressed(mut self, suppressed: ThrownProxy) -> Self {
        self.suppressed.push(suppressed);
        self
    }

    /// `name: message` followed by one tab-indented `at` line per frame,
    /// then each suppressed error (indented one more tab) and the cause
    /// chain, in the usual `Suppressed:` / `Caused by:` form.
    #[must_use]
    pub fn stack_trace_string(&self) -> String {
        let mut out = String::new();
        self.write_stack_trace(&mut out, "", "");
        out
    }

    fn write_stack_trace(&self, out: &mut String, caption: &str, prefix: &str) {
        out.push_str(prefix);
        out.push_str(caption);
        out.push_str(&self.name);
        if let Some(message) = &self.message {
            out.push_str(": ");
            out.push_str(message);
        }
        for frame in &self.extended_stack_trace {
            out.push('\n');
            out.push_str(prefix);
            out.push_str("\tat ");
            out.push_str(&frame.to_string());
        }
        let nested = format!("{prefix}\t");
        for suppressed in &self.suppressed {
            out.push('\n');
            suppressed.write_stack_trace(out, SUPPRESSED_CAPTION, &nested);
        }
        if let Some(cause) = &self.cause {
            out.push('\n');
            cause.write_stack_trace(out, CAUSE_CAPTION, prefix);
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StackTraceRepr {
    Frames(Vec<StackFrame>),
    Text(String),
}

fn deserialize_stack_trace<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<StackFrame>, D::Error> {
    Ok(match StackTraceRepr::deserialize(deserializer)? {
        StackTraceRepr::Frames(frames) => frames,
        // Only the frames before the first nested section belong to this
        // error; suppressed errors and causes carry their own traces.
        StackTraceRepr::Text(text) => text
            .lines()
            .take_while(|line| {
                let line = line.trim_start();
                !line.starts_with(CAUSE_CAPTION) && !line.starts_with(SUPPRESSED_CAPTION)
            })
            .filter(|line| line.trim_start().starts_with("at "))
            .filter_map(StackFrame::parse)
            .collect(),
    })
}

#[derive(Serialize, Deserialize)]
struct ContextEntry<K, V> {
    key: K,
    value: V,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContextMapRepr {
    Map(Map<String, Value>),
    List(Vec<ContextEntry<String, Value>>),
}

fn deserialize_context_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Map<String, Value>, D::Error> {
    Ok(match ContextMapRepr::deserialize(deserializer)? {
        ContextMapRepr::Map(map) => map,
        ContextMapRepr::List(entries) => entries
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect(),
    })
}

/// The origin record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub time_millis: i64,
    pub thread: String,
    #[serde(default)]
    pub thread_id: u64,
    pub level: Level,
    pub logger_name: String,
    #[serde(default)]
    pub marker: Option<Marker>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub thrown: Option<ThrownProxy>,
    #[serde(default)]
    pub logger_fqcn: Option<String>,
    #[serde(default)]
    pub end_of_batch: bool,
    #[serde(default, deserialize_with = "deserialize_context_map")]
    pub context_map: Map<String, Value>,
    #[serde(default)]
    pub context_stack: Vec<String>,
    #[serde(default)]
    pub source: Option<Source>,
}

impl LogEvent {
    /// New event stamped with the current time and thread.
    pub fn new(level: Level, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        let current = std::thread::current();
        Self {
            time_millis: chrono::Utc::now().timestamp_millis(),
            thread: current.name().unwrap_or("unnamed").to_string(),
            thread_id: current_thread_id(),
            level,
            logger_name: logger_name.into(),
            marker: None,
            message: message.into(),
            thrown: None,
            logger_fqcn: None,
            end_of_batch: false,
            context_map: Map::new(),
            context_stack: Vec::new(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_time_millis(mut self, time_millis: i64) -> Self {
        self.time_millis = time_millis;
        self
    }

    #[must_use]
    pub fn with_thread(mut self, name: impl Into<String>, id: u64) -> Self {
        self.thread = name.into();
        self.thread_id = id;
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = Some(marker);
        self
    }

    #[must_use]
    pub fn with_thrown(mut self, thrown: ThrownProxy) -> Self {
        self.thrown = Some(thrown);
        self
    }

    #[must_use]
    pub fn with_logger_fqcn(mut self, fqcn: impl Into<String>) -> Self {
        self.logger_fqcn = Some(fqcn.into());
        self
    }

    #[must_use]
    pub fn with_end_of_batch(mut self, end_of_batch: bool) -> Self {
        self.end_of_batch = end_of_batch;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_map.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_context_stack(mut self, entry: impl Into<String>) -> Self {
        self.context_stack.push(entry.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }
}

/// Serializable view of a [`LogEvent`] under a set of [`SerializeOptions`].
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    event: &'a LogEvent,
    options: SerializeOptions,
}

impl<'a> EventView<'a> {
    #[must_use]
    pub fn new(event: &'a LogEvent, options: SerializeOptions) -> Self {
        Self { event, options }
    }

    #[must_use]
    pub fn event(&self) -> &'a LogEvent {
        self.event
    }
}

impl Serialize for EventView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let event = self.event;
        let options = self.options;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("timeMillis", &event.time_millis)?;
        map.serialize_entry("thread", &event.thread)?;
        map.serialize_entry("threadId", &event.thread_id)?;
        map.serialize_entry("level", &event.level)?;
        map.serialize_entry("loggerName", &event.logger_name)?;
        if let Some(marker) = &event.marker {
            map.serialize_entry("marker", marker)?;
        }
        map.serialize_entry("message", &event.message)?;
        if let Some(thrown) = &event.thrown {
            map.serialize_entry("thrown", &ThrownView { thrown, options })?;
        }
        if let Some(fqcn) = &event.logger_fqcn {
            map.serialize_entry("loggerFqcn", fqcn)?;
        }
        map.serialize_entry("endOfBatch", &event.end_of_batch)?;
        if options.properties {
            if options.properties_as_list {
                map.serialize_entry("contextMap", &ContextList(&event.context_map))?;
            } else {
                map.serialize_entry("contextMap", &event.context_map)?;
            }
        }
        if !event.context_stack.is_empty() {
            map.serialize_entry("contextStack", &event.context_stack)?;
        }
        if options.location_info {
            if let Some(source) = &event.source {
                map.serialize_entry("source", source)?;
            }
        }
        map.end()
    }
}

struct ContextList<'a>(&'a Map<String, Value>);

impl Serialize for ContextList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for (key, value) in self.0 {
            seq.serialize_element(&ContextEntry { key, value })?;
        }
        seq.end()
    }
}

struct ThrownView<'a> {
    thrown: &'a ThrownProxy,
    options: SerializeOptions,
}

impl Serialize for ThrownView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let thrown = self.thrown;
        let options = self.options;
        let mut map = serializer.serialize_map(None)?;
        if let Some(cause) = &thrown.cause {
            map.serialize_entry("cause", &ThrownView { thrown: cause, options })?;
        }
        map.serialize_entry("commonElementCount", &thrown.common_element_count)?;
        if options.include_stacktrace {
            if options.stacktrace_as_string {
                map.serialize_entry("extendedStackTrace", &thrown.stack_trace_string())?;
            } else {
                map.serialize_entry("extendedStackTrace", &thrown.extended_stack_trace)?;
            }
        }
        if let Some(localized) = &thrown.localized_message {
            map.serialize_entry("localizedMessage", localized)?;
        }
        if let Some(message) = &thrown.message {
            map.serialize_entry("message", message)?;
        }
        map.serialize_entry("name", &thrown.name)?;
        if !thrown.suppressed.is_empty() {
            let suppressed: Vec<ThrownView<'_>> = thrown
                .suppressed
                .iter()
                .map(|thrown| ThrownView { thrown, options })
                .collect();
            map.serialize_entry("suppressed", &suppressed)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> LogEvent {
        LogEvent::new(Level::Debug, "a.B", "Msg")
            .with_time_millis(1)
            .with_thread("MyThreadName", 7)
            .with_marker(Marker::new("Marker1").with_parent(Marker::new("ParentMarker1")))
            .with_thrown(
                ThrownProxy::new("java.io.IOException", "testIOEx")
                    .with_frame(StackFrame::new("LogEventFixtures", "createLogEvent").at("LogEventFixtures.java", 56))
                    .with_cause(ThrownProxy::new("java.lang.NullPointerException", "testNPEx"))
                    .with_suppressed(ThrownProxy::new("java.lang.IndexOutOfBoundsException", "I am suppressed exception 1")),
            )
            .with_logger_fqcn("f.q.c.n")
            .with_context("MDC.B", "B_Value")
            .with_context("MDC.A", "A_Value")
            .with_context_stack("stack_msg1")
            .with_source(Source {
                class_name: "LogEventFixtures".to_string(),
                method: Some("createLogEvent".to_string()),
                file: Some("LogEventFixtures.java".to_string()),
                line: Some(54),
            })
    }

    fn keys(value: &Value) -> Vec<String> {
        value.as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn test_default_options_field_order() {
        let value = serde_json::to_value(EventView::new(&fixture(), SerializeOptions::default())).unwrap();
        assert_eq!(
            keys(&value),
            vec![
                "timeMillis",
                "thread",
                "threadId",
                "level",
                "loggerName",
                "marker",
                "message",
                "thrown",
                "loggerFqcn",
                "endOfBatch",
                "contextStack",
            ]
        );
        assert_eq!(value["level"], "DEBUG");
        assert_eq!(value["marker"]["parents"][0]["name"], "ParentMarker1");
    }

    #[test]
    fn test_location_and_properties_enabled() {
        let options = SerializeOptions {
            location_info: true,
            properties: true,
            ..SerializeOptions::default()
        };
        let value = serde_json::to_value(EventView::new(&fixture(), options)).unwrap();
        assert_eq!(value["contextMap"], json!({"MDC.B": "B_Value", "MDC.A": "A_Value"}));
        assert_eq!(value["source"]["line"], 54);
        assert_eq!(value["source"]["class"], "LogEventFixtures");
    }

    #[test]
    fn test_properties_as_list() {
        let options = SerializeOptions {
            properties: true,
            properties_as_list: true,
            ..SerializeOptions::default()
        };
        let value = serde_json::to_value(EventView::new(&fixture(), options)).unwrap();
        assert_eq!(
            value["contextMap"],
            json!([{"key": "MDC.B", "value": "B_Value"}, {"key": "MDC.A", "value": "A_Value"}])
        );
    }

    #[test]
    fn test_stacktrace_excluded() {
        let options = SerializeOptions {
            include_stacktrace: false,
            ..SerializeOptions::default()
        };
        let value = serde_json::to_value(EventView::new(&fixture(), options)).unwrap();
        assert!(value["thrown"].get("extendedStackTrace").is_none());
        assert!(value["thrown"]["cause"].get("extendedStackTrace").is_none());
        assert_eq!(value["thrown"]["name"], "java.io.IOException");
    }

    #[test]
    fn test_stacktrace_as_string() {
        let options = SerializeOptions {
            stacktrace_as_string: true,
            ..SerializeOptions::default()
        };
        let value = serde_json::to_value(EventView::new(&fixture(), options)).unwrap();
        assert_eq!(
            value["thrown"]["extendedStackTrace"],
            concat!(
                "java.io.IOException: testIOEx\n",
                "\tat LogEventFixtures.createLogEvent(LogEventFixtures.java:56)\n",
                "\tSuppressed: java.lang.IndexOutOfBoundsException: I am suppressed exception 1\n",
                "Caused by: java.lang.NullPointerException: testNPEx"
            )
        );
    }

    #[test]
    fn test_stack_trace_string_nests_causes_and_suppressed_frames() {
        let thrown = ThrownProxy::new("Outer", "outer")
            .with_frame(StackFrame::new("a.B", "run").at("B.java", 1))
            .with_suppressed(
                ThrownProxy::new("Closing", "close failed")
                    .with_frame(StackFrame::new("a.C", "close").at("C.java", 2)),
            )
            .with_cause(
                ThrownProxy::new("Middle", "middle")
                    .with_frame(StackFrame::new("a.D", "call").at("D.java", 3))
                    .with_cause(ThrownProxy::new("Root", "root")),
            );

        assert_eq!(
            thrown.stack_trace_string(),
            concat!(
                "Outer: outer\n",
                "\tat a.B.run(B.java:1)\n",
                "\tSuppressed: Closing: close failed\n",
                "\t\tat a.C.close(C.java:2)\n",
                "Caused by: Middle: middle\n",
                "\tat a.D.call(D.java:3)\n",
                "Caused by: Root: root"
            )
        );

        let parsed: Vec<StackFrame> =
            deserialize_stack_trace(Value::from(thrown.stack_trace_string())).unwrap();
        assert_eq!(parsed, thrown.extended_stack_trace);
    }

    #[test]
    fn test_read_back_from_string_stack_trace_and_list_properties() {
        let options = SerializeOptions {
            location_info: true,
            properties: true,
            properties_as_list: true,
            include_stacktrace: true,
            stacktrace_as_string: true,
        };
        let original = fixture();
        let text = serde_json::to_string(&EventView::new(&original, options)).unwrap();
        let parsed: LogEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("flush failed")]
    struct FlushError(#[source] std::io::Error);

    #[test]
    fn test_from_error_captures_cause_chain() {
        let error = FlushError(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let thrown = ThrownProxy::from_error("error", &error);
        assert_eq!(thrown.message.as_deref(), Some("flush failed"));
        let cause = thrown.cause.expect("cause captured");
        assert_eq!(cause.message.as_deref(), Some("disk full"));
        assert!(cause.cause.is_none());
    }

    #[test]
    fn test_stack_frame_parse() {
        let frame = StackFrame::parse("\tat a.b.C.run(C.java:12)").unwrap();
        assert_eq!(frame.class_name, "a.b.C");
        assert_eq!(frame.method, "run");
        assert_eq!(frame.file.as_deref(), Some("C.java"));
        assert_eq!(frame.line, 12);

        let frame = StackFrame::parse("at a.B.invoke(Unknown Source)").unwrap();
        assert_eq!(frame.file, None);
        assert_eq!(frame.line, -1);
    }

    #[test]
    fn test_thread_id_is_stable_per_thread() {
        let first = current_thread_id();
        assert_eq!(first, current_thread_id());
        let other = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(first, other);
    }
}
