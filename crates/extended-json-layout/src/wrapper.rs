// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Merges mixed fields into an origin record.
//!
//! The wrapper serializes as one flat JSON object: every field of the origin
//! in the origin's own order, then every non-null mixed field. A mixed key
//! that the origin already writes is dropped, so a document never carries
//! the same key twice.

use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Borrowed origin plus the mixed fields to append to it.
#[derive(Debug)]
pub struct ExtendedJsonWrapper<'a, T: ?Sized> {
    origin: &'a T,
    mixed: &'a Map<String, Value>,
}

impl<T: ?Sized> Clone for ExtendedJsonWrapper<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for ExtendedJsonWrapper<'_, T> {}

impl<'a, T: Serialize + ?Sized> ExtendedJsonWrapper<'a, T> {
    #[must_use]
    pub fn new(origin: &'a T, mixed: &'a Map<String, Value>) -> Self {
        Self { origin, mixed }
    }

    #[must_use]
    pub fn origin(&self) -> &'a T {
        self.origin
    }

    #[must_use]
    pub fn mixed(&self) -> &'a Map<String, Value> {
        self.mixed
    }
}

impl<T: Serialize + ?Sized> Serialize for ExtendedJsonWrapper<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let origin = match serde_json::to_value(self.origin).map_err(S::Error::custom)? {
            Value::Object(fields) => fields,
            other => {
                return Err(S::Error::custom(format!(
                    "origin must serialize to a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let mut map = serializer.serialize_map(None)?;
        for (key, value) in &origin {
            map.serialize_entry(key, value)?;
        }
        for (key, value) in self.mixed {
            if value.is_null() || origin.contains_key(key) {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Owning counterpart of [`ExtendedJsonWrapper`] that fields can be added to.
#[derive(Debug, Clone)]
pub struct OwnedWrapper<T> {
    origin: T,
    mixed: Map<String, Value>,
}

impl<T: Serialize> OwnedWrapper<T> {
    pub fn new(origin: T) -> Self {
        Self {
            origin,
            mixed: Map::new(),
        }
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.mixed.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn origin(&self) -> &T {
        &self.origin
    }

    #[must_use]
    pub fn mixed(&self) -> &Map<String, Value> {
        &self.mixed
    }
}

impl<T: Serialize> Serialize for OwnedWrapper<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ExtendedJsonWrapper::new(&self.origin, &self.mixed).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Origin {
        time_millis: i64,
        level: &'static str,
        message: &'static str,
    }

    fn origin() -> Origin {
        Origin {
            time_millis: 1,
            level: "INFO",
            message: "hello",
        }
    }

    #[test]
    fn test_origin_fields_come_first_in_order() {
        let mut mixed = Map::new();
        mixed.insert("hostname".to_string(), json!("web-1"));
        mixed.insert("region".to_string(), json!("eu"));
        let origin = origin();

        let text = serde_json::to_string(&ExtendedJsonWrapper::new(&origin, &mixed)).unwrap();

        assert_eq!(
            text,
            r#"{"timeMillis":1,"level":"INFO","message":"hello","hostname":"web-1","region":"eu"}"#
        );
    }

    #[test]
    fn test_null_mixed_fields_are_skipped() {
        let mut mixed = Map::new();
        mixed.insert("hostname".to_string(), Value::Null);
        mixed.insert("pid".to_string(), json!(42));
        let origin = origin();

        let value = serde_json::to_value(ExtendedJsonWrapper::new(&origin, &mixed)).unwrap();

        assert!(value.get("hostname").is_none());
        assert_eq!(value["pid"], 42);
    }

    #[test]
    fn test_empty_mixed_fields_keep_origin_unchanged() {
        let mixed = Map::new();
        let origin = origin();

        let wrapped = serde_json::to_value(ExtendedJsonWrapper::new(&origin, &mixed)).unwrap();

        assert_eq!(wrapped, serde_json::to_value(&origin).unwrap());
    }

    #[test]
    fn test_colliding_mixed_key_does_not_override_origin() {
        let mut mixed = Map::new();
        mixed.insert("message".to_string(), json!("overridden"));
        let origin = origin();

        let text = serde_json::to_string(&ExtendedJsonWrapper::new(&origin, &mixed)).unwrap();

        assert_eq!(text.matches("\"message\"").count(), 1);
        assert!(text.contains(r#""message":"hello""#));
    }

    #[test]
    fn test_non_object_origin_is_rejected() {
        let mixed = Map::new();
        let result = serde_json::to_string(&ExtendedJsonWrapper::new(&[1, 2, 3], &mixed));
        let error = result.unwrap_err();
        assert!(error.to_string().contains("an array"));
    }

    #[test]
    fn test_nested_mixed_values_are_written_as_json() {
        let mut wrapper = OwnedWrapper::new(origin());
        wrapper.add("labels", json!({"team": "core", "tier": 1}));

        let value = serde_json::to_value(&wrapper).unwrap();

        assert_eq!(value["labels"]["team"], "core");
        assert_eq!(value["labels"]["tier"], 1);
        assert_eq!(wrapper.mixed().len(), 1);
    }
}
