//! Builds JSON features from decoder events
//!
//! Containers written more than once at the same path are merged: objects
//! take the union of their members, arrays are concatenated.

use futures_util::stream::{BoxStream, StreamExt};
use serde_json::{Map, Number, Value as JsonValue};

use super::errors::DecoderError;
use super::events::FeatureEvent;
use crate::schema::SchemaType;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<JsonValue>,
    pub number_returned: i64,
    pub number_matched: Option<i64>,
    pub number_skipped: Option<i64>,
}

#[derive(Debug)]
enum Frame {
    Object(Map<String, JsonValue>),
    Array(Vec<JsonValue>),
}

impl Frame {
    fn into_value(self) -> JsonValue {
        match self {
            Frame::Object(map) => JsonValue::Object(map),
            Frame::Array(items) => JsonValue::Array(items),
        }
    }
}

#[derive(Debug, Default)]
pub struct FeatureCollector {
    stack: Vec<(Vec<String>, Frame)>,
    collection: FeatureCollection,
    chunks: usize,
    /// Written for explicit nulls instead of JSON `null`
    null_value: Option<String>,
}

impl FeatureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_null_value(null_value: Option<String>) -> Self {
        FeatureCollector {
            null_value,
            ..Self::default()
        }
    }

    pub fn push(&mut self, event: FeatureEvent) {
        match event {
            FeatureEvent::Meta(meta) => {
                if self.chunks == 0 {
                    self.collection.number_matched = (meta.number_matched >= 0).then_some(meta.number_matched);
                    self.collection.number_skipped = (meta.number_skipped >= 0).then_some(meta.number_skipped);
                }
                self.chunks += 1;
                self.collection.number_returned += meta.number_returned;
            }
            FeatureEvent::FeatureStart { .. } => {
                self.stack = vec![(vec![], Frame::Object(Map::new()))];
            }
            FeatureEvent::FeatureEnd => {
                while self.stack.len() > 1 {
                    self.close();
                }
                if let Some((_, feature)) = self.stack.pop() {
                    self.collection.features.push(feature.into_value());
                }
            }
            FeatureEvent::ObjectStart { path } => self.stack.push((path, Frame::Object(Map::new()))),
            FeatureEvent::ArrayStart { path } => self.stack.push((path, Frame::Array(Vec::new()))),
            FeatureEvent::ObjectEnd { .. } | FeatureEvent::ArrayEnd { .. } => self.close(),
            FeatureEvent::Value {
                path,
                value,
                value_type,
            } => self.attach(&path, typed(value, value_type)),
            FeatureEvent::Null { path } => {
                let null = match &self.null_value {
                    Some(sentinel) => JsonValue::String(sentinel.clone()),
                    None => JsonValue::Null,
                };
                self.attach(&path, null);
            }
        }
    }

    pub fn finish(self) -> FeatureCollection {
        self.collection
    }

    fn close(&mut self) {
        if self.stack.len() < 2 {
            return;
        }
        if let Some((path, frame)) = self.stack.pop() {
            self.attach(&path, frame.into_value());
        }
    }

    fn attach(&mut self, path: &[String], value: JsonValue) {
        match self.stack.last_mut() {
            Some((_, Frame::Array(items))) => items.push(value),
            Some((_, Frame::Object(map))) => {
                if let Some(key) = path.last() {
                    merge(map, key, value);
                }
            }
            None => {}
        }
    }
}

fn merge(map: &mut Map<String, JsonValue>, key: &str, value: JsonValue) {
    match (map.get_mut(key), value) {
        (Some(JsonValue::Object(existing)), JsonValue::Object(members)) => existing.extend(members),
        (Some(JsonValue::Array(existing)), JsonValue::Array(items)) => existing.extend(items),
        (_, value) => {
            map.insert(key.to_string(), value);
        }
    }
}

fn typed(value: String, value_type: SchemaType) -> JsonValue {
    match value_type {
        SchemaType::Integer => match value.parse::<i64>() {
            Ok(i) => JsonValue::Number(i.into()),
            Err(_) => JsonValue::String(value),
        },
        SchemaType::Float => value
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::String(value)),
        SchemaType::Boolean => JsonValue::Bool(matches!(value.as_str(), "true" | "t" | "1")),
        _ => JsonValue::String(value),
    }
}

/// Collects a decoded stream into JSON features
pub async fn collect_features(
    mut events: BoxStream<'static, Result<FeatureEvent, DecoderError>>,
) -> Result<FeatureCollection, DecoderError> {
    let mut collector = FeatureCollector::new();
    while let Some(event) = events.next().await {
        collector.push(event?);
    }
    Ok(collector.finish())
}
