use crate::connector::SqlRowMeta;
use crate::schema::SchemaType;

/// Token emitted by the [`FeatureDecoder`](super::FeatureDecoder).
///
/// Paths are property paths from the feature root. Values are the textual
/// form of the column value, typed by `value_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureEvent {
    /// Bounds and counts of the following chunk
    Meta(SqlRowMeta),
    /// Start of a feature of the named type
    FeatureStart { type_name: String },
    FeatureEnd,
    ObjectStart { path: Vec<String> },
    ObjectEnd { path: Vec<String> },
    ArrayStart { path: Vec<String> },
    ArrayEnd { path: Vec<String> },
    Value {
        path: Vec<String>,
        value: String,
        value_type: SchemaType,
    },
    /// Explicit null, only found in mutation input
    Null { path: Vec<String> },
}

impl FeatureEvent {
    pub fn feature_start(type_name: impl Into<String>) -> Self {
        FeatureEvent::FeatureStart {
            type_name: type_name.into(),
        }
    }

    pub fn is_feature_start(&self) -> bool {
        matches!(self, FeatureEvent::FeatureStart { .. })
    }

    pub fn value(path: &[String], value: impl Into<String>, value_type: SchemaType) -> Self {
        FeatureEvent::Value {
            path: path.to_vec(),
            value: value.into(),
            value_type,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, FeatureEvent::Value { .. })
    }
}
