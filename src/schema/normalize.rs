//! Constant normalization
//!
//! Properties with a constant value and no source path get a synthetic
//! column path `constant_<parent>_<n>{constant=<value>}`, so that they flow
//! through derivation like any other column. The decoder recognizes the
//! flag and injects the literal instead of reading a column.

use super::feature_schema::{FeatureSchema, SchemaType};

/// Counts constants across one derivation pass
#[derive(Debug, Default)]
pub struct ConstantNormalizer {
    counter: usize,
}

impl ConstantNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, schema: &FeatureSchema) -> FeatureSchema {
        let mut normalized = schema.clone();
        normalized.properties = schema
            .properties
            .iter()
            .map(|property| {
                let property = self.normalize_constant(&schema.name, property, property.schema_type);
                self.normalize(&property)
            })
            .collect();
        normalized.concat = self.normalize_alternatives(schema, &schema.concat);
        normalized.coalesce = self.normalize_alternatives(schema, &schema.coalesce);
        normalized
    }

    /// Value alternatives take the type of the property they belong to
    fn normalize_alternatives(
        &mut self,
        property: &FeatureSchema,
        alternatives: &[FeatureSchema],
    ) -> Vec<FeatureSchema> {
        alternatives
            .iter()
            .map(|alternative| {
                let value_type = if alternative.properties.is_empty() {
                    property.schema_type
                } else {
                    alternative.schema_type
                };
                let alternative = self.normalize_constant(&property.name, alternative, value_type);
                self.normalize(&alternative)
            })
            .collect()
    }

    fn normalize_constant(
        &mut self,
        parent: &str,
        schema: &FeatureSchema,
        value_type: SchemaType,
    ) -> FeatureSchema {
        let Some(constant) = &schema.constant else {
            return schema.clone();
        };
        if schema.source_path.is_some() {
            return schema.clone();
        }

        let value = if matches!(
            value_type,
            SchemaType::Integer | SchemaType::Float | SchemaType::Boolean
        ) {
            constant.clone()
        } else {
            format!("'{}'", constant.replace('\'', "''"))
        };
        let path = format!(
            "constant_{}_{}{{constant={}}}",
            sanitize(parent),
            self.counter,
            value
        );
        self.counter += 1;

        let mut normalized = schema.clone();
        normalized.source_path = Some(path);
        normalized
    }
}

/// Reduce a name to identifier characters
fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "root".to_string()
    } else {
        sanitized
    }
}
