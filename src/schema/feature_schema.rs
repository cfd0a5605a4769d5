use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::serde_named::{self, Named};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaType {
    Object,
    ObjectArray,
    Value,
    ValueArray,
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Geometry,
}

impl SchemaType {
    pub fn is_array(&self) -> bool {
        matches!(self, SchemaType::ObjectArray | SchemaType::ValueArray)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, SchemaType::Object | SchemaType::ObjectArray)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SchemaType::Integer | SchemaType::Float)
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaType::Object => "OBJECT",
            SchemaType::ObjectArray => "OBJECT_ARRAY",
            SchemaType::Value => "VALUE",
            SchemaType::ValueArray => "VALUE_ARRAY",
            SchemaType::String => "STRING",
            SchemaType::Integer => "INTEGER",
            SchemaType::Float => "FLOAT",
            SchemaType::Boolean => "BOOLEAN",
            SchemaType::Date => "DATE",
            SchemaType::Datetime => "DATETIME",
            SchemaType::Geometry => "GEOMETRY",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Id,
    PrimaryGeometry,
    PrimaryInstant,
    PrimaryIntervalStart,
    PrimaryIntervalEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Returnable,
    Receivable,
    Queryable,
    Sortable,
}

/// What a schema node stands for, decided from its type and sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Object without a source path, its properties live in the parent table
    InlineObject,
    Object,
    ObjectArray,
    ValueArray,
    Value,
    Constant,
    Concat,
    Coalesce,
}

/// Logical feature schema node as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSchema {
    #[serde(skip)]
    pub name: String,

    #[serde(rename = "type", default = "default_type")]
    pub schema_type: SchemaType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<SchemaType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Literal value, any YAML scalar is kept as its text
    #[serde(
        default,
        deserialize_with = "deserialize_constant",
        skip_serializing_if = "Option::is_none"
    )]
    pub constant: Option<String>,

    #[serde(default = "default_true")]
    pub force_polygon_ccw: bool,

    #[serde(default)]
    pub linearize_curves: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_scopes: Vec<Scope>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concat: Vec<FeatureSchema>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coalesce: Vec<FeatureSchema>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serde_named::serialize",
        deserialize_with = "serde_named::deserialize"
    )]
    pub properties: Vec<FeatureSchema>,
}

fn default_type() -> SchemaType {
    SchemaType::String
}

fn default_true() -> bool {
    true
}

fn deserialize_constant<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(d)?;
    Ok(value.and_then(|value| match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

impl Named for FeatureSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl FeatureSchema {
    pub fn new(name: impl Into<String>, schema_type: SchemaType) -> Self {
        FeatureSchema {
            name: name.into(),
            schema_type,
            value_type: None,
            source_path: None,
            role: None,
            constant: None,
            force_polygon_ccw: true,
            linearize_curves: false,
            format: None,
            excluded_scopes: vec![],
            concat: vec![],
            coalesce: vec![],
            properties: vec![],
        }
    }

    pub fn with_source_path(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_value_type(mut self, value_type: SchemaType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn with_constant(mut self, constant: impl Into<String>) -> Self {
        self.constant = Some(constant.into());
        self
    }

    pub fn with_properties(mut self, properties: Vec<FeatureSchema>) -> Self {
        self.properties = properties;
        self
    }

    pub fn kind(&self) -> SchemaKind {
        if !self.concat.is_empty() {
            return SchemaKind::Concat;
        }
        if !self.coalesce.is_empty() {
            return SchemaKind::Coalesce;
        }
        if self.constant.is_some() && self.source_path.is_none() {
            return SchemaKind::Constant;
        }
        match self.schema_type {
            SchemaType::Object if self.source_path.is_none() => SchemaKind::InlineObject,
            SchemaType::Object => SchemaKind::Object,
            SchemaType::ObjectArray => SchemaKind::ObjectArray,
            SchemaType::ValueArray => SchemaKind::ValueArray,
            _ => SchemaKind::Value,
        }
    }

    /// Type of the values, the item type for value arrays
    pub fn effective_value_type(&self) -> SchemaType {
        match self.schema_type {
            SchemaType::Value | SchemaType::ValueArray => {
                self.value_type.unwrap_or(SchemaType::String)
            }
            other => other,
        }
    }

    pub fn is_id(&self) -> bool {
        self.role == Some(Role::Id)
    }

    pub fn is_spatial(&self) -> bool {
        self.schema_type == SchemaType::Geometry
    }

    pub fn is_primary_geometry(&self) -> bool {
        self.role == Some(Role::PrimaryGeometry)
            || (self.role.is_none() && self.is_spatial())
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self.schema_type, SchemaType::Date | SchemaType::Datetime)
    }

    pub fn is_in_scope(&self, scope: Scope) -> bool {
        !self.excluded_scopes.contains(&scope)
    }

    pub fn property(&self, name: &str) -> Option<&FeatureSchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Depth first search for the first property with the given role
    pub fn find_role(&self, role: Role) -> Option<(Vec<String>, &FeatureSchema)> {
        for property in &self.properties {
            if property.role == Some(role) {
                return Some((vec![property.name.clone()], property));
            }
            if let Some((mut path, found)) = property.find_role(role) {
                path.insert(0, property.name.clone());
                return Some((path, found));
            }
        }
        None
    }

    /// The id property, only direct properties qualify
    pub fn id_property(&self) -> Option<&FeatureSchema> {
        self.properties.iter().find(|p| p.is_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
sourcePath: /kita{sortKey=id}
type: OBJECT
properties:
  id:
    sourcePath: id
    type: STRING
    role: ID
  kategorie:
    type: STRING
    constant: KITA
  plaetze:
    sourcePath: "[oid=kita_fk]plaetze"
    type: OBJECT_ARRAY
    properties:
      anzahl:
        sourcePath: anzahl
        type: INTEGER
  version:
    type: INTEGER
    constant: 2
  name:
    type: STRING
    coalesce:
      - sourcePath: name_de
      - sourcePath: name_en
"#;

    #[test]
    fn test_deserialize_keeps_order_and_names() {
        let schema: FeatureSchema = serde_yaml::from_str(SCHEMA).unwrap();
        let names: Vec<_> = schema.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "kategorie", "plaetze", "version", "name"]);
        assert_eq!(schema.properties[2].properties[0].name, "anzahl");
        assert!(schema.force_polygon_ccw);
    }

    #[test]
    fn test_kinds() {
        let schema: FeatureSchema = serde_yaml::from_str(SCHEMA).unwrap();
        assert_eq!(schema.properties[0].kind(), SchemaKind::Value);
        assert_eq!(schema.properties[1].kind(), SchemaKind::Constant);
        assert_eq!(schema.properties[2].kind(), SchemaKind::ObjectArray);
        assert_eq!(schema.properties[4].kind(), SchemaKind::Coalesce);
        assert_eq!(
            FeatureSchema::new("kontakt", SchemaType::Object).kind(),
            SchemaKind::InlineObject
        );
    }

    #[test]
    fn test_constants_of_any_scalar() {
        let schema: FeatureSchema = serde_yaml::from_str(SCHEMA).unwrap();
        assert_eq!(schema.properties[1].constant.as_deref(), Some("KITA"));
        assert_eq!(schema.properties[3].constant.as_deref(), Some("2"));
    }

    #[test]
    fn test_find_role() {
        let schema: FeatureSchema = serde_yaml::from_str(SCHEMA).unwrap();
        let (path, id) = schema.find_role(Role::Id).unwrap();
        assert_eq!(path, vec!["id".to_string()]);
        assert_eq!(id.source_path.as_deref(), Some("id"));
        assert!(schema.id_property().is_some());
    }

    #[test]
    fn test_serialize_round_trip() {
        let schema: FeatureSchema = serde_yaml::from_str(SCHEMA).unwrap();
        let yaml = serde_yaml::to_string(&schema).unwrap();
        let back: FeatureSchema = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(schema, back);
    }
}
