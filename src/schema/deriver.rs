use log::debug;

use super::errors::SchemaError;
use super::feature_schema::{FeatureSchema, SchemaKind, SchemaType};
use super::normalize::ConstantNormalizer;
use super::schema_sql::{ColumnSource, ColumnSql, Container, SchemaSql};
use crate::sql_path::{SqlPath, SqlPathParser};

/// Per pass state, never shared between derivations
#[derive(Debug, Default)]
struct DeriveState {
    coalesce_groups: usize,
}

impl DeriveState {
    fn next_coalesce_group(&mut self) -> usize {
        let group = self.coalesce_groups;
        self.coalesce_groups += 1;
        group
    }
}

/// Derives the relational schema forest of a feature type
pub struct SchemaDeriver<'a> {
    parser: &'a SqlPathParser,
}

impl<'a> SchemaDeriver<'a> {
    pub fn new(parser: &'a SqlPathParser) -> Self {
        SchemaDeriver { parser }
    }

    pub fn derive(&self, schema: &FeatureSchema) -> Result<Vec<SchemaSql>, SchemaError> {
        let schema = ConstantNormalizer::new().normalize(schema);

        let source_path =
            schema
                .source_path
                .as_deref()
                .ok_or_else(|| SchemaError::MissingSourcePath {
                    property: schema.name.clone(),
                })?;

        let segment = self.parser.parse_table_path(source_path)?;
        if !segment.is_root() || !segment.parent_tables.is_empty() {
            return Err(SchemaError::InvalidRoot {
                type_name: schema.name.clone(),
                path: source_path.to_string(),
            });
        }

        let mut root = SchemaSql::root(segment);
        let mut state = DeriveState::default();
        for property in &schema.properties {
            self.visit(&mut root, property, &[], None, &mut state)?;
        }

        debug!(
            "Derived {} table(s) for feature type {}: {:?}",
            root.nodes().len(),
            schema.name,
            root.nodes().iter().map(|node| node.path.as_str()).collect::<Vec<_>>()
        );

        Ok(vec![root])
    }

    fn visit(
        &self,
        node: &mut SchemaSql,
        property: &FeatureSchema,
        prefix: &[String],
        coalesce_group: Option<usize>,
        state: &mut DeriveState,
    ) -> Result<(), SchemaError> {
        let mut path = prefix.to_vec();
        path.push(property.name.clone());

        match property.kind() {
            SchemaKind::InlineObject => {
                for child in &property.properties {
                    self.visit(node, child, &path, None, state)?;
                }
            }
            SchemaKind::Object | SchemaKind::ObjectArray => {
                let source_path = source_path_of(property)?;

                if is_connected(source_path) {
                    return self.visit_value(node, property, source_path, path, coalesce_group);
                }

                let table = self.parser.parse_table_path(source_path)?;
                if !table.is_branch() {
                    return Err(SchemaError::invalid_property(
                        path.join("."),
                        "object properties need a joined table path",
                    ));
                }
                let relations = self.parser.extract_relations(&node.segment, &table)?;
                let container = if property.schema_type == SchemaType::ObjectArray {
                    Container::ObjectArray(path.clone())
                } else {
                    Container::Object(path.clone())
                };

                let child = node.child_for(relations, &table, container);
                for grandchild in &property.properties {
                    self.visit(child, grandchild, &path, None, state)?;
                }
            }
            SchemaKind::Value | SchemaKind::ValueArray => {
                let source_path = source_path_of(property)?;
                self.visit_value(node, property, source_path, path, coalesce_group)?;
            }
            SchemaKind::Constant => {
                return Err(SchemaError::invalid_property(
                    path.join("."),
                    "constant without a column path",
                ));
            }
            SchemaKind::Concat => {
                for alternative in &property.concat {
                    let alternative = inherit(property, alternative);
                    self.visit(node, &alternative, prefix, coalesce_group, state)?;
                }
            }
            SchemaKind::Coalesce => {
                let group = state.next_coalesce_group();
                for alternative in &property.coalesce {
                    let alternative = inherit(property, alternative);
                    self.visit(node, &alternative, prefix, Some(group), state)?;
                }
            }
        }

        Ok(())
    }

    fn visit_value(
        &self,
        node: &mut SchemaSql,
        property: &FeatureSchema,
        source_path: &str,
        path: Vec<String>,
        coalesce_group: Option<usize>,
    ) -> Result<(), SchemaError> {
        let leaf = self.parser.parse_column_path(source_path)?;
        let relations = self.parser.extract_relations(&node.segment, &leaf)?;

        let target = match leaf.parent_tables.last() {
            Some(table) if !relations.is_empty() => {
                let container = if property.schema_type == SchemaType::ValueArray {
                    Container::ValueArray(path.clone())
                } else {
                    Container::Inline
                };
                node.child_for(relations, table, container)
            }
            _ => node,
        };

        let schema_type = match target.container {
            Container::ValueArray(_) if !leaf.is_connected() => property.effective_value_type(),
            _ => property.schema_type,
        };

        for column_name in column_names(&leaf) {
            let mut column = column_for(property, column_name, path.clone());
            column.schema_type = schema_type;
            column.coalesce_group = coalesce_group;
            column.source = source_of(&leaf);
            target.columns.push(column);
        }

        Ok(())
    }
}

fn source_path_of(property: &FeatureSchema) -> Result<&str, SchemaError> {
    property
        .source_path
        .as_deref()
        .ok_or_else(|| SchemaError::MissingSourcePath {
            property: property.name.clone(),
        })
}

/// `[JSON]doc/a` reads from a column, `[id=fk]table` joins a table
fn is_connected(source_path: &str) -> bool {
    source_path
        .strip_prefix('[')
        .and_then(|rest| rest.split(']').next())
        .map(|inside| !inside.contains('='))
        .unwrap_or(false)
}

fn column_names(leaf: &SqlPath) -> Vec<String> {
    if leaf.columns.is_empty() {
        vec![leaf.name.clone()]
    } else {
        leaf.columns.clone()
    }
}

fn source_of(leaf: &SqlPath) -> ColumnSource {
    if let Some(constant) = &leaf.constant_value {
        return ColumnSource::Constant(unquote(constant));
    }
    match &leaf.connector {
        Some(connector) => ColumnSource::Connected {
            connector: connector.clone(),
            path: leaf.path_in_connector.clone(),
        },
        None => ColumnSource::Column,
    }
}

/// `'it''s'` -> `it's`, bare literals stay as they are
fn unquote(literal: &str) -> String {
    literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .map(|inner| inner.replace("''", "'"))
        .unwrap_or_else(|| literal.to_string())
}

fn column_for(property: &FeatureSchema, name: String, path: Vec<String>) -> ColumnSql {
    let mut column = ColumnSql::new(name, path, property.schema_type);
    column.value_type = property.value_type;
    column.role = property.role;
    column.force_polygon_ccw = property.force_polygon_ccw;
    column.linearize_curves = property.linearize_curves;
    column.format = property.format.clone();
    column
}

/// Alternatives of concat and coalesce take name, type and role of their
/// property unless they declare properties of their own
fn inherit(property: &FeatureSchema, alternative: &FeatureSchema) -> FeatureSchema {
    let mut inherited = alternative.clone();
    inherited.name = property.name.clone();
    if alternative.properties.is_empty() || property.schema_type.is_object() {
        inherited.schema_type = property.schema_type;
    }
    inherited.value_type = alternative.value_type.or(property.value_type);
    inherited.role = alternative.role.or(property.role);
    inherited
}
