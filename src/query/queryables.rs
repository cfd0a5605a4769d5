use std::sync::Arc;

use super::join;
use crate::config::Dialect;
use crate::dialect::{JsonValueInfo, SqlDialect};
use crate::filter::{FilterError, PropertyResolver, ResolvedProperty};
use crate::schema::{ColumnSource, Container, SchemaSql, SchemaType};

/// Resolves queryable property paths of one feature type to SQL.
///
/// Properties of the root table become `A.column`, properties of joined
/// tables a correlated subquery on the root table.
#[derive(Debug, Clone)]
pub struct Queryables {
    root: SchemaSql,
    dialect: Arc<dyn SqlDialect>,
}

impl Queryables {
    pub fn new(root: SchemaSql, dialect: Arc<dyn SqlDialect>) -> Self {
        Queryables { root, dialect }
    }

    pub fn names(&self) -> Vec<String> {
        self.root
            .nodes()
            .into_iter()
            .flat_map(|node| node.columns.iter().map(|column| column.dotted_path()))
            .collect()
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }
}

impl PropertyResolver for Queryables {
    fn resolve(&self, property: &str) -> Result<ResolvedProperty, FilterError> {
        let (node, column) =
            self.root
                .find_column(property)
                .ok_or_else(|| FilterError::UnknownProperty {
                    name: property.to_string(),
                })?;

        let in_array = column.schema_type.is_array()
            || matches!(node.container, Container::ValueArray(_) | Container::ObjectArray(_));
        if in_array && !column.is_connected() && self.dialect.dialect() == Dialect::Gpkg {
            return Err(FilterError::unsupported(
                property,
                "array queryables are not supported by GeoPackage",
            ));
        }

        let (alias, subquery) = if node.is_root() {
            ("A".to_string(), None)
        } else {
            let (subquery, aliases) = join::subquery(&node.relations, "A", self.dialect.as_ref())
                .map_err(|e| FilterError::unsupported(property, e.to_string()))?;
            (aliases.target().to_string(), Some(subquery))
        };

        let expression = match &column.source {
            ColumnSource::Constant(value) if column.schema_type == SchemaType::String => {
                format!("'{}'", self.dialect.escape_string(value))
            }
            ColumnSource::Constant(value) => value.clone(),
            ColumnSource::Connected { path, .. } => {
                let info = JsonValueInfo {
                    schema_type: column.schema_type,
                    value_type: column.value_type,
                    in_array,
                };
                self.dialect
                    .apply_to_json_value(&alias, &column.name, path.as_deref(), &info)
                    .map_err(|e| FilterError::unsupported(property, e.to_string()))?
            }
            ColumnSource::Column => format!("{}.{}", alias, column.name),
        };

        Ok(ResolvedProperty {
            expression,
            subquery,
        })
    }
}
