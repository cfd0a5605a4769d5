//! Source path syntax
//!
//! Parses the declarative `sourcePath` strings of a provider configuration
//! into [`SqlPath`] segments and derives typed [`SqlRelation`]s from chains of
//! segments.
//!
//! ```text
//! /kita{sortKey=id}                          root table
//! [oid=kita_fk]plaetze{filter=anzahl>0}      joined table
//! [id=a_id]a_2_b/[b_id=id]b                  junction chain (M:N)
//! name:alias                                 column leaf
//! [JSON]doc/address/street                   connected column
//! ```

pub mod ast;
pub mod errors;
mod grammar;
pub mod relation;

use std::collections::BTreeSet;

use regex::Regex;

pub use ast::{JoinType, SqlPath};
pub use errors::PathParseError;
pub use relation::{Cardinality, Junction, SqlRelation};

use crate::config::SourcePathDefaults;
use crate::filter::CqlFilter;
use grammar::{RawFlag, RawLeaf, RawTable};

/// Connector that is always available for connected columns
pub const JSON_CONNECTOR: &str = "JSON";

#[derive(Debug, Clone)]
pub struct SqlPathParser {
    defaults: SourcePathDefaults,
    junction_pattern: Option<Regex>,
    connectors: BTreeSet<String>,
}

impl SqlPathParser {
    pub fn new<I, S>(defaults: &SourcePathDefaults, connectors: I) -> Result<Self, PathParseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let junction_pattern = defaults
            .junction_table_pattern
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| PathParseError::InvalidJunctionPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let mut connectors: BTreeSet<String> = connectors.into_iter().map(Into::into).collect();
        connectors.insert(JSON_CONNECTOR.to_string());

        Ok(SqlPathParser {
            defaults: defaults.clone(),
            junction_pattern,
            connectors,
        })
    }

    pub fn defaults(&self) -> &SourcePathDefaults {
        &self.defaults
    }

    /// Parse a table path; the last table becomes the segment, the tables in
    /// front of it its `parent_tables`
    pub fn parse_table_path(&self, path: &str) -> Result<SqlPath, PathParseError> {
        let (rest, raw_tables) =
            grammar::table_path(path).map_err(|_| PathParseError::invalid(path))?;

        if !rest.is_empty() {
            return Err(PathParseError::invalid(path));
        }

        let mut tables = raw_tables
            .into_iter()
            .map(|raw| self.to_table(raw, path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut last = tables.pop().ok_or_else(|| PathParseError::invalid(path))?;
        last.parent_tables = tables;

        Ok(last)
    }

    /// Parse a column path, either `(joined/)*col(:col)*` or a connected
    /// `(joined/)*[connector]col(/segment)*`
    pub fn parse_column_path(&self, path: &str) -> Result<SqlPath, PathParseError> {
        let (rest, (raw_tables, leaf)) =
            grammar::column_path(path).map_err(|_| PathParseError::invalid(path))?;

        if !rest.is_empty() {
            return Err(PathParseError::invalid(path));
        }

        let parent_tables = raw_tables
            .into_iter()
            .map(|raw| self.to_table(raw, path))
            .collect::<Result<Vec<_>, _>>()?;

        match leaf {
            RawLeaf::Columns { columns, flags } => {
                let mut column = SqlPath::table(columns.join(":"), "", "");
                column.columns = columns.into_iter().map(str::to_string).collect();
                column.parent_tables = parent_tables;
                self.apply_flags(&mut column, &flags, path)?;

                Ok(column)
            }
            RawLeaf::Connected {
                connector,
                column,
                flags,
                path_in_connector,
            } => {
                if !self.connectors.contains(connector) {
                    return Err(PathParseError::UnknownConnector {
                        path: path.to_string(),
                    });
                }

                let mut connected =
                    SqlPath::table(column, &self.defaults.sort_key, &self.defaults.primary_key);
                connected.columns = vec![column.to_string()];
                connected.connector = Some(connector.to_string());
                connected.parent_tables = parent_tables;
                if !path_in_connector.is_empty() {
                    connected.path_in_connector = Some(path_in_connector.join("."));
                }
                self.apply_flags(&mut connected, &flags, path)?;

                Ok(connected)
            }
        }
    }

    /// Relations from `parent` through the parent tables of `path` to `path`
    /// itself when it is a joined table
    pub fn extract_relations(
        &self,
        parent: &SqlPath,
        path: &SqlPath,
    ) -> Result<Vec<SqlRelation>, PathParseError> {
        let mut tables: Vec<&SqlPath> = Vec::with_capacity(path.parent_tables.len() + 2);
        tables.push(parent);
        tables.extend(path.parent_tables.iter());
        if path.is_branch() {
            tables.push(path);
        }

        relation::extract(&tables)
    }

    pub fn is_junction_table(&self, table: &str) -> bool {
        self.junction_pattern
            .as_ref()
            .map(|pattern| pattern.is_match(table))
            .unwrap_or(false)
    }

    fn to_table(&self, raw: RawTable<'_>, path: &str) -> Result<SqlPath, PathParseError> {
        let name = match (raw.schema, &self.defaults.schema) {
            (Some(schema), _) => format!("{}.{}", schema, raw.name),
            (None, Some(schema)) => format!("{}.{}", schema, raw.name),
            (None, None) => raw.name.to_string(),
        };

        let mut table = SqlPath::table(name, &self.defaults.sort_key, &self.defaults.primary_key);
        table.join = raw
            .join
            .map(|(source, target)| (source.to_string(), target.to_string()));
        table.junction = self.is_junction_table(&table.name);
        self.apply_flags(&mut table, &raw.flags, path)?;

        Ok(table)
    }

    fn apply_flags(
        &self,
        segment: &mut SqlPath,
        flags: &[RawFlag<'_>],
        path: &str,
    ) -> Result<(), PathParseError> {
        for (key, value) in flags {
            match (*key, *value) {
                ("sortKey", Some(value)) => segment.sort_key = value.to_string(),
                ("primaryKey", Some(value)) => segment.primary_key = value.to_string(),
                ("sortKeyUnique", Some(value)) => {
                    segment.sort_key_unique = value.parse::<bool>().map_err(|_| {
                        PathParseError::invalid_flag(*key, path, "expected true or false")
                    })?;
                }
                ("filter", Some(value)) => {
                    CqlFilter::parse(value)
                        .map_err(|e| PathParseError::invalid_flag(*key, path, e.to_string()))?;
                    segment.filter = Some(value.to_string());
                }
                ("joinType", Some(value)) => {
                    segment.join_type = JoinType::from_flag(value).ok_or_else(|| {
                        PathParseError::invalid_flag(*key, path, "expected INNER, LEFT, RIGHT or FULL")
                    })?;
                }
                ("constant", Some(value)) => segment.constant_value = Some(value.to_string()),
                ("junction", None) => segment.junction = true,
                (key, _) => {
                    return Err(PathParseError::invalid_flag(
                        key,
                        path,
                        "unknown flag or missing value",
                    ));
                }
            }
        }

        Ok(())
    }
}
