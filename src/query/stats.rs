use std::sync::Arc;

use super::alias::Aliases;
use super::errors::QueryError;
use super::join::join_clauses;
use crate::dialect::SqlDialect;
use crate::schema::{ColumnSql, SchemaSql};

/// Aggregate statistics queries of a feature type
#[derive(Debug, Clone)]
pub struct StatsQueries {
    dialect: Arc<dyn SqlDialect>,
}

impl StatsQueries {
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        StatsQueries { dialect }
    }

    pub fn count(&self, root: &SchemaSql) -> String {
        format!("SELECT count(*) FROM {}", root.name())
    }

    /// One row with the dialect specific extent text of `column`
    pub fn spatial_extent(
        &self,
        root: &SchemaSql,
        node: &SchemaSql,
        column: &ColumnSql,
        is_3d: bool,
    ) -> Result<String, QueryError> {
        let (from, alias) = self.from(root, node)?;
        Ok(format!(
            "SELECT {} FROM {}",
            self.dialect
                .apply_to_extent(&format!("{}.{}", alias, column.name), is_3d),
            from
        ))
    }

    /// One row with the minimum start and the maximum end; an open interval
    /// end is replaced with the dialect sentinel so it wins over real instants
    pub fn temporal_extent(
        &self,
        root: &SchemaSql,
        node: &SchemaSql,
        start: &ColumnSql,
        end: Option<&ColumnSql>,
    ) -> Result<String, QueryError> {
        let (from, alias) = self.from(root, node)?;
        let dialect = self.dialect.as_ref();

        let maximum = match end {
            Some(end) => format!(
                "MAX(COALESCE({}.{}, {}))",
                alias,
                end.name,
                dialect.apply_to_datetime_literal(dialect.apply_to_instant_max())
            ),
            None => format!("MAX({}.{})", alias, start.name),
        };

        Ok(format!(
            "SELECT MIN({}.{}) AS minimum, {} AS maximum FROM {}",
            alias, start.name, maximum, from
        ))
    }

    fn from(&self, root: &SchemaSql, node: &SchemaSql) -> Result<(String, String), QueryError> {
        let aliases = Aliases::for_relations(&node.relations, "");
        let mut from = format!("{} {}", root.name(), aliases.root());
        for join in join_clauses(&node.relations, &aliases, self.dialect.as_ref())? {
            from.push(' ');
            from.push_str(&join);
        }
        Ok((from, aliases.target().to_string()))
    }
}
