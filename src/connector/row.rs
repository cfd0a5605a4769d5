use std::cmp::Ordering;
use std::sync::Arc;

use super::errors::SqlError;
use super::value::{compare_keys, SqlValue};
use crate::query::TableQuery;

/// One row of a value query, split into its composite sort key and values
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    pub query: Arc<TableQuery>,
    /// Merge tie-break, unique across all value queries of a batch
    pub priority: usize,
    pub sort_keys: Vec<SqlValue>,
    /// Values of the selected columns, in column order
    pub values: Vec<SqlValue>,
}

impl SqlRow {
    /// Split a raw result row. A null root key is an error, a null key of a
    /// joined table means the outer join found no row and yields `None`.
    pub fn from_values(
        query: &Arc<TableQuery>,
        priority_base: usize,
        mut values: Vec<SqlValue>,
    ) -> Result<Option<SqlRow>, SqlError> {
        let key_count = query.sort_keys.len();
        if values.len() < key_count {
            return Err(SqlError::UnexpectedResult {
                sql: query.path.clone(),
                message: format!("expected at least {} columns, got {}", key_count, values.len()),
            });
        }

        let rest = values.split_off(key_count);
        if let Some(index) = values.iter().position(SqlValue::is_null) {
            if index == 0 {
                return Err(SqlError::NullSortKey {
                    sort_key: query.sort_keys[0].column.clone(),
                    table: query.sort_keys[0].container.clone(),
                });
            }
            return Ok(None);
        }

        Ok(Some(SqlRow {
            query: query.clone(),
            priority: priority_base + query.priority,
            sort_keys: values,
            values: rest,
        }))
    }

    pub fn sort_key_names(&self) -> &[String] {
        &self.query.sort_key_names
    }

    /// Order of the merged stream: sort keys over the common prefix of the
    /// sort key names, then priority. Rows of different feature types share
    /// no prefix, so each type's rows stay together in priority order.
    pub fn compare(&self, other: &SqlRow) -> Ordering {
        let common = if self.query.type_name == other.query.type_name {
            self.sort_key_names()
                .iter()
                .zip(other.sort_key_names())
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            0
        };

        compare_keys(&self.sort_keys, &other.sort_keys, common)
            .then(self.priority.cmp(&other.priority))
    }
}

/// Aggregate bounds and counts of one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRowMeta {
    pub min_key: SqlValue,
    pub max_key: SqlValue,
    pub number_returned: i64,
    /// `-1` when not computed
    pub number_matched: i64,
    /// `-1` when not computed
    pub number_skipped: i64,
}

impl SqlRowMeta {
    pub fn empty() -> Self {
        SqlRowMeta {
            min_key: SqlValue::Null,
            max_key: SqlValue::Null,
            number_returned: 0,
            number_matched: -1,
            number_skipped: -1,
        }
    }

    /// From a meta query row `minKey, maxKey, numberReturned, numberMatched, numberSkipped`
    pub fn from_values(values: &[SqlValue]) -> Result<Self, SqlError> {
        let [min_key, max_key, returned, matched, skipped, ..] = values else {
            return Err(SqlError::UnexpectedResult {
                sql: "meta query".to_string(),
                message: format!("expected 5 columns, got {}", values.len()),
            });
        };

        Ok(SqlRowMeta {
            min_key: min_key.clone(),
            max_key: max_key.clone(),
            number_returned: returned.as_i64().unwrap_or(0),
            number_matched: matched.as_i64().unwrap_or(-1),
            number_skipped: skipped.as_i64().unwrap_or(-1),
        })
    }

    /// Combine the meta rows of several feature types queried together
    pub fn combine(self, other: &SqlRowMeta) -> SqlRowMeta {
        fn sum(a: i64, b: i64) -> i64 {
            if a < 0 || b < 0 {
                -1
            } else {
                a + b
            }
        }

        let (min_key, max_key) = if self.number_returned > 0 {
            (self.min_key, self.max_key)
        } else {
            (other.min_key.clone(), other.max_key.clone())
        };

        SqlRowMeta {
            min_key,
            max_key,
            number_returned: self.number_returned + other.number_returned,
            number_matched: sum(self.number_matched, other.number_matched),
            number_skipped: sum(self.number_skipped, other.number_skipped),
        }
    }
}

/// Item of a source stream, each chunk starts with its meta row
#[derive(Debug, Clone, PartialEq)]
pub enum SqlRecord {
    Meta(SqlRowMeta),
    Row(SqlRow),
}
