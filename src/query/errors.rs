use thiserror::Error;

use crate::dialect::DialectError;
use crate::filter::FilterError;
use crate::schema::SchemaError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("Table `{table}` has no sort key")]
    MissingSortKey { table: String },
    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Dialect(#[from] DialectError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Feature type `{type_name}` has no id column")]
    MissingId { type_name: String },
    #[error("No relation leads from `{table}` to a joined table")]
    NoRelation { table: String },
    #[error("Column `{column}` is not part of table `{table}`")]
    UnknownColumn { table: String, column: String },
}
