use thiserror::Error;

use crate::connector::SqlError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecoderError {
    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error("Column `{column}` does not contain valid JSON: {message}")]
    InvalidJson { column: String, message: String },
}
