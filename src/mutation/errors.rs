use thiserror::Error;

use crate::connector::SqlError;

/// Everything that makes a mutation fail, reported in the [`MutationResult`](super::MutationResult)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MutationError {
    #[error("{0}")]
    Sql(#[from] SqlError),

    #[error("Invalid feature input: {message}")]
    Input { message: String },

    #[error("No property with role ID found for '{table}'.")]
    MissingId { table: String },

    #[error("Mutation of `{table}` is not supported: {reason}")]
    Unsupported { table: String, reason: String },
}

impl MutationError {
    pub fn unsupported(table: impl Into<String>, reason: impl Into<String>) -> Self {
        MutationError::Unsupported {
            table: table.into(),
            reason: reason.into(),
        }
    }
}
