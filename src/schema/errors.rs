//! Errors raised while deriving relational schemas from feature schemas.
//!
//! All of them are configuration errors except `UnsupportedQueryable`,
//! which is raised at query time and reported to the caller.

use thiserror::Error;

use crate::sql_path::PathParseError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("Property `{property}` has no sourcePath")]
    MissingSourcePath { property: String },
    #[error(transparent)]
    InvalidPath(#[from] PathParseError),
    #[error("Feature type `{type_name}` must have a sourcePath with a single root table, found `{path}`")]
    InvalidRoot { type_name: String, path: String },
    #[error("Property `{property}`: {message}")]
    InvalidProperty { property: String, message: String },
    #[error("Feature type `{type_name}` has no property with role ID")]
    MissingId { type_name: String },
    #[error("{message}")]
    UnsupportedQueryable { message: String },
    #[error("Unknown queryable `{name}`")]
    UnknownQueryable { name: String },
    #[error("Feature type `{type_name}` has no receivable properties")]
    EmptyMutationSchema { type_name: String },
}

impl SchemaError {
    pub fn invalid_property(property: impl Into<String>, message: impl Into<String>) -> Self {
        SchemaError::InvalidProperty {
            property: property.into(),
            message: message.into(),
        }
    }
}
