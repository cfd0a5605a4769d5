use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PathParseError {
    #[error("Invalid sourcePath in provider configuration: {path}")]
    InvalidSourcePath { path: String },
    #[error("Invalid sourcePath connector in provider configuration: {path}")]
    UnknownConnector { path: String },
    #[error("Invalid flag `{flag}` in sourcePath {path}: {message}")]
    InvalidFlag {
        flag: String,
        path: String,
        message: String,
    },
    #[error("Adjacent junction tables are not supported: {tables}")]
    UnsupportedJunctionChain { tables: String },
    #[error("Invalid junction table pattern `{pattern}`: {message}")]
    InvalidJunctionPattern { pattern: String, message: String },
    #[error("Missing join clause for table `{table}`")]
    MissingJoin { table: String },
}

impl PathParseError {
    pub fn invalid(path: impl Into<String>) -> Self {
        PathParseError::InvalidSourcePath { path: path.into() }
    }

    pub fn invalid_flag(
        flag: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PathParseError::InvalidFlag {
            flag: flag.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}
