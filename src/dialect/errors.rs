use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DialectError {
    #[error("{message}")]
    Unsupported { message: String },
    #[error("Invalid temporal value `{value}`")]
    InvalidTemporal { value: String },
}

impl DialectError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        DialectError::Unsupported {
            message: message.into(),
        }
    }
}
