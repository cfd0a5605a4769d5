use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterError {
    #[error("Filter parse error in `{input}`: {message}")]
    Parse { input: String, message: String },
    #[error("Unexpected trailing content in filter: '{rest}'")]
    TrailingInput { rest: String },
    #[error("`{name}` is not supported in filters: {reason}")]
    Unsupported { name: String, reason: String },
    #[error("Filter references unknown property '{name}'")]
    UnknownProperty { name: String },
}

impl FilterError {
    pub fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        FilterError::Unsupported {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
