use std::fmt;

use thiserror::Error;

/// Native error details attached to a failed query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlDiagnostics {
    pub message: String,
    pub severity: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<u32>,
    /// Offending clause or context
    pub context: Option<String>,
}

impl SqlDiagnostics {
    pub fn new(message: impl Into<String>) -> Self {
        SqlDiagnostics {
            message: message.into(),
            ..Default::default()
        }
    }
}

impl fmt::Display for SqlDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unexpected SQL query error: {}", self.message)?;
        if let Some(severity) = &self.severity {
            write!(f, "\n  Severity: {}", severity)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\n  Detail: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  Hint: {}", hint)?;
        }
        if let Some(position) = &self.position {
            write!(f, "\n  Position: {}", position)?;
        }
        if let Some(context) = &self.context {
            write!(f, "\n  Where: {}", context)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlError {
    #[error("{diagnostics}")]
    Query { diagnostics: SqlDiagnostics },
    #[error("Connection error: {message}")]
    Connection { message: String },
    #[error("Primary sort key {sort_key} of table {table} may not be null.")]
    NullSortKey { sort_key: String, table: String },
    #[error("Unexpected result of query `{sql}`: {message}")]
    UnexpectedResult { sql: String, message: String },
    #[error("Connection pool is closed")]
    Closed,
}

impl SqlError {
    pub fn query(message: impl Into<String>) -> Self {
        SqlError::Query {
            diagnostics: SqlDiagnostics::new(message),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        SqlError::Connection {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_message() {
        let error = SqlError::Query {
            diagnostics: SqlDiagnostics {
                message: "column \"anzahl\" does not exist".into(),
                severity: Some("ERROR".into()),
                hint: Some("Perhaps you meant \"anzahl_gesamt\".".into()),
                position: Some(42),
                ..Default::default()
            },
        };
        assert_eq!(
            error.to_string(),
            "Unexpected SQL query error: column \"anzahl\" does not exist\n  Severity: ERROR\n  Hint: Perhaps you meant \"anzahl_gesamt\".\n  Position: 42"
        );
    }

    #[test]
    fn test_null_sort_key_message() {
        let error = SqlError::NullSortKey {
            sort_key: "id".into(),
            table: "kita".into(),
        };
        assert_eq!(
            error.to_string(),
            "Primary sort key id of table kita may not be null."
        );
    }
}
