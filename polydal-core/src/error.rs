//! Error types for polydal-core.
//!
//! Compiler and parser errors only. Nothing here knows about connections.

use thiserror::Error;

/// Compiler / parser error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DalError {
    #[error("Operator {operator} is not supported by dialect '{dialect}' (operands: {operands})")]
    UnsupportedOperator {
        dialect: String,
        operator: String,
        operands: String,
    },

    #[error("Table name conflict: '{name}' is claimed by two distinct tables")]
    NameConflict { name: String },

    #[error("Not supported by dialect '{dialect}': {operation}")]
    NotSupported { dialect: String, operation: String },

    #[error("Cannot represent {value} as {field_type}{}", field.as_ref().map(|f| format!(" for field '{}'", f)).unwrap_or_default())]
    TypeCoercion {
        value: String,
        field_type: String,
        field: Option<String>,
    },

    #[error("Cannot decode {raw} as {field_type} for column '{column}': {reason}")]
    Decode {
        column: String,
        field_type: String,
        raw: String,
        reason: String,
    },

    #[error("Unknown field '{field}' in table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("Field '{table}.{field}' is not present in this row")]
    MissingField { table: String, field: String },

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type for compiler and parser operations
pub type DalResult<T> = Result<T, DalError>;

impl DalError {
    pub(crate) fn unsupported(dialect: &str, operator: impl std::fmt::Display, operands: &[&str]) -> Self {
        DalError::UnsupportedOperator {
            dialect: dialect.to_string(),
            operator: operator.to_string(),
            operands: operands.join(", "),
        }
    }

    pub(crate) fn not_supported(dialect: &str, operation: impl Into<String>) -> Self {
        DalError::NotSupported {
            dialect: dialect.to_string(),
            operation: operation.into(),
        }
    }

    /// Attach the column a decode failure happened in.
    pub fn in_column(self, column: &str) -> Self {
        match self {
            DalError::Decode {
                field_type,
                raw,
                reason,
                ..
            } => DalError::Decode {
                column: column.to_string(),
                field_type,
                raw,
                reason,
            },
            other => other,
        }
    }
}

impl serde::Serialize for DalError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DalError::unsupported("ref-sql", "REGEXP", &["person.name", "'^a'"]);
        assert_eq!(
            err.to_string(),
            "Operator REGEXP is not supported by dialect 'ref-sql' (operands: person.name, '^a')"
        );

        let err = DalError::NameConflict {
            name: "person".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Table name conflict: 'person' is claimed by two distinct tables"
        );

        let err = DalError::not_supported("mongodb", "FOR UPDATE");
        assert_eq!(err.to_string(), "Not supported by dialect 'mongodb': FOR UPDATE");

        let err = DalError::TypeCoercion {
            value: "'abc'".to_string(),
            field_type: "integer".to_string(),
            field: Some("person.age".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Cannot represent 'abc' as integer for field 'person.age'"
        );

        let err = DalError::MissingField {
            table: "person".to_string(),
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "Field 'person.name' is not present in this row");
    }

    #[test]
    fn test_decode_error_gets_column() {
        let err = DalError::Decode {
            column: String::new(),
            field_type: "date".to_string(),
            raw: "'2024-13-01'".to_string(),
            reason: "month out of range".to_string(),
        }
        .in_column("event.day");

        assert_eq!(
            err.to_string(),
            "Cannot decode '2024-13-01' as date for column 'event.day': month out of range"
        );
    }

    #[test]
    fn test_serializes_as_message() {
        let err = DalError::UnknownDialect("oracle".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!("Unknown dialect: oracle"));
    }
}
