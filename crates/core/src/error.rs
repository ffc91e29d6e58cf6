//! Compiler error model.

use thiserror::Error;

/// Result type used by filter compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// A malformed policy detected while compiling a filter.
///
/// Every variant is surfaced to the caller and aborts the whole evaluation.
/// A filter naming a field the target schema does not have is *not* an error:
/// the compiler returns no fragment and the filter is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The literal could not be parsed into the field's semantic type.
    #[error("cannot coerce '{value}' into {expected} for field '{field}'")]
    Coercion {
        field: String,
        value: String,
        expected: String,
    },

    /// The operator is not defined for the field's type.
    #[error("operator '{operator}' is not supported on {field_type} field '{field}'")]
    UnsupportedOperator {
        field: String,
        operator: String,
        field_type: String,
    },

    /// The operator's argument has the wrong shape (arity, target type).
    #[error("invalid argument: {0}")]
    Argument(String),

    /// `Extended(name)` referenced a function that was never registered.
    #[error("unknown extension function '{0}'")]
    UnknownExtension(String),
}

impl CompileError {
    pub fn coercion(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::Coercion {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn unsupported(
        field: impl Into<String>,
        operator: impl core::fmt::Display,
        field_type: impl core::fmt::Display,
    ) -> Self {
        Self::UnsupportedOperator {
            field: field.into(),
            operator: operator.to_string(),
            field_type: field_type.to_string(),
        }
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }
}
