//! A small, consistent validation error type shared across core types and
//! the scheduler's constraint parser.

use std::fmt;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field or path that failed validation.
    pub field: String,
    /// A human-readable description of the failure.
    pub message: String,
    /// The category of failure.
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            kind,
        }
    }

    /// A required field was not provided.
    #[must_use]
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("'{field}' is required but was not provided"),
            field,
            kind: ValidationErrorKind::Required,
        }
    }

    /// The value's format is invalid.
    #[must_use]
    pub fn format(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            kind: ValidationErrorKind::Format,
        }
    }

    /// A collection that must be non-empty was empty.
    #[must_use]
    pub fn empty(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("'{field}' must not be empty"),
            field,
            kind: ValidationErrorKind::Empty,
        }
    }

    /// A business constraint was violated (e.g. a duplicate name).
    #[must_use]
    pub fn constraint(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            kind: ValidationErrorKind::Constraint,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation error for '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// The category of validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// A required field was not provided.
    Required,
    /// The value's format is invalid.
    Format,
    /// A collection that must be non-empty was empty.
    Empty,
    /// A business constraint was violated.
    Constraint,
}
