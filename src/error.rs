//! Error types for arcset
//!
//! Every failure of the data engine surfaces as one of these variants. The
//! variants mirror the exception classes of the relational data model, and
//! [`Error::kind`] collapses them into an [`ErrorKind`] so callers can branch
//! on the class of failure without inspecting messages.

use thiserror::Error;

/// The main error type for arcset
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ========== Argument Errors ==========
    #[error("Argument error: '{0}' is required")]
    ArgumentNull(String),

    #[error("Argument error: {0}")]
    Argument(String),

    #[error("Argument error: cannot convert {from} to {to}")]
    TypeMismatch { from: String, to: String },

    #[error("Argument error: column '{0}' does not belong to table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Argument error: cannot find table '{0}'")]
    TableNotFound(String),

    #[error("Argument error: cannot find relation '{0}'")]
    RelationNotFound(String),

    #[error("Argument error: cannot find constraint '{0}'")]
    ConstraintNotFound(String),

    #[error("Index error: index {0} is out of range")]
    IndexOutOfRange(isize),

    #[error("Name error: {0}")]
    DuplicateName(String),

    // ========== Constraint Errors ==========
    #[error("Constraint error: {0}")]
    Constraint(String),

    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("Constraint error: column '{0}' does not allow nulls")]
    NoNullAllowed(String),

    #[error("Constraint error: column '{0}' is read only")]
    ReadOnly(String),

    #[error("Constraint error: table '{0}' doesn't have a primary key")]
    MissingPrimaryKey(String),

    // ========== Row Errors ==========
    #[error("Row error: deleted row information cannot be accessed through the row")]
    DeletedRowInaccessible,

    #[error("Row error: this row has been removed from a table and does not have any data")]
    RowNotInTable,

    #[error("Row error: cannot change a proposed value in the row changing event")]
    InRowChangingEvent,

    #[error("Row error: there is no {0} data to access")]
    VersionNotFound(String),

    // ========== Operation Errors ==========
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ArgumentNull,
    Argument,
    DuplicateName,
    IndexOutOfRange,
    Constraint,
    InvalidConstraint,
    NoNullAllowed,
    ReadOnly,
    MissingPrimaryKey,
    DeletedRowInaccessible,
    RowNotInTable,
    InRowChangingEvent,
    VersionNotFound,
    InvalidOperation,
    Expression,
    Serialization,
}

impl Error {
    /// Get the class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ArgumentNull(_) => ErrorKind::ArgumentNull,
            Error::Argument(_)
            | Error::TypeMismatch { .. }
            | Error::ColumnNotFound(_, _)
            | Error::TableNotFound(_)
            | Error::RelationNotFound(_)
            | Error::ConstraintNotFound(_) => ErrorKind::Argument,
            Error::IndexOutOfRange(_) => ErrorKind::IndexOutOfRange,
            Error::DuplicateName(_) => ErrorKind::DuplicateName,
            Error::Constraint(_) => ErrorKind::Constraint,
            Error::InvalidConstraint(_) => ErrorKind::InvalidConstraint,
            Error::NoNullAllowed(_) => ErrorKind::NoNullAllowed,
            Error::ReadOnly(_) => ErrorKind::ReadOnly,
            Error::MissingPrimaryKey(_) => ErrorKind::MissingPrimaryKey,
            Error::DeletedRowInaccessible => ErrorKind::DeletedRowInaccessible,
            Error::RowNotInTable => ErrorKind::RowNotInTable,
            Error::InRowChangingEvent => ErrorKind::InRowChangingEvent,
            Error::VersionNotFound(_) => ErrorKind::VersionNotFound,
            Error::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Error::Expression(_) => ErrorKind::Expression,
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        Error::Argument(msg.into())
    }

    pub(crate) fn constraint(msg: impl Into<String>) -> Self {
        Error::Constraint(msg.into())
    }

    pub(crate) fn invalid_constraint(msg: impl Into<String>) -> Self {
        Error::InvalidConstraint(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        Error::InvalidOperation(msg.into())
    }
}

/// Result type alias for arcset operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("orders".to_string());
        assert_eq!(err.to_string(), "Argument error: cannot find table 'orders'");

        let err = Error::NoNullAllowed("id".to_string());
        assert_eq!(
            err.to_string(),
            "Constraint error: column 'id' does not allow nulls"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            Error::ColumnNotFound("a".into(), "t".into()).kind(),
            ErrorKind::Argument
        );
        assert_eq!(Error::RowNotInTable.kind(), ErrorKind::RowNotInTable);
        assert_eq!(Error::constraint("dup").kind(), ErrorKind::Constraint);
    }
}
