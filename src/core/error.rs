use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Field '{field}' not found in {class}")]
    FieldNotFound { class: String, field: String },

    #[error("The ID field of {class} is not editable")]
    IdNotEditable { class: String },

    #[error("The class {class} is out of date, the field '{field}' is unknown in database")]
    OutOfDateSchema { class: String, field: String },

    #[error("Not found: {message}")]
    NotFound {
        message: String,
        domain: Option<String>,
    },

    #[error("Invalid ID for {class}: {id}")]
    InvalidId { class: String, id: String },

    #[error("{message}")]
    User {
        message: String,
        domain: Option<String>,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Entity class '{0}' is not registered")]
    UnknownClass(String),

    #[error("Adapter instance '{0}' is not registered")]
    UnknownAdapter(String),

    #[error("No storage adapter attached to operation on {class}")]
    NoAdapter { class: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl PersistError {
    pub fn field_not_found(class: &str, field: &str) -> Self {
        Self::FieldNotFound {
            class: class.to_string(),
            field: field.to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>, domain: Option<&str>) -> Self {
        Self::NotFound {
            message: message.into(),
            domain: domain.map(str::to_string),
        }
    }

    /// Returns true for errors caused by calling code or schema drift.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::FieldNotFound { .. }
                | Self::IdNotEditable { .. }
                | Self::OutOfDateSchema { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl<T> From<std::sync::PoisonError<T>> for PersistError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_errors() {
        assert!(PersistError::field_not_found("User", "nope").is_structural());
        assert!(PersistError::IdNotEditable { class: "User".into() }.is_structural());
        assert!(!PersistError::not_found("user", Some("users")).is_structural());
    }

    #[test]
    fn test_error_messages() {
        let err = PersistError::OutOfDateSchema {
            class: "User".into(),
            field: "email".into(),
        };
        assert_eq!(
            err.to_string(),
            "The class User is out of date, the field 'email' is unknown in database"
        );
    }
}
