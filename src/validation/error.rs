use crate::core::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A user-facing domain failure, identified by a translatable message key.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct UserError {
    pub message: String,
    pub domain: Option<String>,
}

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// A rule failure scoped to one input field.
///
/// The message key is `{field}_{key}`, e.g. `name_required`; `args` holds
/// the rule arguments used as `{0}`, `{1}`... substitutions when rendered.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{field}_{key}")]
pub struct InvalidField {
    pub key: String,
    pub field: String,
    pub value: Value,
    pub type_name: Option<String>,
    pub domain: Option<String>,
    pub args: Vec<String>,
}

impl InvalidField {
    pub fn new(key: impl Into<String>, field: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
            value,
            type_name: None,
            domain: None,
            args: Vec::new(),
        }
    }

    /// Rescopes a user error raised by a rule to the field it was checking.
    pub fn from_user(error: UserError, field: &str, value: Value) -> Self {
        Self {
            key: error.message,
            field: field.to_string(),
            value,
            type_name: None,
            domain: error.domain,
            args: Vec::new(),
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_args<S: ToString>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args = args.into_iter().map(|arg| arg.to_string()).collect();
        self
    }

    pub fn message(&self) -> String {
        format!("{}_{}", self.field, self.key)
    }
}

/// One accumulated validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    /// Structured data of a field failure, kept for reporting
    pub extra: Option<InvalidField>,
    pub domain: Option<String>,
    pub severity: i32,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, domain: Option<String>, severity: i32) -> Self {
        Self {
            message: message.into(),
            extra: None,
            domain,
            severity,
        }
    }

    pub fn field(&self) -> Option<&str> {
        self.extra.as_ref().map(|extra| extra.field.as_str())
    }

    pub fn args(&self) -> &[String] {
        self.extra
            .as_ref()
            .map(|extra| extra.args.as_slice())
            .unwrap_or(&[])
    }
}
