use super::error::{InvalidField, UserError, ValidationError};
use super::translate::Translator;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SEVERITY: i32 = 1;

/// Anything that can be recorded as a validation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    Message(String),
    User(UserError),
    Field(InvalidField),
}

impl From<&str> for ValidationIssue {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<String> for ValidationIssue {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<UserError> for ValidationIssue {
    fn from(error: UserError) -> Self {
        Self::User(error)
    }
}

impl From<InvalidField> for ValidationIssue {
    fn from(error: InvalidField) -> Self {
        Self::Field(error)
    }
}

/// Rendered form of a [`ValidationError`], ready to hand to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub code: String,
    pub report: String,
    pub domain: Option<String>,
    pub severity: i32,
}

/// Accumulates validation failures; valid iff no error was recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    errors: Vec<ValidationError>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_validation_error(&mut self, error: ValidationError) -> &mut Self {
        self.errors.push(error);
        self
    }

    /// Records an issue. An explicit `domain` wins over the one the issue carries.
    pub fn add_error(
        &mut self,
        issue: impl Into<ValidationIssue>,
        domain: Option<&str>,
        severity: i32,
    ) -> &mut Self {
        let domain = domain.map(str::to_string);
        let error = match issue.into() {
            ValidationIssue::Message(message) => ValidationError::new(message, domain, severity),
            ValidationIssue::User(user) => {
                ValidationError::new(user.message, domain.or(user.domain), severity)
            }
            ValidationIssue::Field(field) => {
                let domain = domain.or_else(|| field.domain.clone());
                ValidationError {
                    message: field.message(),
                    extra: Some(field),
                    domain,
                    severity,
                }
            }
        };
        self.add_validation_error(error)
    }

    pub fn merge(&mut self, other: Validation) -> &mut Self {
        self.errors.extend(other.errors);
        self
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// Errors raised for `field`, in recording order.
    pub fn field_errors<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.errors
            .iter()
            .filter(move |error| error.field() == Some(field))
    }

    pub fn reports(&self, translator: &dyn Translator) -> Vec<ValidationReport> {
        self.errors
            .iter()
            .map(|error| ValidationReport {
                code: error.message.clone(),
                report: translator.translate(&error.message, error.domain.as_deref(), error.args()),
                domain: error.domain.clone(),
                severity: error.severity,
            })
            .collect()
    }
}
