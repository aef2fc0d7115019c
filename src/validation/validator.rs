use super::error::{InvalidField, UserError};
use super::report::{DEFAULT_SEVERITY, Validation};
use crate::core::{Row, Value};
use crate::entity::PermanentObject;
use crate::schema::EntitySchema;
use std::sync::Arc;

/// Why a field rule refused its input.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    User(UserError),
    Field(InvalidField),
}

impl From<UserError> for RuleError {
    fn from(error: UserError) -> Self {
        Self::User(error)
    }
}

impl From<InvalidField> for RuleError {
    fn from(error: InvalidField) -> Self {
        Self::Field(error)
    }
}

/// What a field rule sees while checking one field.
pub struct RuleContext<'a> {
    pub field: &'a str,
    pub input: &'a Row,
    /// The entity being updated; `None` on create.
    pub reference: Option<&'a PermanentObject>,
    pub ignore_required: bool,
}

impl RuleContext<'_> {
    /// Raw input for the checked field.
    pub fn value(&self) -> Option<&Value> {
        self.input.get(self.field)
    }

    pub fn invalid(&self, key: &str) -> InvalidField {
        InvalidField::new(key, self.field, self.value().cloned().unwrap_or_default())
    }
}

/// Checks one field and returns the value to store.
pub type FieldRule = Arc<dyn Fn(&RuleContext<'_>) -> Result<Value, RuleError> + Send + Sync>;

pub struct ValidationRequest<'a> {
    pub schema: &'a EntitySchema,
    pub input: &'a Row,
    /// Fields to check; `None` uses the editable fields of the schema.
    pub fields: Option<&'a [String]>,
    pub reference: Option<&'a PermanentObject>,
    pub ignore_required: bool,
}

/// Turns untrusted input into a validated payload.
///
/// Failures are accumulated in the returned [`Validation`]; one bad field
/// never prevents the others from being checked.
pub trait FieldValidator: Send + Sync {
    fn validate(&self, request: &ValidationRequest<'_>) -> (Row, Validation);
}

/// Applies the per-field rules declared on the schema.
///
/// A field without a rule takes the raw input value. On update, a value
/// equal to the reference entity's current one is left out of the payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaRuleValidator;

impl FieldValidator for SchemaRuleValidator {
    fn validate(&self, request: &ValidationRequest<'_>) -> (Row, Validation) {
        let schema = request.schema;
        let mut data = Row::new();
        let mut validation = Validation::new();

        let fields = match request.fields.or(schema.editable_fields()) {
            Some(fields) if !fields.is_empty() => fields,
            _ => return (data, validation),
        };

        for field in fields {
            if field == schema.id_field() {
                continue;
            }
            let present = request.input.contains_key(field);

            let value = match schema.rule(field) {
                Some(_) if request.ignore_required && !present => continue,
                Some(rule) => {
                    let context = RuleContext {
                        field,
                        input: request.input,
                        reference: request.reference,
                        ignore_required: request.ignore_required,
                    };
                    match rule(&context) {
                        Ok(value) => value,
                        Err(error) => {
                            let raw = request.input.get(field).cloned().unwrap_or_default();
                            let mut invalid = match error {
                                RuleError::User(user) => InvalidField::from_user(user, field, raw),
                                RuleError::Field(invalid) => invalid,
                            };
                            if invalid.domain.is_none() {
                                invalid.domain = Some(schema.domain().to_string());
                            }
                            validation.add_error(invalid, None, DEFAULT_SEVERITY);
                            continue;
                        }
                    }
                }
                None => match request.input.get(field) {
                    Some(value) => value.clone(),
                    None => continue,
                },
            };

            let unchanged = request
                .reference
                .and_then(|reference| reference.get_value(field).ok())
                .is_some_and(|current| *current == value);
            if !unchanged {
                data.insert(field.clone(), value);
            }
        }
        (data, validation)
    }
}

/// Stock field rules.
pub mod rules {
    use super::{FieldRule, RuleContext, RuleError};
    use crate::core::Value;
    use crate::validation::UserError;
    use std::sync::Arc;

    fn required() -> RuleError {
        RuleError::User(UserError::new("required"))
    }

    /// Non-blank text of at most `max_len` characters, trimmed.
    pub fn required_text(max_len: usize) -> FieldRule {
        Arc::new(move |context: &RuleContext<'_>| -> Result<Value, RuleError> {
            let text = context
                .value()
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .ok_or_else(required)?;
            if text.chars().count() > max_len {
                return Err(context.invalid("tooLong").with_args([max_len]).into());
            }
            Ok(Value::Text(text.to_string()))
        })
    }

    /// Integer (or integer text) within `min..=max`.
    pub fn integer_range(min: i64, max: i64) -> FieldRule {
        Arc::new(move |context: &RuleContext<'_>| -> Result<Value, RuleError> {
            let value = context
                .value()
                .filter(|value| !value.is_null())
                .ok_or_else(required)?;
            let number = value
                .as_i64()
                .ok_or_else(|| RuleError::from(context.invalid("notInteger").with_type("INTEGER")))?;
            if number < min || number > max {
                return Err(context.invalid("outOfRange").with_args([min, max]).into());
            }
            Ok(Value::Integer(number))
        })
    }

    /// One of the listed values.
    pub fn one_of(allowed: Vec<Value>) -> FieldRule {
        Arc::new(move |context: &RuleContext<'_>| -> Result<Value, RuleError> {
            let value = context.value().cloned().unwrap_or_default();
            if allowed.contains(&value) {
                Ok(value)
            } else {
                let args: Vec<String> = allowed.iter().map(Value::to_string).collect();
                Err(context.invalid("notAllowed").with_args(args).into())
            }
        })
    }

    /// Null when the input is absent or null, otherwise `rule`.
    pub fn optional(rule: FieldRule) -> FieldRule {
        Arc::new(move |context: &RuleContext<'_>| -> Result<Value, RuleError> {
            match context.value() {
                None | Some(Value::Null) => Ok(Value::Null),
                Some(_) => rule(context),
            }
        })
    }

    /// The raw input, null when absent.
    pub fn passthrough() -> FieldRule {
        Arc::new(|context: &RuleContext<'_>| -> Result<Value, RuleError> {
            Ok(context.value().cloned().unwrap_or_default())
        })
    }
}
