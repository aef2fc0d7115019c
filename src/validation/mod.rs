pub mod error;
pub mod report;
pub mod translate;
pub mod validator;

pub use error::{InvalidField, UserError, ValidationError};
pub use translate::{CatalogTranslator, KeyTranslator, Translator};
pub use report::{DEFAULT_SEVERITY, Validation, ValidationIssue, ValidationReport};
pub use validator::{
    FieldRule, FieldValidator, RuleContext, RuleError, SchemaRuleValidator, ValidationRequest, rules,
};
