use super::handle::Entity;
use super::object::PermanentObject;
use crate::config::PersistContext;
use crate::core::{Result, Row, Value, sql_datetime};
use crate::schema::EntitySchema;
use crate::validation::{
    DEFAULT_SEVERITY, FieldValidator, SchemaRuleValidator, UserError, Validation, ValidationRequest,
};
use std::fmt;
use std::sync::Arc;

/// What a post-save hook is told about.
pub enum SavedTarget<'a> {
    /// A row was inserted under this identifier.
    Created(&'a Value),
    Updated(&'a Entity),
    Deleted(&'a Entity),
    /// Pending changes were written while the last handle was dropped.
    Released(&'a PermanentObject),
}

/// Schema and runtime context handed to every hook.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    pub schema: &'a EntitySchema,
    pub context: &'a PersistContext,
}

impl HookContext<'_> {
    pub fn domain(&self) -> &str {
        self.schema.domain()
    }

    pub fn fill_log_event(&self, row: &mut Row, event: &str) {
        fill_log_event(self.schema, self.context, row, event);
    }
}

/// Fills the audit fields of `event` into `row`.
///
/// `{event}_time` (unix seconds) is preferred, then `{event}_date` which is
/// kept when already present. Without either field nothing is filled.
/// Otherwise `{event}_ip`, `{event}_agent` and `{event}_referer` follow
/// when declared.
pub fn fill_log_event(schema: &EntitySchema, context: &PersistContext, row: &mut Row, event: &str) {
    let time_field = format!("{}_time", event);
    let date_field = format!("{}_date", event);
    if schema.has_field(&time_field) {
        row.insert(time_field, Value::Integer(context.now().timestamp()));
    } else if schema.has_field(&date_field) {
        row.entry(date_field)
            .or_insert_with(|| Value::Text(sql_datetime(context.now())));
    } else {
        return;
    }

    let ip_field = format!("{}_ip", event);
    if schema.has_field(&ip_field) {
        row.insert(ip_field, Value::from(context.client_ip()));
    }
    let agent_field = format!("{}_agent", event);
    if schema.has_field(&agent_field) {
        row.insert(agent_field, Value::from(context.request.user_agent.clone()));
    }
    let referer_field = format!("{}_referer", event);
    if schema.has_field(&referer_field) {
        row.insert(referer_field, Value::from(context.request.referer.clone()));
    }
}

/// Class-level callbacks around validation and persistence.
///
/// Every method has the behaviour of a plain entity class; implementors
/// override only what their class customises.
pub trait EntityHooks: Send + Sync {
    /// Extra consistency check, run on construction in strict mode.
    fn check_integrity(&self, _object: &PermanentObject) -> Result<()> {
        Ok(())
    }

    /// Converts a value fetched from storage before it is stored in the object.
    fn parse_field_value(&self, _field: &str, value: Value) -> Value {
        value
    }

    /// Decides whether a validated create payload may be inserted.
    fn on_valid_create(&self, hooks: HookContext<'_>, input: &mut Row, validation: &mut Validation) -> bool {
        if validation.has_errors() {
            validation.add_error("errorCreateChecking", Some(hooks.domain()), DEFAULT_SEVERITY);
            return false;
        }
        let events = hooks.schema.events();
        hooks.fill_log_event(input, &events.create);
        hooks.fill_log_event(input, &events.edit);
        true
    }

    /// Decides whether a validated update payload may be applied.
    ///
    /// Refuses when no declared field survived validation, before any audit
    /// field is added.
    fn on_valid_update(&self, hooks: HookContext<'_>, input: &mut Row, _validation: &Validation) -> bool {
        if !input.keys().any(|field| hooks.schema.has_field(field)) {
            return false;
        }
        let events = hooks.schema.events();
        hooks.fill_log_event(input, &events.edit);
        hooks.fill_log_event(input, &events.update);
        true
    }

    /// Last chance to adjust a payload right before it is written.
    fn on_edit(&self, _hooks: HookContext<'_>, _data: &mut Row, _object: Option<&PermanentObject>) {}

    /// Cross-field checks on validated input.
    fn check_for_object(
        &self,
        _hooks: HookContext<'_>,
        _data: &Row,
        _reference: Option<&PermanentObject>,
    ) -> std::result::Result<(), UserError> {
        Ok(())
    }

    fn on_saved(&self, _hooks: HookContext<'_>, _data: &Row, _target: SavedTarget<'_>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl EntityHooks for DefaultHooks {}

/// An entity class: schema, hooks and field validator.
#[derive(Clone)]
pub struct EntityClass {
    schema: Arc<EntitySchema>,
    hooks: Arc<dyn EntityHooks>,
    validator: Arc<dyn FieldValidator>,
}

impl EntityClass {
    pub fn new(schema: EntitySchema) -> Self {
        Self::from_schema(Arc::new(schema))
    }

    pub fn from_schema(schema: Arc<EntitySchema>) -> Self {
        Self {
            schema,
            hooks: Arc::new(DefaultHooks),
            validator: Arc::new(SchemaRuleValidator),
        }
    }

    pub fn with_hooks(mut self, hooks: impl EntityHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_validator(mut self, validator: impl FieldValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn name(&self) -> &str {
        self.schema.class_name()
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn hooks(&self) -> &dyn EntityHooks {
        self.hooks.as_ref()
    }

    pub fn validator(&self) -> &dyn FieldValidator {
        self.validator.as_ref()
    }

    pub fn hook_context<'a>(&'a self, context: &'a PersistContext) -> HookContext<'a> {
        HookContext {
            schema: &self.schema,
            context,
        }
    }

    /// Builds the in-memory object for a full row fetched from storage.
    pub fn construct(&self, row: Row, context: &PersistContext) -> Result<PermanentObject> {
        let row = row
            .into_iter()
            .map(|(field, value)| {
                let value = self.hooks.parse_field_value(&field, value);
                (field, value)
            })
            .collect();
        let object = PermanentObject::from_row(
            Arc::clone(&self.schema),
            row,
            context.config.check_field_integrity,
        )?;
        if context.config.strict_mode {
            self.hooks.check_integrity(&object)?;
        }
        Ok(object)
    }

    /// Runs the field validator over untrusted input.
    pub fn check_user_input(
        &self,
        input: &Row,
        fields: Option<&[String]>,
        reference: Option<&PermanentObject>,
        ignore_required: bool,
    ) -> (Row, Validation) {
        self.validator.validate(&ValidationRequest {
            schema: &self.schema,
            input,
            fields,
            reference,
            ignore_required,
        })
    }

    /// [`check_user_input`](Self::check_user_input), then the
    /// `check_for_object` hook when the fields themselves are valid.
    pub fn test_user_input(
        &self,
        context: &PersistContext,
        input: &Row,
        fields: Option<&[String]>,
        reference: Option<&PermanentObject>,
        ignore_required: bool,
    ) -> (Row, Validation) {
        let (data, mut validation) = self.check_user_input(input, fields, reference, ignore_required);
        if validation.is_valid() {
            let hooks = self.hook_context(context);
            if let Err(error) = self.hooks.check_for_object(hooks, &data, reference) {
                validation.add_error(error, Some(hooks.domain()), DEFAULT_SEVERITY);
            }
        }
        (data, validation)
    }

    /// Final payload for a write: `on_edit`, then undeclared fields dropped.
    pub fn prepare_payload(
        &self,
        context: &PersistContext,
        data: &mut Row,
        object: Option<&PermanentObject>,
    ) {
        self.hooks.on_edit(self.hook_context(context), data, object);
        data.retain(|field, _| self.schema.has_field(field));
    }
}

impl fmt::Debug for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityClass")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
