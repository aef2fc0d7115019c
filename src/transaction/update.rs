use super::{OperationKind, RunOutcome, TransactionOperation};
use crate::core::{Result, Row};
use crate::entity::{Entity, EntityClass, SavedTarget};
use crate::storage::{Filter, SharedAdapter, UpdateQuery, lock_adapter};
use crate::validation::{DEFAULT_SEVERITY, Validation};
use std::sync::Arc;
use tracing::{debug, debug_span, warn};

/// Writes validated input to the row of one entity, then re-reads it.
pub struct UpdateOperation {
    entity: Entity,
    adapter: SharedAdapter,
    input: Row,
    fields: Option<Vec<String>>,
    data: Row,
    validation: Validation,
    valid: bool,
    notify: bool,
    applied: bool,
}

impl UpdateOperation {
    pub fn new(entity: Entity, input: Row, fields: Option<Vec<String>>) -> Self {
        let adapter = Arc::clone(entity.adapter());
        Self {
            entity,
            adapter,
            input,
            fields,
            data: Row::new(),
            validation: Validation::new(),
            valid: false,
            notify: true,
            applied: false,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Payload that was (or will be) written.
    pub fn data(&self) -> &Row {
        &self.data
    }

    /// Writes the input as-is, skipping validation and the `on_saved` hook.
    ///
    /// Used by [`Entity::save`], whose values are already the object's state
    /// and which runs the hook itself.
    pub(crate) fn execute(&mut self) -> Result<RunOutcome> {
        self.data = match &self.fields {
            Some(fields) => crate::core::filter_by_keys(&self.input, fields),
            None => self.input.clone(),
        };
        self.notify = false;
        self.run()
    }
}

impl TransactionOperation for UpdateOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Update
    }

    fn class(&self) -> &Arc<EntityClass> {
        self.entity.class()
    }

    fn adapter(&self) -> Option<&SharedAdapter> {
        Some(&self.adapter)
    }

    fn set_adapter(&mut self, adapter: SharedAdapter) {
        self.adapter = adapter;
    }

    /// Rules only check the fields present in the input, so an update
    /// never has to repeat values it leaves unchanged.
    fn validate(&mut self) -> Result<&Validation> {
        let reference = self.entity.snapshot()?;
        let class = Arc::clone(self.entity.class());
        let context = Arc::clone(self.entity.context());

        let (mut data, mut validation) = class.test_user_input(
            &context,
            &self.input,
            self.fields.as_deref(),
            Some(&reference),
            true,
        );
        if reference.is_deleted() {
            validation.add_error("objectDeleted", Some(class.schema().domain()), DEFAULT_SEVERITY);
        }
        let accepted = class
            .hooks()
            .on_valid_update(class.hook_context(&context), &mut data, &validation);
        self.valid = accepted
            && !reference.is_deleted()
            && (validation.is_valid() || context.config.allow_partial_updates);
        self.data = data;
        self.validation = validation;
        Ok(&self.validation)
    }

    fn validation(&self) -> &Validation {
        &self.validation
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn run(&mut self) -> Result<RunOutcome> {
        let entity = self.entity.clone();
        let class = entity.class();
        let context = entity.context();
        let schema = class.schema();
        let _span = debug_span!("update", uid = %entity.uid()).entered();

        let mut payload = self.data.clone();
        let reference = entity.snapshot()?;
        class.prepare_payload(context, &mut payload, Some(&reference));
        if payload.is_empty() {
            debug!("Nothing to update");
            return Ok(RunOutcome::Updated(0));
        }

        let query = UpdateQuery {
            table: schema.table().to_string(),
            values: payload,
            filter: Filter::eq(schema.id_field(), entity.id().clone()),
            limit: Some(1),
        };
        let updated = lock_adapter(&self.adapter)?.update(&query);
        let affected = match updated {
            Ok(affected) => affected,
            Err(err) => {
                warn!(uid = %entity.uid(), error = %err, "Update failed");
                return Ok(RunOutcome::Failed);
            }
        };
        if affected == 0 {
            return Ok(RunOutcome::Updated(0));
        }
        self.applied = true;
        self.data = query.values;
        entity.reload()?;

        if self.notify {
            class
                .hooks()
                .on_saved(class.hook_context(context), &self.data, SavedTarget::Updated(&entity))?;
        }
        Ok(RunOutcome::Updated(affected))
    }

    fn after_rollback(&mut self) -> Result<()> {
        if self.applied {
            self.applied = false;
            self.entity.reload()?;
        }
        Ok(())
    }
}
