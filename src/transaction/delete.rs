use super::{OperationKind, RunOutcome, TransactionOperation};
use crate::core::Result;
use crate::entity::{Entity, EntityClass, SavedTarget};
use crate::storage::{DeleteQuery, Filter, SharedAdapter, lock_adapter};
use crate::validation::{DEFAULT_SEVERITY, Validation};
use std::sync::Arc;
use tracing::{debug, warn};

/// Deletes the row of one entity and marks the entity deleted.
pub struct DeleteOperation {
    entity: Entity,
    adapter: SharedAdapter,
    validation: Validation,
    valid: bool,
    applied: bool,
}

impl DeleteOperation {
    pub fn new(entity: Entity) -> Self {
        let adapter = Arc::clone(entity.adapter());
        Self {
            entity,
            adapter,
            validation: Validation::new(),
            valid: false,
            applied: false,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }
}

impl TransactionOperation for DeleteOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Delete
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

    fn validate(&mut self) -> Result<&Validation> {
        let mut validation = Validation::new();
        if self.entity.is_deleted()? {
            let domain = self.entity.schema().domain();
            validation.add_error("objectDeleted", Some(domain), DEFAULT_SEVERITY);
        }
        self.valid = validation.is_valid();
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
        let schema = entity.schema();
        let query = DeleteQuery {
            table: schema.table().to_string(),
            filter: Filter::eq(schema.id_field(), entity.id().clone()),
            limit: Some(1),
        };
        let deleted = lock_adapter(&self.adapter)?.delete(&query);
        let affected = match deleted {
            Ok(affected) => affected,
            Err(err) => {
                warn!(uid = %entity.uid(), error = %err, "Delete failed");
                return Ok(RunOutcome::Failed);
            }
        };
        if affected == 0 {
            return Ok(RunOutcome::Deleted(0));
        }
        self.applied = true;
        entity.mark_deleted()?;
        debug!(uid = %entity.uid(), "Deleted row");

        let class = entity.class();
        let data = entity.all()?;
        class
            .hooks()
            .on_saved(class.hook_context(entity.context()), &data, SavedTarget::Deleted(&entity))?;
        Ok(RunOutcome::Deleted(affected))
    }

    fn after_rollback(&mut self) -> Result<()> {
        if self.applied {
            self.applied = false;
            self.entity.unmark_deleted()?;
            self.entity.reload()?;
        }
        Ok(())
    }
}
