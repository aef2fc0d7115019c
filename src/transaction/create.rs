use super::{OperationKind, RunOutcome, TransactionOperation};
use crate::config::PersistContext;
use crate::core::{PersistError, Result, Row, Value};
use crate::entity::{EntityClass, SavedTarget};
use crate::storage::{InsertQuery, SharedAdapter, lock_adapter};
use crate::validation::Validation;
use std::sync::Arc;
use tracing::{debug, debug_span, warn};

/// Inserts a new row built from untrusted input.
pub struct CreateOperation {
    class: Arc<EntityClass>,
    context: Arc<PersistContext>,
    adapter: Option<SharedAdapter>,
    input: Row,
    fields: Option<Vec<String>>,
    data: Row,
    validation: Validation,
    valid: bool,
    insert_id: Option<Value>,
}

impl CreateOperation {
    pub fn new(
        class: Arc<EntityClass>,
        context: Arc<PersistContext>,
        input: Row,
        fields: Option<Vec<String>>,
    ) -> Self {
        Self {
            class,
            context,
            adapter: None,
            input,
            fields,
            data: Row::new(),
            validation: Validation::new(),
            valid: false,
            insert_id: None,
        }
    }

    /// Validated payload; empty before [`validate`](TransactionOperation::validate).
    pub fn data(&self) -> &Row {
        &self.data
    }

    pub fn insert_id(&self) -> Option<&Value> {
        self.insert_id.as_ref()
    }
}

impl TransactionOperation for CreateOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Create
    }

    fn class(&self) -> &Arc<EntityClass> {
        &self.class
    }

    fn adapter(&self) -> Option<&SharedAdapter> {
        self.adapter.as_ref()
    }

    fn set_adapter(&mut self, adapter: SharedAdapter) {
        self.adapter = Some(adapter);
    }

    fn validate(&mut self) -> Result<&Validation> {
        let (mut data, mut validation) =
            self.class
                .check_user_input(&self.input, self.fields.as_deref(), None, false);
        let hooks = self.class.hook_context(&self.context);
        self.valid = self
            .class
            .hooks()
            .on_valid_create(hooks, &mut data, &mut validation);
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
        let adapter = self.adapter.as_ref().ok_or_else(|| PersistError::NoAdapter {
            class: self.class.name().to_string(),
        })?;
        let schema = self.class.schema();
        let _span = debug_span!("create", class = %self.class.name()).entered();

        let mut payload = self.data.clone();
        self.class.prepare_payload(&self.context, &mut payload, None);
        let query = InsertQuery {
            table: schema.table().to_string(),
            values: payload,
        };
        let inserted = lock_adapter(adapter)?.insert(&query);
        let id = match inserted {
            Ok(id) => id,
            Err(err) => {
                warn!(class = %self.class.name(), error = %err, "Insert failed");
                return Ok(RunOutcome::Failed);
            }
        };
        debug!(id = %id, "Inserted row");
        self.insert_id = Some(id.clone());

        let hooks = self.class.hook_context(&self.context);
        self.class
            .hooks()
            .on_saved(hooks, &query.values, SavedTarget::Created(&id))?;
        Ok(RunOutcome::Inserted(id))
    }

    fn after_rollback(&mut self) -> Result<()> {
        self.insert_id = None;
        Ok(())
    }
}
