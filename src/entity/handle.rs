use super::class::{EntityClass, HookContext, SavedTarget};
use super::object::PermanentObject;
use crate::config::PersistContext;
use crate::core::{PersistError, Result, Row, Value, sql_datetime};
use crate::schema::EntitySchema;
use crate::storage::{Filter, SelectQuery, SharedAdapter, UpdateQuery, lock_adapter};
use crate::transaction::{DeleteOperation, OperationOutcome, TransactionOperation, UpdateOperation};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error, warn};

/// Class, adapter and context shared by everything bound to one entity class.
#[derive(Clone)]
pub(crate) struct Binding {
    pub class: Arc<EntityClass>,
    pub adapter: SharedAdapter,
    pub context: Arc<PersistContext>,
}

impl Binding {
    pub fn hooks(&self) -> HookContext<'_> {
        self.class.hook_context(&self.context)
    }
}

pub(crate) struct EntityCell {
    binding: Binding,
    id: Value,
    state: Mutex<PermanentObject>,
}

impl Drop for EntityCell {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !state.has_changes() || state.is_deleted() {
            return;
        }
        if let Err(err) = save_released(&self.binding, state) {
            error!(uid = %state.uid(), error = %err, "Failed to save released entity");
        }
    }
}

/// Best-effort write of pending changes for an object nobody references anymore.
fn save_released(binding: &Binding, state: &mut PermanentObject) -> Result<()> {
    let schema = binding.class.schema();
    let mut data = state.changed_data();
    binding.class.prepare_payload(&binding.context, &mut data, Some(&*state));
    let query = UpdateQuery {
        table: schema.table().to_string(),
        values: data.clone(),
        filter: Filter::eq(schema.id_field(), state.id().clone()),
        limit: Some(1),
    };
    let affected = lock_adapter(&binding.adapter)?.update(&query)?;
    if affected == 0 {
        warn!(uid = %state.uid(), "Released entity matched no row");
        return Ok(());
    }
    state.clear_changes();
    debug!(uid = %state.uid(), "Saved released entity");

    if state.begin_saved_callback() {
        let result = binding
            .class
            .hooks()
            .on_saved(binding.hooks(), &data, SavedTarget::Released(&*state));
        state.end_saved_callback();
        result?;
    }
    Ok(())
}

/// Shared handle to one persisted row.
///
/// Clones point at the same in-memory state, which is what the identity
/// cache hands out. When the last handle goes away with unsaved changes,
/// they are written back and any failure is only logged.
#[derive(Clone)]
pub struct Entity {
    cell: Arc<EntityCell>,
}

impl Entity {
    pub(crate) fn new(binding: Binding, object: PermanentObject) -> Self {
        Self {
            cell: Arc::new(EntityCell {
                binding,
                id: object.id().clone(),
                state: Mutex::new(object),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<EntityCell> {
        Arc::downgrade(&self.cell)
    }

    pub(crate) fn upgrade(cell: &Weak<EntityCell>) -> Option<Entity> {
        cell.upgrade().map(|cell| Self { cell })
    }

    pub(crate) fn binding(&self) -> &Binding {
        &self.cell.binding
    }

    pub(crate) fn state(&self) -> Result<MutexGuard<'_, PermanentObject>> {
        Ok(self.cell.state.lock()?)
    }

    /// Copy of the current state, for code that must not hold the lock.
    pub fn snapshot(&self) -> Result<PermanentObject> {
        Ok(self.state()?.clone())
    }

    pub fn class(&self) -> &Arc<EntityClass> {
        &self.cell.binding.class
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        self.cell.binding.class.schema()
    }

    pub fn adapter(&self) -> &SharedAdapter {
        &self.cell.binding.adapter
    }

    pub fn context(&self) -> &Arc<PersistContext> {
        &self.cell.binding.context
    }

    pub fn id(&self) -> &Value {
        &self.cell.id
    }

    pub fn uid(&self) -> String {
        format!("{}#{}", self.schema().table(), self.id())
    }

    pub fn get_value(&self, key: &str) -> Result<Value> {
        Ok(self.state()?.get_value(key)?.clone())
    }

    pub fn all(&self) -> Result<Row> {
        Ok(self.state()?.all().clone())
    }

    pub fn set_value(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.state()?.set_value(key, value.into())
    }

    pub fn has_changes(&self) -> Result<bool> {
        Ok(self.state()?.has_changes())
    }

    pub fn modified_fields(&self) -> Result<Vec<String>> {
        Ok(self.state()?.modified_fields())
    }

    pub fn revert(&self) -> Result<()> {
        self.state()?.revert();
        Ok(())
    }

    pub fn is_deleted(&self) -> Result<bool> {
        Ok(self.state()?.is_deleted())
    }

    pub fn is_valid(&self) -> Result<bool> {
        Ok(!self.is_deleted()?)
    }

    pub(crate) fn mark_deleted(&self) -> Result<()> {
        self.state()?.mark_deleted();
        Ok(())
    }

    pub(crate) fn unmark_deleted(&self) -> Result<()> {
        self.state()?.unmark_deleted();
        Ok(())
    }

    /// Writes the dirty fields; `false` when there was nothing to write.
    ///
    /// The values are not validated again since they already are the
    /// object's own state. The `on_saved` hook runs once per save, even if
    /// it saves the entity again itself.
    pub fn save(&self) -> Result<bool> {
        let (data, fields) = {
            let state = self.state()?;
            if !state.has_changes() || state.is_deleted() {
                return Ok(false);
            }
            (state.changed_data(), state.modified_fields())
        };

        let mut operation = UpdateOperation::new(self.clone(), data, Some(fields));
        let outcome = operation.execute()?;
        if !outcome.is_success() {
            return Ok(false);
        }

        if self.state()?.begin_saved_callback() {
            let binding = self.binding();
            let result = binding
                .class
                .hooks()
                .on_saved(binding.hooks(), operation.data(), SavedTarget::Updated(self));
            self.state()?.end_saved_callback();
            result?;
        }
        Ok(true)
    }

    /// Validates `input` against the allowed `fields` and applies it when valid.
    pub fn update(&self, input: &Row, fields: Option<&[String]>) -> Result<OperationOutcome> {
        let mut operation = self.update_operation(input.clone(), fields.map(<[String]>::to_vec));
        operation.validate()?;
        let outcome = operation.run_if_valid()?;
        Ok(OperationOutcome::new(outcome, operation.validation().clone()))
    }

    /// Deletes the row; `false` without any storage call when already deleted.
    pub fn remove(&self) -> Result<bool> {
        if self.is_deleted()? {
            return Ok(false);
        }
        let mut operation = self.delete_operation();
        operation.validate()?;
        Ok(operation.run_if_valid()?.is_success())
    }

    pub fn update_operation(&self, input: Row, fields: Option<Vec<String>>) -> UpdateOperation {
        UpdateOperation::new(self.clone(), input, fields)
    }

    pub fn delete_operation(&self) -> DeleteOperation {
        DeleteOperation::new(self.clone())
    }

    fn fetch(&self, fields: Option<&[String]>) -> Option<Row> {
        let schema = self.schema();
        let mut query = SelectQuery::new(schema.table())
            .filter(Filter::eq(schema.id_field(), self.id().clone()))
            .limit(1);
        if let Some(fields) = fields {
            query = query.fields(fields.iter().cloned());
        }
        let rows = lock_adapter(self.adapter()).and_then(|mut adapter| Ok(adapter.select(&query)?));
        match rows {
            Ok(rows) => rows.into_iter().next(),
            Err(err) => {
                warn!(uid = %self.uid(), error = %err, "Reload failed, treating as missing row");
                None
            }
        }
    }

    /// Re-reads the row; marks the entity deleted and returns `false` when it is gone.
    pub fn reload(&self) -> Result<bool> {
        let row = self.fetch(None);
        let class = self.class();
        let mut state = self.state()?;
        let Some(row) = row else {
            state.clear_changes();
            state.mark_deleted();
            return Ok(false);
        };
        let row = row
            .into_iter()
            .map(|(field, value)| {
                let value = class.hooks().parse_field_value(&field, value);
                (field, value)
            })
            .collect();
        state.replace_data(row, self.context().config.check_field_integrity)?;
        Ok(true)
    }

    /// Re-reads a single field, dropping its pending change.
    pub fn reload_field(&self, field: &str) -> Result<bool> {
        if !self.schema().has_field(field) {
            return Err(PersistError::field_not_found(self.class().name(), field));
        }
        self.state()?.forget_change(field);

        let fields = [field.to_string()];
        let row = self.fetch(Some(&fields[..]));
        let mut state = self.state()?;
        let Some(mut row) = row else {
            state.mark_deleted();
            return Ok(false);
        };
        let value = row.remove(field).unwrap_or_default();
        state.set_field_data(field, self.class().hooks().parse_field_value(field, value));
        Ok(true)
    }

    /// Records `event` in its audit fields, like a create or update would.
    pub fn log_event(&self, event: &str) -> Result<()> {
        let schema = Arc::clone(self.schema());
        let context = self.context();
        let now = context.now();

        let time_field = format!("{}_time", event);
        let date_field = format!("{}_date", event);
        let mut state = self.state()?;
        if schema.has_field(&time_field) {
            state.set_value(&time_field, Value::Integer(now.timestamp()))?;
        } else if schema.has_field(&date_field) {
            state.set_value(&date_field, Value::Text(sql_datetime(now)))?;
        } else {
            return Ok(());
        }

        let agent_field = format!("{}_agent", event);
        if let Some(agent) = &context.request.user_agent
            && schema.has_field(&agent_field)
        {
            state.set_value(&agent_field, Value::from(agent.as_str()))?;
        }
        let referer_field = format!("{}_referer", event);
        if let Some(referer) = &context.request.referer
            && schema.has_field(&referer_field)
        {
            state.set_value(&referer_field, Value::from(referer.as_str()))?;
        }
        let ip_field = format!("{}_ip", event);
        if schema.has_field(&ip_field) {
            state.set_value(&ip_field, Value::from(context.client_ip()))?;
        }
        Ok(())
    }

    pub fn export_data(&self, keys: Option<&[&str]>) -> Result<serde_json::Map<String, serde_json::Value>> {
        Ok(self.state()?.export_data(keys))
    }

    /// Same class and same identifier.
    pub fn equals(&self, other: &Entity) -> bool {
        self.class().name() == other.class().name() && self.id() == other.id()
    }

    /// Both handles share one in-memory state.
    pub fn same_instance(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class().name(), self.id())
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.state.try_lock() {
            Ok(state) => fmt::Debug::fmt(&*state, f),
            Err(_) => write!(f, "Entity({})", self),
        }
    }
}
