use crate::core::{PersistError, Result, Row, Value, filter_by_keys};
use crate::schema::EntitySchema;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// In-memory state of one persisted row.
///
/// Holds the current field values and, for every field changed since the
/// last load or save, the value it had at that boundary. The key set of
/// that map is the dirty set. The object never touches storage itself;
/// [`Entity`](super::Entity) drives persistence around it.
#[derive(Clone)]
pub struct PermanentObject {
    schema: Arc<EntitySchema>,
    data: Row,
    original: BTreeMap<String, Value>,
    deleted: bool,
    saving: bool,
}

impl PermanentObject {
    /// Builds the object from a full row.
    ///
    /// Every declared field is taken from `row`; a missing one is an
    /// [`PersistError::OutOfDateSchema`] when `check_integrity` is set and
    /// null otherwise. Undeclared columns are ignored.
    pub fn from_row(schema: Arc<EntitySchema>, row: Row, check_integrity: bool) -> Result<Self> {
        let data = Self::declared_values(&schema, row, check_integrity)?;
        Ok(Self {
            schema,
            data,
            original: BTreeMap::new(),
            deleted: false,
            saving: false,
        })
    }

    fn declared_values(schema: &EntitySchema, mut row: Row, check_integrity: bool) -> Result<Row> {
        let mut data = Row::new();
        for field in schema.fields() {
            let value = match row.remove(field) {
                Some(value) => value,
                None if check_integrity => {
                    return Err(PersistError::OutOfDateSchema {
                        class: schema.class_name().to_string(),
                        field: field.clone(),
                    });
                }
                None => Value::Null,
            };
            data.insert(field.clone(), value);
        }
        Ok(data)
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn class_name(&self) -> &str {
        self.schema.class_name()
    }

    pub fn id(&self) -> &Value {
        self.data.get(self.schema.id_field()).unwrap_or(&NULL)
    }

    /// `table#id`, unique across classes sharing an adapter.
    pub fn uid(&self) -> String {
        format!("{}#{}", self.schema.table(), self.id())
    }

    pub fn get_value(&self, key: &str) -> Result<&Value> {
        self.data
            .get(key)
            .ok_or_else(|| PersistError::field_not_found(self.class_name(), key))
    }

    pub fn all(&self) -> &Row {
        &self.data
    }

    /// Changes one field; returns whether the value actually changed.
    ///
    /// The first divergence from the last persisted value is remembered.
    /// Setting a field back to that value makes it clean again.
    pub fn set_value(&mut self, key: &str, value: Value) -> Result<bool> {
        let Some(current) = self.data.get_mut(key) else {
            return Err(PersistError::field_not_found(self.schema.class_name(), key));
        };
        if key == self.schema.id_field() {
            return Err(PersistError::IdNotEditable {
                class: self.schema.class_name().to_string(),
            });
        }
        if *current == value {
            return Ok(false);
        }

        let previous = std::mem::replace(current, value);
        match self.original.get(key) {
            Some(original) if *original == self.data[key] => {
                self.original.remove(key);
            }
            Some(_) => {}
            None => {
                self.original.insert(key.to_string(), previous);
            }
        }
        Ok(true)
    }

    pub fn has_changes(&self) -> bool {
        !self.original.is_empty()
    }

    /// Dirty fields in declaration order.
    pub fn modified_fields(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .filter(|field| self.original.contains_key(field.as_str()))
            .cloned()
            .collect()
    }

    /// Current values of the dirty fields.
    pub fn changed_data(&self) -> Row {
        let fields = self.modified_fields();
        filter_by_keys(&self.data, fields.as_slice())
    }

    pub fn original_value(&self, key: &str) -> Option<&Value> {
        self.original.get(key)
    }

    pub fn revert(&mut self) {
        for (field, value) in std::mem::take(&mut self.original) {
            self.data.insert(field, value);
        }
    }

    pub(crate) fn clear_changes(&mut self) {
        self.original.clear();
    }

    pub(crate) fn forget_change(&mut self, field: &str) {
        self.original.remove(field);
    }

    /// Replaces all field data with a freshly fetched row.
    pub(crate) fn replace_data(&mut self, row: Row, check_integrity: bool) -> Result<()> {
        let id = self.id().clone();
        let mut data = Self::declared_values(&self.schema, row, check_integrity)?;
        data.insert(self.schema.id_field().to_string(), id);
        self.data = data;
        self.original.clear();
        Ok(())
    }

    pub(crate) fn set_field_data(&mut self, field: &str, value: Value) {
        if let Some(slot) = self.data.get_mut(field) {
            *slot = value;
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub(crate) fn unmark_deleted(&mut self) {
        self.deleted = false;
    }

    /// Enters the post-save callback; false when one is already running.
    pub(crate) fn begin_saved_callback(&mut self) -> bool {
        if self.saving {
            return false;
        }
        self.saving = true;
        true
    }

    pub(crate) fn end_saved_callback(&mut self) {
        self.saving = false;
    }

    /// Same class and same identifier.
    pub fn equals(&self, other: &PermanentObject) -> bool {
        self.class_name() == other.class_name() && self.id() == other.id()
    }

    /// Field data as a JSON object, optionally restricted to `keys`.
    pub fn export_data(&self, keys: Option<&[&str]>) -> serde_json::Map<String, serde_json::Value> {
        self.data
            .iter()
            .filter(|(field, _)| keys.is_none_or(|keys| keys.contains(&field.as_str())))
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect()
    }
}

impl fmt::Display for PermanentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name(), self.id())
    }
}

impl fmt::Debug for PermanentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermanentObject")
            .field("class", &self.class_name())
            .field("data", &self.data)
            .field("modified", &self.modified_fields())
            .field("deleted", &self.deleted)
            .finish()
    }
}
