use super::query::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};
use super::StorageResult;
use crate::core::{PersistError, Result, Row, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage adapter trait - the SQL layer the persistence core delegates to.
///
/// Implementations own statement generation, escaping and connections.
/// `begin`/`commit`/`rollback` are optional: an adapter without transaction
/// support keeps the default `begin` which reports `false`.
pub trait StorageAdapter: Send {
    /// Fetch raw rows matching the query
    fn select(&mut self, query: &SelectQuery) -> StorageResult<Vec<Row>>;

    /// Insert one row and return the identifier of the new row
    fn insert(&mut self, query: &InsertQuery) -> StorageResult<Value>;

    /// Update matching rows, returning the affected count
    fn update(&mut self, query: &UpdateQuery) -> StorageResult<u64>;

    /// Delete matching rows, returning the affected count
    fn delete(&mut self, query: &DeleteQuery) -> StorageResult<u64>;

    fn escape_identifier(&self, identifier: &str) -> String;

    fn format_value(&self, value: &Value) -> String;

    fn format_value_list(&self, values: &[Value]) -> String {
        values
            .iter()
            .map(|value| self.format_value(value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Open a transaction. Returns `false` when the adapter has no support.
    fn begin(&mut self) -> StorageResult<bool> {
        Ok(false)
    }

    fn commit(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

/// One adapter handle shared by every operation issued against an instance.
pub type SharedAdapter = Arc<Mutex<dyn StorageAdapter>>;

pub fn shared<A: StorageAdapter + 'static>(adapter: A) -> SharedAdapter {
    Arc::new(Mutex::new(adapter))
}

pub fn lock_adapter(
    adapter: &SharedAdapter,
) -> Result<MutexGuard<'_, dyn StorageAdapter + 'static>> {
    Ok(adapter.lock()?)
}

pub const DEFAULT_INSTANCE: &str = "default";

/// Named adapter instances, one shared handle per instance name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, SharedAdapter>,
    default_instance: Option<String>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding a single adapter under the default instance name.
    pub fn single(adapter: SharedAdapter) -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_INSTANCE, adapter);
        registry
    }

    /// Register an adapter. The first registered instance becomes the default.
    pub fn register(&mut self, name: impl Into<String>, adapter: SharedAdapter) -> &mut Self {
        let name = name.into();
        if self.default_instance.is_none() {
            self.default_instance = Some(name.clone());
        }
        self.adapters.insert(name, adapter);
        self
    }

    pub fn set_default(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self.adapters.contains_key(&name) {
            return Err(PersistError::UnknownAdapter(name));
        }
        self.default_instance = Some(name);
        Ok(())
    }

    /// Resolve an instance by name, or the default instance for `None`.
    pub fn get(&self, name: Option<&str>) -> Result<SharedAdapter> {
        let name = match name {
            Some(name) => name,
            None => self
                .default_instance
                .as_deref()
                .ok_or_else(|| PersistError::UnknownAdapter(DEFAULT_INSTANCE.to_string()))?,
        };
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| PersistError::UnknownAdapter(name.to_string()))
    }

    pub fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}
