use super::cache::{CacheStats, IdentityCache};
use super::class::EntityClass;
use super::handle::{Binding, Entity};
use crate::config::PersistContext;
use crate::core::{PersistError, Result, Row, Value, is_valid_id};
use crate::schema::EntitySchema;
use crate::storage::{Filter, SelectQuery, SharedAdapter, lock_adapter};
use crate::transaction::{CreateOperation, OperationOutcome, TransactionOperation};
use crate::validation::Validation;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

/// Anything `Repository::load` can resolve to an entity.
pub enum LoadInput {
    Id(Value),
    /// A full row, trusted as the entity's data.
    Row(Row),
    Entity(Entity),
}

impl From<Value> for LoadInput {
    fn from(id: Value) -> Self {
        Self::Id(id)
    }
}

impl From<&Value> for LoadInput {
    fn from(id: &Value) -> Self {
        Self::Id(id.clone())
    }
}

impl From<i64> for LoadInput {
    fn from(id: i64) -> Self {
        Self::Id(Value::Integer(id))
    }
}

impl From<i32> for LoadInput {
    fn from(id: i32) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<&str> for LoadInput {
    fn from(id: &str) -> Self {
        Self::Id(Value::from(id))
    }
}

impl From<Row> for LoadInput {
    fn from(row: Row) -> Self {
        Self::Row(row)
    }
}

impl From<Entity> for LoadInput {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<&Entity> for LoadInput {
    fn from(entity: &Entity) -> Self {
        Self::Entity(entity.clone())
    }
}

/// Entry point for one entity class: loading, querying, creating and the
/// class's identity cache.
pub struct Repository {
    binding: Binding,
    cache: Mutex<IdentityCache>,
}

impl Repository {
    /// Fails with a configuration error when the context's config is rejected.
    pub fn new(
        class: EntityClass,
        adapter: SharedAdapter,
        context: Arc<PersistContext>,
    ) -> Result<Self> {
        context.config.validate()?;
        let cache = IdentityCache::new(class.name(), context.config.cache_capacity);
        Ok(Self {
            binding: Binding {
                class: Arc::new(class),
                adapter,
                context,
            },
            cache: Mutex::new(cache),
        })
    }

    pub fn class(&self) -> &Arc<EntityClass> {
        &self.binding.class
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        self.binding.class.schema()
    }

    pub fn adapter(&self) -> &SharedAdapter {
        &self.binding.adapter
    }

    pub fn context(&self) -> &Arc<PersistContext> {
        &self.binding.context
    }

    fn cache(&self) -> Result<MutexGuard<'_, IdentityCache>> {
        Ok(self.cache.lock()?)
    }

    fn domain(&self) -> Option<&str> {
        Some(self.schema().domain())
    }

    /// Resolves an identifier, a row or an entity to an entity of this class.
    ///
    /// An empty input gives `None` when `nullable`, otherwise a not-found
    /// error; so does an identifier with no row. A cached instance is
    /// returned without touching storage, and with `use_cache` every
    /// loaded entity becomes the cached instance for its id.
    pub fn load(
        &self,
        input: impl Into<LoadInput>,
        nullable: bool,
        use_cache: bool,
    ) -> Result<Option<Entity>> {
        let (id, row) = match input.into() {
            LoadInput::Entity(entity) if entity.class().name() == self.class().name() => {
                return Ok(Some(entity));
            }
            LoadInput::Entity(entity) => {
                return Err(PersistError::InvalidId {
                    class: self.class().name().to_string(),
                    id: entity.to_string(),
                });
            }
            LoadInput::Id(id) => (id, None),
            LoadInput::Row(row) => {
                let id = row.get(self.schema().id_field()).cloned().unwrap_or_default();
                (id, Some(row))
            }
        };

        if id.is_empty() {
            if nullable {
                return Ok(None);
            }
            return Err(PersistError::not_found("invalidParameter_load", self.domain()));
        }
        if !is_valid_id(&id) {
            return Err(PersistError::InvalidId {
                class: self.class().name().to_string(),
                id: id.to_string(),
            });
        }

        if use_cache && let Some(cached) = self.cache()?.get(&id) {
            return Ok(Some(cached));
        }

        let row = match row {
            Some(row) => row,
            None => match self.fetch_row(&id)? {
                Some(row) => row,
                None if nullable => return Ok(None),
                None => return Err(PersistError::not_found("objectNotFound", self.domain())),
            },
        };

        let entity = self.instantiate(row)?;
        if !use_cache {
            return Ok(Some(entity));
        }
        let (entity, evicted) = self.cache()?.check(entity);
        drop(evicted);
        Ok(Some(entity))
    }

    /// [`load`](Self::load), non-nullable and cached.
    pub fn load_required(&self, input: impl Into<LoadInput>) -> Result<Entity> {
        self.load(input, false, true)?
            .ok_or_else(|| PersistError::not_found("objectNotFound", self.domain()))
    }

    /// Builds an entity from a full row, bypassing the cache.
    pub fn instantiate(&self, row: Row) -> Result<Entity> {
        let object = self.class().construct(row, self.context())?;
        Ok(Entity::new(self.binding.clone(), object))
    }

    fn fetch_row(&self, id: &Value) -> Result<Option<Row>> {
        let query = SelectQuery::new(self.schema().table())
            .filter(Filter::eq(self.schema().id_field(), id.clone()))
            .limit(1);
        Ok(self.get_rows(query)?.into_iter().next())
    }

    /// Raw rows of this class's table.
    pub fn get_rows(&self, query: SelectQuery) -> Result<Vec<Row>> {
        let query = query.with_table(self.schema().table());
        Ok(lock_adapter(self.adapter())?.select(&query)?)
    }

    /// Entities matching `query`, going through the identity cache.
    pub fn get(&self, query: SelectQuery) -> Result<Vec<Entity>> {
        let rows = self.get_rows(query)?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(entity) = self.load(row, true, true)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    pub fn get_one(&self, query: SelectQuery) -> Result<Option<Entity>> {
        Ok(self.get(query.limit(1))?.into_iter().next())
    }

    /// Every entity of the class.
    pub fn all(&self) -> Result<Vec<Entity>> {
        self.get(SelectQuery::new(self.schema().table()))
    }

    pub fn create_operation(&self, input: Row, fields: Option<Vec<String>>) -> CreateOperation {
        let mut operation = CreateOperation::new(
            Arc::clone(self.class()),
            Arc::clone(self.context()),
            input,
            fields,
        );
        operation.set_adapter(Arc::clone(self.adapter()));
        operation
    }

    /// Validates `input` and inserts it when valid.
    pub fn create(&self, input: Row, fields: Option<&[String]>) -> Result<OperationOutcome> {
        let mut operation = self.create_operation(input, fields.map(<[String]>::to_vec));
        operation.validate()?;
        let outcome = operation.run_if_valid()?;
        Ok(OperationOutcome::new(outcome, operation.validation().clone()))
    }

    /// [`create`](Self::create), then loads the new entity.
    ///
    /// The entity is `None` when nothing was inserted; the outcome tells why.
    pub fn create_and_get(
        &self,
        input: Row,
        fields: Option<&[String]>,
    ) -> Result<(Option<Entity>, OperationOutcome)> {
        let outcome = self.create(input, fields)?;
        let entity = match outcome.inserted_id() {
            Some(id) => Some(self.load_required(id)?),
            None => None,
        };
        Ok((entity, outcome))
    }

    pub fn check_user_input(
        &self,
        input: &Row,
        fields: Option<&[String]>,
        reference: Option<&Entity>,
        ignore_required: bool,
    ) -> Result<(Row, Validation)> {
        let snapshot = reference.map(Entity::snapshot).transpose()?;
        Ok(self
            .class()
            .check_user_input(input, fields, snapshot.as_ref(), ignore_required))
    }

    pub fn test_user_input(
        &self,
        input: &Row,
        fields: Option<&[String]>,
        reference: Option<&Entity>,
        ignore_required: bool,
    ) -> Result<(Row, Validation)> {
        let snapshot = reference.map(Entity::snapshot).transpose()?;
        Ok(self.class().test_user_input(
            self.context(),
            input,
            fields,
            snapshot.as_ref(),
            ignore_required,
        ))
    }

    /// Adds already loaded entities to the cache, keeping existing instances.
    pub fn cache_objects(&self, entities: &[Entity]) -> Result<()> {
        let mut evicted = Vec::new();
        {
            let mut cache = self.cache()?;
            for entity in entities {
                if let (_, Some(old)) = cache.check(entity.clone()) {
                    evicted.push(old);
                }
            }
        }
        drop(evicted);
        Ok(())
    }

    pub fn is_cached(&self, id: &Value) -> Result<bool> {
        Ok(self.cache()?.contains(id))
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.cache()?.stats())
    }

    /// Evicts deleted entities; returns how many were dropped.
    pub fn clear_deleted_instances(&self) -> Result<usize> {
        let removed = self.cache()?.clear_deleted();
        debug!(class = %self.class().name(), count = removed.len(), "Cleared deleted instances");
        Ok(removed.len())
    }

    /// Empties the cache; returns how many entries were dropped.
    ///
    /// Entities no longer referenced elsewhere save their pending changes
    /// as they are released.
    pub fn clear_all_instances(&self) -> Result<usize> {
        let removed = self.cache()?.clear();
        let count = removed.len();
        drop(removed);
        debug!(class = %self.class().name(), count, "Cleared all instances");
        Ok(count)
    }

    /// Saves every cached entity with pending changes; returns how many were written.
    ///
    /// One failing entity does not stop the others. Every failure is logged
    /// and the first one is returned once all entities were tried.
    pub fn flush(&self) -> Result<usize> {
        let entities = self.cache()?.entities();
        let mut saved = 0;
        let mut failure = None;
        for entity in entities {
            let result = match entity.has_changes() {
                Ok(false) => continue,
                Ok(true) => entity.save(),
                Err(err) => Err(err),
            };
            match result {
                Ok(true) => saved += 1,
                Ok(false) => warn!(uid = %entity.uid(), "Flush could not save entity"),
                Err(err) => {
                    error!(uid = %entity.uid(), error = %err, "Flush failed for entity");
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(saved),
        }
    }

    pub fn escape_identifier(&self, identifier: Option<&str>) -> Result<String> {
        let identifier = identifier.unwrap_or(self.schema().id_field());
        Ok(lock_adapter(self.adapter())?.escape_identifier(identifier))
    }

    pub fn format_value(&self, value: &Value) -> Result<String> {
        Ok(lock_adapter(self.adapter())?.format_value(value))
    }

    pub fn format_value_list(&self, values: &[Value]) -> Result<String> {
        Ok(lock_adapter(self.adapter())?.format_value_list(values))
    }
}
