use super::class::EntityClass;
use super::repository::Repository;
use crate::config::{PersistConfig, PersistContext};
use crate::core::{PersistError, Result};
use crate::storage::AdapterRegistry;
use crate::transaction::TransactionOperationSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Unit of work over a set of entity classes.
///
/// Owns one repository per registered class, each with its own identity
/// cache. Dropping the session flushes every dirty cached entity when
/// `flush_on_drop` is set; failures are logged, never raised.
pub struct Session {
    registry: AdapterRegistry,
    context: Arc<PersistContext>,
    repositories: BTreeMap<String, Arc<Repository>>,
}

impl Session {
    pub fn new(registry: AdapterRegistry, config: PersistConfig) -> Result<Self> {
        Self::with_context(registry, PersistContext::new(config))
    }

    /// Fails with a configuration error when the context's config is rejected.
    pub fn with_context(registry: AdapterRegistry, context: PersistContext) -> Result<Self> {
        context.config.validate()?;
        Ok(Self {
            registry,
            context: Arc::new(context),
            repositories: BTreeMap::new(),
        })
    }

    pub fn context(&self) -> &Arc<PersistContext> {
        &self.context
    }

    pub fn config(&self) -> &PersistConfig {
        &self.context.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Registers a class on the adapter instance its schema names.
    ///
    /// Registering a class name again replaces the previous repository.
    pub fn register(&mut self, class: EntityClass) -> Result<Arc<Repository>> {
        let adapter = self.registry.get(class.schema().instance())?;
        let name = class.name().to_string();
        let repository = Arc::new(Repository::new(class, adapter, Arc::clone(&self.context))?);
        debug!(class = %name, "Registered entity class");
        self.repositories.insert(name, Arc::clone(&repository));
        Ok(repository)
    }

    pub fn repository(&self, class: &str) -> Result<Arc<Repository>> {
        self.repositories
            .get(class)
            .cloned()
            .ok_or_else(|| PersistError::UnknownClass(class.to_string()))
    }

    pub fn class_names(&self) -> Vec<String> {
        self.repositories.keys().cloned().collect()
    }

    /// Empty operation set on an adapter instance, the default one for `None`.
    pub fn operation_set(&self, instance: Option<&str>) -> Result<TransactionOperationSet> {
        Ok(TransactionOperationSet::new(self.registry.get(instance)?))
    }

    /// Saves every dirty cached entity; returns how many were written.
    ///
    /// Every repository is flushed even when an earlier one fails; the
    /// first failure is returned afterwards.
    pub fn flush(&self) -> Result<usize> {
        let mut saved = 0;
        let mut failure = None;
        for repository in self.repositories.values() {
            match repository.flush() {
                Ok(count) => saved += count,
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(saved),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.context.config.flush_on_drop {
            return;
        }
        match self.flush() {
            Ok(0) => {}
            Ok(saved) => debug!(saved, "Flushed session on drop"),
            Err(err) => error!(error = %err, "Failed to flush session on drop"),
        }
    }
}
