use super::handle::{Entity, EntityCell};
use crate::core::Value;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Weak;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub class: String,
    pub entries: usize,
    /// Evicted entries still referenced by callers
    pub retained: usize,
    /// `None` for an unbounded cache
    pub capacity: Option<usize>,
    pub hits: u64,
    pub misses: u64,
}

/// Identity map of one entity class: identifier to canonical instance.
///
/// Unbounded unless built with a capacity, in which case the least recently
/// used entry is evicted. Evicted entities are handed back to the caller so
/// they can be dropped outside of any lock. An evicted entity that is still
/// referenced elsewhere stays reachable through a weak handle, so one id
/// never maps to two live instances.
pub struct IdentityCache {
    class: String,
    entries: LruCache<Value, Entity>,
    retained: HashMap<Value, Weak<EntityCell>>,
    capacity: Option<usize>,
    hits: u64,
    misses: u64,
}

impl IdentityCache {
    pub fn new(class: &str, capacity: Option<usize>) -> Self {
        let entries = match capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            class: class.to_string(),
            entries,
            retained: HashMap::new(),
            capacity: capacity.filter(|capacity| *capacity > 0),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, id: &Value) -> Option<Entity> {
        match self.lookup(id) {
            Some(entity) => {
                self.hits += 1;
                Some(entity)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn lookup(&mut self, id: &Value) -> Option<Entity> {
        if let Some(entity) = self.entries.get(id) {
            return Some(entity.clone());
        }
        let entity = self.retained.get(id).and_then(Entity::upgrade);
        if entity.is_none() {
            self.retained.remove(id);
        }
        entity
    }

    pub fn contains(&self, id: &Value) -> bool {
        self.entries.contains(id)
            || self
                .retained
                .get(id)
                .is_some_and(|cell| cell.strong_count() > 0)
    }

    /// Returns the cached instance for the entity's id, caching `entity`
    /// when there is none yet, plus whatever had to be evicted for it.
    pub fn check(&mut self, entity: Entity) -> (Entity, Option<Entity>) {
        if let Some(existing) = self.lookup(entity.id()) {
            return (existing, None);
        }
        let evicted = self
            .entries
            .push(entity.id().clone(), entity.clone())
            .map(|(_, evicted)| evicted);
        if let Some(evicted) = &evicted {
            self.retained.retain(|_, cell| cell.strong_count() > 0);
            self.retained.insert(evicted.id().clone(), evicted.downgrade());
        }
        (entity, evicted)
    }

    pub fn remove(&mut self, id: &Value) -> Option<Entity> {
        let retained = self.retained.remove(id).and_then(|cell| Entity::upgrade(&cell));
        self.entries.pop(id).or(retained)
    }

    /// Removes and returns the entries whose entity is marked deleted.
    pub fn clear_deleted(&mut self) -> Vec<Entity> {
        self.retained.retain(|_, cell| {
            Entity::upgrade(cell).is_some_and(|entity| !entity.is_deleted().unwrap_or(false))
        });
        let deleted: Vec<Value> = self
            .entries
            .iter()
            .filter(|(_, entity)| entity.is_deleted().unwrap_or(false))
            .map(|(id, _)| id.clone())
            .collect();
        deleted.iter().filter_map(|id| self.entries.pop(id)).collect()
    }

    /// Removes and returns every entry.
    pub fn clear(&mut self) -> Vec<Entity> {
        self.retained.clear();
        let mut removed = Vec::with_capacity(self.entries.len());
        while let Some((_, entity)) = self.entries.pop_lru() {
            removed.push(entity);
        }
        removed
    }

    /// Every live instance, including evicted ones still referenced elsewhere.
    pub fn entities(&self) -> Vec<Entity> {
        let cached = self.entries.iter().map(|(_, entity)| entity.clone());
        let retained = self
            .retained
            .iter()
            .filter(|(id, _)| !self.entries.contains(*id))
            .filter_map(|(_, cell)| Entity::upgrade(cell));
        cached.chain(retained).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            class: self.class.clone(),
            entries: self.entries.len(),
            retained: self
                .retained
                .values()
                .filter(|cell| cell.strong_count() > 0)
                .count(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
        }
    }
}
