// ============================================================================
// Rowkeeper Library
// ============================================================================
//
// Binds in-memory entities to relational rows:
//
// - PermanentObject / Entity: field-level change tracking and persistence
// - Create/Update/Delete operations: validate, then run
// - TransactionOperationSet: all-or-nothing validation of a batch
// - Repository: loading through a per-class identity cache
//
// ============================================================================

pub mod config;
pub mod core;
pub mod entity;
pub mod prelude;
pub mod schema;
pub mod storage;
pub mod transaction;
pub mod validation;

// Re-export main types for convenience
pub use config::{Clock, FixedClock, PersistConfig, PersistContext, RequestContext, SystemClock};
pub use core::{PersistError, Result, Row, Value};
pub use entity::{
    DefaultHooks, Entity, EntityClass, EntityHooks, HookContext, LoadInput, PermanentObject,
    Repository, SavedTarget, Session,
};
pub use schema::{EntitySchema, LifecycleEvents, SchemaBuilder};
pub use storage::{
    AdapterRegistry, InMemoryAdapter, SharedAdapter, StorageAdapter, StorageError, TableSchema,
};
pub use transaction::{
    CreateOperation, DeleteOperation, OperationKind, OperationOutcome, RunOutcome, SetOutcome,
    SetStatus, TransactionOperation, TransactionOperationSet, UpdateOperation,
};
pub use validation::{
    FieldRule, FieldValidator, InvalidField, SchemaRuleValidator, UserError, Validation,
    ValidationError,
};
