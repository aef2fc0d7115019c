//! Everything an application touching entities usually needs.
//!
//! ```ignore
//! use rowkeeper::prelude::*;
//! ```

pub use crate::config::{PersistConfig, PersistContext, RequestContext};
pub use crate::core::{PersistError, Result, Row, Value};
pub use crate::entity::{
    Entity, EntityClass, EntityHooks, HookContext, Repository, SavedTarget, Session,
};
pub use crate::row;
pub use crate::schema::{EntitySchema, SchemaBuilder};
pub use crate::storage::{AdapterRegistry, InMemoryAdapter, StorageAdapter};
pub use crate::transaction::{
    OperationOutcome, RunOutcome, SetStatus, TransactionOperation, TransactionOperationSet,
};
pub use crate::validation::{FieldRule, RuleContext, RuleError, Validation, rules};
