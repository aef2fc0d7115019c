pub mod engine;
pub mod journal;
pub mod memory;
pub mod query;
pub mod table;

use thiserror::Error;

pub use engine::{AdapterRegistry, SharedAdapter, StorageAdapter, DEFAULT_INSTANCE, lock_adapter, shared};
pub use memory::InMemoryAdapter;
pub use query::{DeleteQuery, Filter, InsertQuery, OrderDirection, SelectQuery, StatementKind, UpdateQuery};
pub use table::{IdStrategy, Table, TableSchema};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Statement rejected: {0}")]
    Rejected(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
