// ============================================================================
// Transaction Operations
// ============================================================================
//
// Every mutation of stored entities is one operation with a validate/run
// lifecycle: validation collects every problem of the input, and running
// is only ever allowed once validation succeeded.
//
// - CreateOperation: insert a validated payload
// - UpdateOperation: write a validated payload to one entity's row
// - DeleteOperation: delete one entity's row
// - TransactionOperationSet: validate a batch as a whole, then run it
//
// ============================================================================

pub mod create;
pub mod delete;
pub mod set;
pub mod update;

pub use create::CreateOperation;
pub use delete::DeleteOperation;
pub use set::{SetOutcome, SetStatus, TransactionOperationSet};
pub use update::UpdateOperation;

use crate::core::{Result, Value};
use crate::entity::EntityClass;
use crate::storage::SharedAdapter;
use crate::validation::Validation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Result of running one operation.
///
/// Storage failures are reported here rather than as errors; `Updated(0)`
/// and `Deleted(0)` mean no row matched.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Not run because the last validation was not valid.
    Skipped,
    /// The adapter rejected the statement.
    Failed,
    Inserted(Value),
    Updated(u64),
    Deleted(u64),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Inserted(_) => true,
            Self::Updated(count) | Self::Deleted(count) => *count > 0,
            Self::Skipped | Self::Failed => false,
        }
    }

    pub fn inserted_id(&self) -> Option<&Value> {
        match self {
            Self::Inserted(id) => Some(id),
            _ => None,
        }
    }
}

/// What a validate-then-run call reports back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    pub outcome: RunOutcome,
    pub validation: Validation,
}

impl OperationOutcome {
    pub fn new(outcome: RunOutcome, validation: Validation) -> Self {
        Self {
            outcome,
            validation,
        }
    }

    pub fn error_count(&self) -> usize {
        self.validation.error_count()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn inserted_id(&self) -> Option<&Value> {
        self.outcome.inserted_id()
    }
}

/// One storage mutation on one entity class.
pub trait TransactionOperation: Send {
    fn kind(&self) -> OperationKind;

    fn class(&self) -> &Arc<EntityClass>;

    fn adapter(&self) -> Option<&SharedAdapter>;

    fn set_adapter(&mut self, adapter: SharedAdapter);

    /// Checks the operation; the result decides whether it may run.
    fn validate(&mut self) -> Result<&Validation>;

    /// Result of the last [`validate`](Self::validate) call.
    fn validation(&self) -> &Validation;

    /// True only after a validation that allowed the operation to run.
    fn is_valid(&self) -> bool;

    /// Executes the statement without looking at validity.
    fn run(&mut self) -> Result<RunOutcome>;

    /// Runs only when the last validation succeeded.
    fn run_if_valid(&mut self) -> Result<RunOutcome> {
        if self.is_valid() {
            self.run()
        } else {
            Ok(RunOutcome::Skipped)
        }
    }

    /// Resynchronises in-memory state after the adapter rolled back this
    /// operation's statement.
    fn after_rollback(&mut self) -> Result<()> {
        Ok(())
    }
}
