use super::{RunOutcome, TransactionOperation};
use crate::core::Result;
use crate::storage::{SharedAdapter, lock_adapter};
use crate::validation::Validation;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, debug_span, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetStatus {
    /// No operation was added.
    Empty,
    /// At least one operation failed validation; nothing ran.
    Invalid,
    Applied,
    /// An operation failed and the adapter transaction was rolled back.
    RolledBack,
    /// An operation failed on an adapter without transactions; earlier
    /// operations stay applied.
    PartiallyApplied,
}

impl fmt::Display for SetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Invalid => "invalid",
            Self::Applied => "applied",
            Self::RolledBack => "rolled back",
            Self::PartiallyApplied => "partially applied",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    pub status: SetStatus,
    /// Every operation's validation, merged in insertion order.
    pub validation: Validation,
    /// Run results of the operations that were run, in insertion order.
    pub results: Vec<RunOutcome>,
    /// Positions of the operations that failed validation.
    pub invalid_operations: Vec<usize>,
}

impl SetOutcome {
    fn new(status: SetStatus, validation: Validation) -> Self {
        Self {
            status,
            validation,
            results: Vec::new(),
            invalid_operations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SetStatus::Applied
    }
}

/// Batch of operations that is validated as a whole before any of them runs.
pub struct TransactionOperationSet {
    adapter: SharedAdapter,
    operations: Vec<Box<dyn TransactionOperation>>,
}

impl TransactionOperationSet {
    pub fn new(adapter: SharedAdapter) -> Self {
        Self {
            adapter,
            operations: Vec::new(),
        }
    }

    /// Adds an operation and points it at the set's adapter.
    pub fn add(&mut self, operation: impl TransactionOperation + 'static) -> &mut Self {
        self.add_boxed(Box::new(operation))
    }

    pub fn add_boxed(&mut self, mut operation: Box<dyn TransactionOperation>) -> &mut Self {
        operation.set_adapter(Arc::clone(&self.adapter));
        self.operations.push(operation);
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn adapter(&self) -> &SharedAdapter {
        &self.adapter
    }

    pub fn operations(&self) -> &[Box<dyn TransactionOperation>] {
        &self.operations
    }

    /// Validates every operation, then runs them in order if all are valid.
    ///
    /// When the adapter supports transactions the run phase is wrapped in
    /// one and the first failing operation rolls everything back. Otherwise
    /// the run stops at the first failure.
    pub fn save(&mut self) -> Result<SetOutcome> {
        let _span = debug_span!("operation_set", operations = self.operations.len()).entered();
        if self.operations.is_empty() {
            return Ok(SetOutcome::new(SetStatus::Empty, Validation::new()));
        }

        let mut validation = Validation::new();
        let mut invalid = Vec::new();
        for (index, operation) in self.operations.iter_mut().enumerate() {
            validation.merge(operation.validate()?.clone());
            if !operation.is_valid() {
                invalid.push(index);
            }
        }
        if !invalid.is_empty() {
            debug!(invalid = invalid.len(), "Operation set is invalid, nothing runs");
            let mut outcome = SetOutcome::new(SetStatus::Invalid, validation);
            outcome.invalid_operations = invalid;
            return Ok(outcome);
        }

        let transactional = lock_adapter(&self.adapter)?.begin()?;
        let mut outcome = SetOutcome::new(SetStatus::Applied, validation);
        let mut failed = None;
        let mut raised = None;
        for (index, operation) in self.operations.iter_mut().enumerate() {
            match operation.run_if_valid() {
                Ok(result) => {
                    let applied = result.is_success();
                    outcome.results.push(result);
                    if !applied {
                        warn!(index, kind = %operation.kind(), "Operation did not apply");
                        failed = Some(index);
                        break;
                    }
                }
                Err(err) => {
                    failed = Some(index);
                    raised = Some(err);
                    break;
                }
            }
        }

        match failed {
            None => {
                if transactional {
                    lock_adapter(&self.adapter)?.commit()?;
                }
                debug!("Operation set applied");
            }
            Some(index) if transactional => {
                self.rollback(index)?;
                outcome.status = SetStatus::RolledBack;
            }
            Some(_) => outcome.status = SetStatus::PartiallyApplied,
        }
        if let Some(err) = raised {
            return Err(err);
        }
        Ok(outcome)
    }

    /// Rolls back the adapter, then resynchronises every operation up to `failed`.
    fn rollback(&mut self, failed: usize) -> Result<()> {
        lock_adapter(&self.adapter)?.rollback()?;
        for operation in self.operations.iter_mut().take(failed + 1) {
            if let Err(err) = operation.after_rollback() {
                error!(kind = %operation.kind(), error = %err, "Failed to resync after rollback");
            }
        }
        debug!("Operation set rolled back");
        Ok(())
    }
}

impl fmt::Debug for TransactionOperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<_> = self.operations.iter().map(|operation| operation.kind()).collect();
        f.debug_struct("TransactionOperationSet")
            .field("operations", &kinds)
            .finish_non_exhaustive()
    }
}
