// ============================================================================
// Undo journal
// ============================================================================
//
// Records every row mutation applied while a transaction is open so that a
// rollback can reverse them, newest first.
//
// ============================================================================

use crate::core::{Row, Value};

/// A single reversible change applied to a table
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A row was inserted under `id`
    InsertRow { table: String, id: Value },

    /// A row was overwritten; `old_row` is the version before the update
    UpdateRow { table: String, old_row: Row },

    /// A row was removed from `position`
    DeleteRow {
        table: String,
        position: usize,
        old_row: Row,
    },
}

impl Change {
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::UpdateRow { table, .. } => table,
            Change::DeleteRow { table, .. } => table,
        }
    }
}

#[derive(Debug, Default)]
pub struct Journal {
    changes: Vec<Change>,
}

impl Journal {
    pub fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Drains the journal newest-first, the order a rollback must apply.
    pub fn drain_reversed(&mut self) -> impl Iterator<Item = Change> + '_ {
        self.changes.drain(..).rev()
    }
}
