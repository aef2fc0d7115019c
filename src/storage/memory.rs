use super::engine::StorageAdapter;
use super::journal::{Change, Journal};
use super::query::{DeleteQuery, Filter, InsertQuery, SelectQuery, StatementKind, UpdateQuery};
use super::table::{Table, TableSchema};
use super::{StorageError, StorageResult};
use crate::core::{Row, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A rule making matching statements fail, for exercising error paths.
#[derive(Debug, Clone)]
struct FailureRule {
    kind: StatementKind,
    table: Option<String>,
    /// `None` fails forever, `Some(n)` fails the next `n` matches.
    remaining: Option<usize>,
}

/// In-memory storage adapter.
///
/// Keeps one [`Table`] per name, logs every statement it executes as SQL
/// text and supports transactions through an undo [`Journal`].
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    tables: BTreeMap<String, Table>,
    journal: Option<Journal>,
    statements: Vec<String>,
    failures: Vec<FailureRule>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the adapter so tests can keep a typed handle next to the shared one.
    pub fn into_shared(self) -> Arc<Mutex<InMemoryAdapter>> {
        Arc::new(Mutex::new(self))
    }

    pub fn create_table(&mut self, schema: TableSchema) -> StorageResult<()> {
        let name = schema.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(StorageError::Constraint(format!("Table '{}' already exists", name)));
        }
        self.tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn with_table(mut self, schema: TableSchema) -> StorageResult<Self> {
        self.create_table(schema)?;
        Ok(self)
    }

    pub fn table(&self, name: &str) -> StorageResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(Table::row_count).unwrap_or(0)
    }

    /// Direct row lookup that bypasses the statement log.
    pub fn find_row(&self, table: &str, id: &Value) -> Option<Row> {
        let table = self.tables.get(table)?;
        let id_field = table.schema().id_field();
        table
            .rows()
            .iter()
            .find(|row| row.get(id_field) == Some(id))
            .cloned()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub fn clear_statements(&mut self) {
        self.statements.clear();
    }

    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    /// Make every matching statement fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_on(&mut self, kind: StatementKind, table: Option<&str>) {
        self.failures.push(FailureRule {
            kind,
            table: table.map(str::to_string),
            remaining: None,
        });
    }

    /// Make only the next matching statement fail.
    pub fn fail_next(&mut self, kind: StatementKind, table: Option<&str>) {
        self.failures.push(FailureRule {
            kind,
            table: table.map(str::to_string),
            remaining: Some(1),
        });
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    fn check_failure(&mut self, kind: StatementKind, table: &str) -> StorageResult<()> {
        let Some(index) = self.failures.iter().position(|rule| {
            rule.kind == kind && rule.table.as_deref().is_none_or(|t| t == table)
        }) else {
            return Ok(());
        };
        let exhausted = match self.failures[index].remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            self.failures.remove(index);
        }
        Err(StorageError::Rejected(format!("{} on '{}' rejected", kind, table)))
    }

    fn table_mut(&mut self, name: &str) -> StorageResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn record(&mut self, change: Change) {
        if let Some(journal) = self.journal.as_mut() {
            journal.record(change);
        }
    }

    fn log(&mut self, statement: String) {
        debug!(statement = %statement, "in-memory statement");
        self.statements.push(statement);
    }

    fn render_filter(&self, filter: &Filter) -> String {
        match filter {
            Filter::Eq(field, Value::Null) => format!("{} IS NULL", self.escape_identifier(field)),
            Filter::Eq(field, value) => format!(
                "{} = {}",
                self.escape_identifier(field),
                self.format_value(value)
            ),
            Filter::In(field, values) => format!(
                "{} IN ({})",
                self.escape_identifier(field),
                self.format_value_list(values)
            ),
            Filter::And(filters) => self.render_group(filters, " AND "),
            Filter::Or(filters) => self.render_group(filters, " OR "),
            Filter::Not(filter) => format!("NOT ({})", self.render_filter(filter)),
        }
    }

    fn render_group(&self, filters: &[Filter], separator: &str) -> String {
        let parts: Vec<String> = filters
            .iter()
            .map(|filter| format!("({})", self.render_filter(filter)))
            .collect();
        parts.join(separator)
    }

    fn render_limit(limit: Option<usize>) -> String {
        limit.map(|limit| format!(" LIMIT {}", limit)).unwrap_or_default()
    }
}

impl StorageAdapter for InMemoryAdapter {
    fn select(&mut self, query: &SelectQuery) -> StorageResult<Vec<Row>> {
        let projection = match &query.fields {
            Some(fields) => fields
                .iter()
                .map(|f| self.escape_identifier(f))
                .collect::<Vec<_>>()
                .join(", "),
            None => "*".to_string(),
        };
        let mut sql = format!("SELECT {} FROM {}", projection, self.escape_identifier(&query.table));
        if let Some(filter) = &query.filter {
            sql.push_str(&format!(" WHERE {}", self.render_filter(filter)));
        }
        sql.push_str(&Self::render_limit(query.limit));
        self.log(sql);

        self.check_failure(StatementKind::Select, &query.table)?;
        self.table(&query.table)?.select(
            query.fields.as_deref(),
            query.filter.as_ref(),
            &query.order_by,
            query.offset,
            query.limit,
        )
    }

    fn insert(&mut self, query: &InsertQuery) -> StorageResult<Value> {
        let columns: Vec<String> = query.values.keys().map(|c| self.escape_identifier(c)).collect();
        let values: Vec<Value> = query.values.values().cloned().collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.escape_identifier(&query.table),
            columns.join(", "),
            self.format_value_list(&values)
        );
        self.log(sql);

        self.check_failure(StatementKind::Insert, &query.table)?;
        let id = self.table_mut(&query.table)?.insert(&query.values)?;
        self.record(Change::InsertRow {
            table: query.table.clone(),
            id: id.clone(),
        });
        Ok(id)
    }

    fn update(&mut self, query: &UpdateQuery) -> StorageResult<u64> {
        let assignments: Vec<String> = query
            .values
            .iter()
            .map(|(field, value)| {
                format!("{} = {}", self.escape_identifier(field), self.format_value(value))
            })
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}{}",
            self.escape_identifier(&query.table),
            assignments.join(", "),
            self.render_filter(&query.filter),
            Self::render_limit(query.limit)
        );
        self.log(sql);

        self.check_failure(StatementKind::Update, &query.table)?;
        let previous = self
            .table_mut(&query.table)?
            .update(&query.values, &query.filter, query.limit)?;
        let affected = previous.len() as u64;
        for old_row in previous {
            self.record(Change::UpdateRow {
                table: query.table.clone(),
                old_row,
            });
        }
        Ok(affected)
    }

    fn delete(&mut self, query: &DeleteQuery) -> StorageResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {}{}",
            self.escape_identifier(&query.table),
            self.render_filter(&query.filter),
            Self::render_limit(query.limit)
        );
        self.log(sql);

        self.check_failure(StatementKind::Delete, &query.table)?;
        let removed = self
            .table_mut(&query.table)?
            .delete(&query.filter, query.limit)?;
        let affected = removed.len() as u64;
        for (position, old_row) in removed {
            self.record(Change::DeleteRow {
                table: query.table.clone(),
                position,
                old_row,
            });
        }
        Ok(affected)
    }

    fn escape_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn begin(&mut self) -> StorageResult<bool> {
        if self.journal.is_some() {
            return Err(StorageError::Transaction("Transaction already open".to_string()));
        }
        self.log("BEGIN".to_string());
        self.journal = Some(Journal::default());
        Ok(true)
    }

    fn commit(&mut self) -> StorageResult<()> {
        if self.journal.take().is_none() {
            return Err(StorageError::Transaction("No open transaction".to_string()));
        }
        self.log("COMMIT".to_string());
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        let Some(mut journal) = self.journal.take() else {
            return Err(StorageError::Transaction("No open transaction".to_string()));
        };
        self.log("ROLLBACK".to_string());
        let changes: Vec<Change> = journal.drain_reversed().collect();
        for change in changes {
            match change {
                Change::InsertRow { table, id } => self.table_mut(&table)?.remove_by_id(&id),
                Change::UpdateRow { table, old_row } => self.table_mut(&table)?.replace_row(old_row),
                Change::DeleteRow {
                    table,
                    position,
                    old_row,
                } => self.table_mut(&table)?.restore_row(position, old_row),
            }
        }
        Ok(())
    }
}
