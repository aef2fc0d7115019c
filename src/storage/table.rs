use super::query::{Filter, OrderDirection};
use super::{StorageError, StorageResult};
use crate::core::{Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// How a table assigns identifiers to rows inserted without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdStrategy {
    AutoIncrement,
    Uuid,
    /// The caller always supplies the identifier.
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    id_field: String,
    columns: Vec<String>,
    id_strategy: IdStrategy,
}

impl TableSchema {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        id_field: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        let id_field = id_field.into();
        let mut all_columns = vec![id_field.clone()];
        for column in columns {
            let column = column.into();
            if !all_columns.contains(&column) {
                all_columns.push(column);
            }
        }
        Self {
            name: name.into(),
            id_field,
            columns: all_columns,
            id_strategy: IdStrategy::AutoIncrement,
        }
    }

    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Rows of one table, kept in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: Vec<Row>,
    next_id: i64,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn insert(&mut self, values: &Row) -> StorageResult<Value> {
        self.check_columns(values.keys())?;

        let id_field = self.schema.id_field.clone();
        let id = match values.get(&id_field) {
            Some(id) if !id.is_null() => id.clone(),
            _ => self.next_identifier()?,
        };
        if let Value::Integer(i) = &id
            && *i >= self.next_id
        {
            self.next_id = *i + 1;
        }
        if self.position_of(&id).is_some() {
            return Err(StorageError::Constraint(format!(
                "Duplicate identifier {} in table '{}'",
                id, self.schema.name
            )));
        }

        let mut row: Row = self
            .schema
            .columns
            .iter()
            .map(|column| (column.clone(), values.get(column).cloned().unwrap_or(Value::Null)))
            .collect();
        row.insert(id_field, id.clone());
        self.rows.push(row);
        Ok(id)
    }

    /// Applies `values` to matching rows; returns the previous versions.
    pub fn update(
        &mut self,
        values: &Row,
        filter: &Filter,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Row>> {
        self.check_columns(values.keys())?;
        self.check_columns(filter.fields())?;
        if let Some(new_id) = values.get(&self.schema.id_field) {
            return Err(StorageError::Constraint(format!(
                "Identifier column '{}' cannot be updated (to {})",
                self.schema.id_field, new_id
            )));
        }

        let mut previous = Vec::new();
        for row in self.rows.iter_mut().filter(|row| filter.matches(row)) {
            if limit.is_some_and(|limit| previous.len() >= limit) {
                break;
            }
            previous.push(row.clone());
            for (field, value) in values {
                row.insert(field.clone(), value.clone());
            }
        }
        Ok(previous)
    }

    /// Removes matching rows; returns `(position, row)` pairs in removal order.
    pub fn delete(&mut self, filter: &Filter, limit: Option<usize>) -> StorageResult<Vec<(usize, Row)>> {
        self.check_columns(filter.fields())?;

        let mut removed = Vec::new();
        let mut index = 0;
        while index < self.rows.len() {
            if limit.is_some_and(|limit| removed.len() >= limit) {
                break;
            }
            if filter.matches(&self.rows[index]) {
                removed.push((index, self.rows.remove(index)));
            } else {
                index += 1;
            }
        }
        Ok(removed)
    }

    pub fn select(
        &self,
        fields: Option<&[String]>,
        filter: Option<&Filter>,
        order_by: &[(String, OrderDirection)],
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Row>> {
        if let Some(fields) = fields {
            self.check_columns(fields)?;
        }
        if let Some(filter) = filter {
            self.check_columns(filter.fields())?;
        }

        let mut rows: Vec<&Row> = self
            .rows
            .iter()
            .filter(|row| filter.is_none_or(|filter| filter.matches(row)))
            .collect();

        for (column, direction) in order_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ordering = a
                    .get(column)
                    .partial_cmp(&b.get(column))
                    .unwrap_or(Ordering::Equal);
                match direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            });
        }

        Ok(rows
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .map(|row| match fields {
                Some(fields) => fields
                    .iter()
                    .filter_map(|f| row.get_key_value(f).map(|(k, v)| (k.clone(), v.clone())))
                    .collect(),
                None => row.clone(),
            })
            .collect())
    }

    pub(crate) fn restore_row(&mut self, position: usize, row: Row) {
        let position = position.min(self.rows.len());
        self.rows.insert(position, row);
    }

    pub(crate) fn replace_row(&mut self, row: Row) {
        let Some(id) = row.get(&self.schema.id_field).cloned() else {
            return;
        };
        if let Some(position) = self.position_of(&id) {
            self.rows[position] = row;
        }
    }

    pub(crate) fn remove_by_id(&mut self, id: &Value) {
        if let Some(position) = self.position_of(id) {
            self.rows.remove(position);
        }
    }

    fn position_of(&self, id: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(&self.schema.id_field) == Some(id))
    }

    fn next_identifier(&mut self) -> StorageResult<Value> {
        match self.schema.id_strategy {
            IdStrategy::AutoIncrement => {
                let id = self.next_id;
                self.next_id += 1;
                Ok(Value::Integer(id))
            }
            IdStrategy::Uuid => Ok(Value::Text(Uuid::new_v4().to_string())),
            IdStrategy::Manual => Err(StorageError::Constraint(format!(
                "Table '{}' requires an explicit '{}' value",
                self.schema.name, self.schema.id_field
            ))),
        }
    }

    fn check_columns<I, S>(&self, columns: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            let column = column.as_ref();
            if !self.schema.has_column(column) {
                return Err(StorageError::ColumnNotFound(
                    column.to_string(),
                    self.schema.name.clone(),
                ));
            }
        }
        Ok(())
    }
}
