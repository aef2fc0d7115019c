use crate::core::{Row, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row predicate carried by select, update and delete statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In(field.into(), values)
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            filter => Self::And(vec![filter, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            filter => Self::Or(vec![filter, other]),
        }
    }

    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluates the predicate against a row. Missing fields compare as NULL.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(field, value) => row.get(field).unwrap_or(&Value::Null) == value,
            Self::In(field, values) => {
                let current = row.get(field).unwrap_or(&Value::Null);
                values.iter().any(|value| value == current)
            }
            Self::And(filters) => filters.iter().all(|filter| filter.matches(row)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(row)),
            Self::Not(filter) => !filter.matches(row),
        }
    }

    /// Lists the field names the predicate refers to.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Eq(field, _) | Self::In(field, _) => vec![field.as_str()],
            Self::And(filters) | Self::Or(filters) => {
                filters.iter().flat_map(Filter::fields).collect()
            }
            Self::Not(filter) => filter.fields(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: String,
    /// Projection; `None` selects every column.
    pub fields: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub order_by: Vec<(String, OrderDirection)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: None,
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a predicate, combined with any existing one using AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub(crate) fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertQuery {
    pub table: String,
    pub values: Row,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub table: String,
    pub values: Row,
    pub filter: Filter,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteQuery {
    pub table: String,
    pub filter: Filter,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn test_filter_matching() {
        let row = row! { "id" => 3, "name" => "Alice", "role" => "admin" };

        assert!(Filter::eq("id", 3).matches(&row));
        assert!(!Filter::eq("id", 4).matches(&row));
        assert!(Filter::eq("missing", Value::Null).matches(&row));
        assert!(
            Filter::in_list("role", vec!["user".into(), "admin".into()]).matches(&row)
        );
        assert!(Filter::eq("id", 3).and(Filter::eq("name", "Alice")).matches(&row));
        assert!(Filter::eq("id", 9).or(Filter::eq("name", "Alice")).matches(&row));
        assert!(Filter::eq("id", 9).not().matches(&row));
    }

    #[test]
    fn test_select_filter_combines_with_and() {
        let query = SelectQuery::new("user")
            .filter(Filter::eq("a", 1))
            .filter(Filter::eq("b", 2));
        assert_eq!(
            query.filter,
            Some(Filter::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)]))
        );
        assert_eq!(query.filter.as_ref().map(Filter::fields), Some(vec!["a", "b"]));
    }
}
