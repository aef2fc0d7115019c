// ============================================================================
// Entity schema
// ============================================================================
//
// Immutable description of one entity class: table, identifier, declared
// fields, editable fields, per-field rules and audit event names. Schemas
// are composed once at registration time through `SchemaBuilder`, which
// also performs the single-level merge with a parent schema.
//
// ============================================================================

use crate::core::{PersistError, Result};
use crate::storage::TableSchema;
use crate::validation::FieldRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_ID_FIELD: &str = "id";

/// Prefixes of the audit fields filled on each lifecycle event.
///
/// With the default `create` prefix, a schema declaring `create_date` and
/// `create_ip` gets both filled when a row is inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvents {
    pub create: String,
    pub edit: String,
    pub update: String,
}

impl Default for LifecycleEvents {
    fn default() -> Self {
        Self {
            create: "create".to_string(),
            edit: "edit".to_string(),
            update: "update".to_string(),
        }
    }
}

pub struct EntitySchema {
    class_name: String,
    table: String,
    id_field: String,
    fields: Vec<String>,
    editable_fields: Option<Vec<String>>,
    rules: BTreeMap<String, FieldRule>,
    domain: Option<String>,
    instance: Option<String>,
    events: LifecycleEvents,
}

impl EntitySchema {
    pub fn builder(class_name: impl Into<String>, table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(class_name, table)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Declared fields, identifier first.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn editable_fields(&self) -> Option<&[String]> {
        self.editable_fields.as_deref()
    }

    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.rules.get(field)
    }

    pub fn rule_fields(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Translation domain; the table name unless one was set.
    pub fn domain(&self) -> &str {
        self.domain.as_deref().unwrap_or(&self.table)
    }

    /// Adapter instance name; `None` uses the registry default.
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn events(&self) -> &LifecycleEvents {
        &self.events
    }

    pub fn is_field_editable(&self, field: &str) -> bool {
        if field == self.id_field {
            return false;
        }
        match &self.editable_fields {
            Some(editable) => editable.iter().any(|f| f == field),
            None => self.has_field(field),
        }
    }

    /// Storage table layout matching this schema.
    pub fn table_schema(&self) -> TableSchema {
        TableSchema::new(
            self.table.clone(),
            self.id_field.clone(),
            self.fields.iter().skip(1).cloned(),
        )
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("class_name", &self.class_name)
            .field("table", &self.table)
            .field("id_field", &self.id_field)
            .field("fields", &self.fields)
            .field("editable_fields", &self.editable_fields)
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .field("domain", &self.domain)
            .field("instance", &self.instance)
            .field("events", &self.events)
            .finish()
    }
}

#[derive(Default)]
pub struct SchemaBuilder {
    class_name: String,
    table: String,
    id_field: Option<String>,
    fields: Vec<String>,
    editable_fields: Option<Vec<String>>,
    rules: BTreeMap<String, FieldRule>,
    domain: Option<String>,
    instance: Option<String>,
    events: Option<LifecycleEvents>,
    parent: Option<Arc<EntitySchema>>,
}

impl SchemaBuilder {
    pub fn new(class_name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn id_field(mut self, field: &str) -> Self {
        self.id_field = Some(field.to_string());
        self
    }

    pub fn field(mut self, field: &str) -> Self {
        if !self.fields.iter().any(|f| f == field) {
            self.fields.push(field.to_string());
        }
        self
    }

    pub fn fields<S: AsRef<str>>(self, fields: impl IntoIterator<Item = S>) -> Self {
        fields
            .into_iter()
            .fold(self, |builder, field| builder.field(field.as_ref()))
    }

    pub fn editable<S: AsRef<str>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        let editable = self.editable_fields.get_or_insert_with(Vec::new);
        for field in fields {
            let field = field.as_ref().to_string();
            if !editable.contains(&field) {
                editable.push(field);
            }
        }
        self
    }

    pub fn rule(mut self, field: &str, rule: FieldRule) -> Self {
        self.rules.insert(field.to_string(), rule);
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn instance(mut self, instance: &str) -> Self {
        self.instance = Some(instance.to_string());
        self
    }

    pub fn events(mut self, events: LifecycleEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn create_event(mut self, prefix: &str) -> Self {
        self.events.get_or_insert_with(LifecycleEvents::default).create = prefix.to_string();
        self
    }

    pub fn edit_event(mut self, prefix: &str) -> Self {
        self.events.get_or_insert_with(LifecycleEvents::default).edit = prefix.to_string();
        self
    }

    pub fn update_event(mut self, prefix: &str) -> Self {
        self.events.get_or_insert_with(LifecycleEvents::default).update = prefix.to_string();
        self
    }

    /// Inherit fields, editable fields, rules and settings from `parent`.
    pub fn extends(mut self, parent: &Arc<EntitySchema>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    pub fn build(self) -> Result<EntitySchema> {
        if self.class_name.trim().is_empty() {
            return Err(PersistError::InvalidSchema("class name cannot be empty".into()));
        }
        if self.table.trim().is_empty() {
            return Err(PersistError::InvalidSchema(format!(
                "{} has no table",
                self.class_name
            )));
        }

        let parent = self.parent.as_deref();
        let id_field = self
            .id_field
            .or_else(|| parent.map(|p| p.id_field.clone()))
            .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());

        let mut fields = vec![id_field.clone()];
        let inherited = parent.map(|p| p.fields.as_slice()).unwrap_or(&[]);
        for field in self.fields.iter().chain(inherited) {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }

        let editable_fields = match (self.editable_fields, parent.and_then(|p| p.editable_fields.clone())) {
            (Some(mut own), Some(inherited)) => {
                for field in inherited {
                    if !own.contains(&field) {
                        own.push(field);
                    }
                }
                Some(own)
            }
            (own, inherited) => own.or(inherited),
        };

        let mut rules = parent.map(|p| p.rules.clone()).unwrap_or_default();
        rules.extend(self.rules);

        let schema = EntitySchema {
            class_name: self.class_name,
            table: self.table,
            id_field,
            fields,
            editable_fields,
            rules,
            domain: self.domain,
            instance: self.instance.or_else(|| parent.and_then(|p| p.instance.clone())),
            events: self
                .events
                .or_else(|| parent.map(|p| p.events.clone()))
                .unwrap_or_default(),
        };
        schema.check()?;
        Ok(schema)
    }
}

impl EntitySchema {
    fn check(&self) -> Result<()> {
        let undeclared = self
            .editable_fields
            .iter()
            .flatten()
            .map(String::as_str)
            .chain(self.rule_fields())
            .find(|field| !self.has_field(field));
        if let Some(field) = undeclared {
            return Err(PersistError::InvalidSchema(format!(
                "{} refers to undeclared field '{}'",
                self.class_name, field
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::rules;

    fn base() -> Arc<EntitySchema> {
        Arc::new(
            EntitySchema::builder("Base", "base")
                .fields(["create_date", "create_ip"])
                .editable(["create_ip"])
                .rule("create_ip", rules::passthrough())
                .instance("main")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_defaults() {
        let schema = EntitySchema::builder("User", "user")
            .fields(["name", "email"])
            .build()
            .unwrap();
        assert_eq!(schema.id_field(), "id");
        assert_eq!(schema.fields(), &["id", "name", "email"]);
        assert_eq!(schema.domain(), "user");
        assert_eq!(schema.instance(), None);
        assert_eq!(schema.events().create, "create");
        assert!(schema.is_field_editable("name"));
        assert!(!schema.is_field_editable("id"));
        assert!(!schema.is_field_editable("unknown"));
    }

    #[test]
    fn test_editable_list_restricts() {
        let schema = EntitySchema::builder("User", "user")
            .fields(["name", "role"])
            .editable(["name"])
            .domain("accounts")
            .build()
            .unwrap();
        assert!(schema.is_field_editable("name"));
        assert!(!schema.is_field_editable("role"));
        assert_eq!(schema.domain(), "accounts");
    }

    #[test]
    fn test_extends_merges_parent() {
        let parent = base();
        let child = EntitySchema::builder("User", "user")
            .fields(["name"])
            .editable(["name"])
            .rule("name", rules::required_text(64))
            .extends(&parent)
            .build()
            .unwrap();

        assert_eq!(child.fields(), &["id", "name", "create_date", "create_ip"]);
        assert_eq!(
            child.editable_fields(),
            Some(&["name".to_string(), "create_ip".to_string()][..])
        );
        assert!(child.rule("name").is_some());
        assert!(child.rule("create_ip").is_some());
        assert_eq!(child.instance(), Some("main"));
        assert_eq!(child.domain(), "user");
    }

    #[test]
    fn test_rejects_undeclared_references() {
        let result = EntitySchema::builder("User", "user")
            .fields(["name"])
            .editable(["nickname"])
            .build();
        assert!(matches!(result, Err(PersistError::InvalidSchema(_))));

        let result = EntitySchema::builder("User", "").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_table_schema_layout() {
        let schema = EntitySchema::builder("Token", "token")
            .id_field("key")
            .fields(["value"])
            .build()
            .unwrap();
        let table = schema.table_schema();
        assert_eq!(table.id_field(), "key");
        assert_eq!(table.columns(), &["key", "value"]);
    }
}
