#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use rowkeeper::config::{FixedClock, PersistConfig, PersistContext, RequestContext};
use rowkeeper::entity::{EntityClass, Repository};
use rowkeeper::row;
use rowkeeper::schema::EntitySchema;
use rowkeeper::storage::{InMemoryAdapter, InsertQuery, StorageAdapter};
use rowkeeper::validation::rules;
use std::sync::{Arc, Mutex};

/// 2024-01-02 03:04:05 UTC
pub const FIXED_TIMESTAMP: i64 = 1_704_164_645;
pub const FIXED_DATE: &str = "2024-01-02 03:04:05";
pub const CLIENT_IP: &str = "10.0.0.9";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn article_schema() -> EntitySchema {
    EntitySchema::builder("Article", "article")
        .fields(["title", "views", "created_time", "created_ip", "updated_date"])
        .editable(["title", "views"])
        .rule("title", rules::required_text(40))
        .rule("views", rules::optional(rules::integer_range(0, 1_000_000)))
        .create_event("created")
        .update_event("updated")
        .build()
        .unwrap()
}

pub fn context(config: PersistConfig) -> PersistContext {
    PersistContext::new(config)
        .with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()))
        .with_request(RequestContext::new().client_ip(CLIENT_IP).user_agent("tests"))
}

/// Adapter holding an `article` table with three rows, ids 1 to 3.
pub fn seeded_adapter() -> Arc<Mutex<InMemoryAdapter>> {
    let mut adapter = InMemoryAdapter::new()
        .with_table(article_schema().table_schema())
        .unwrap();
    for (title, views) in [("First", 10), ("Second", 20), ("Third", 30)] {
        adapter
            .insert(&InsertQuery {
                table: "article".to_string(),
                values: row! { "title" => title, "views" => views },
            })
            .unwrap();
    }
    adapter.clear_statements();
    adapter.into_shared()
}

pub struct Fixture {
    pub adapter: Arc<Mutex<InMemoryAdapter>>,
    pub repository: Repository,
}

impl Fixture {
    pub fn new(config: PersistConfig) -> Self {
        Self::with_class(EntityClass::new(article_schema()), config)
    }

    pub fn with_class(class: EntityClass, config: PersistConfig) -> Self {
        init_tracing();
        let adapter = seeded_adapter();
        let repository =
            Repository::new(class, adapter.clone(), Arc::new(context(config))).unwrap();
        Self { adapter, repository }
    }

    pub fn statement_count(&self) -> usize {
        self.adapter.lock().unwrap().statement_count()
    }

    pub fn statements(&self) -> Vec<String> {
        self.adapter.lock().unwrap().statements().to_vec()
    }

    pub fn row_count(&self) -> usize {
        self.adapter.lock().unwrap().row_count("article")
    }

    pub fn stored(&self, id: i64, field: &str) -> rowkeeper::Value {
        self.adapter
            .lock()
            .unwrap()
            .find_row("article", &rowkeeper::Value::Integer(id))
            .and_then(|mut row| row.remove(field))
            .unwrap_or_default()
    }
}
