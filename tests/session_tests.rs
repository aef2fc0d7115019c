/// Session tests
///
/// Class registration, adapter instances, operation sets and flushing of
/// dirty cached entities.
/// Run with: cargo test --test session_tests

mod common;

use common::{article_schema, context, seeded_adapter};
use rowkeeper::entity::{EntityClass, Session};
use rowkeeper::schema::EntitySchema;
use rowkeeper::storage::{AdapterRegistry, InMemoryAdapter};
use rowkeeper::transaction::SetStatus;
use rowkeeper::{PersistConfig, PersistError, Value, row};
use std::sync::{Arc, Mutex};

fn session(config: PersistConfig) -> (Session, Arc<Mutex<InMemoryAdapter>>) {
    common::init_tracing();
    let adapter = seeded_adapter();
    let mut session =
        Session::with_context(AdapterRegistry::single(adapter.clone()), context(config)).unwrap();
    session.register(EntityClass::new(article_schema())).unwrap();
    (session, adapter)
}

fn stored_title(adapter: &Arc<Mutex<InMemoryAdapter>>, id: i64) -> Value {
    adapter
        .lock()
        .unwrap()
        .find_row("article", &Value::Integer(id))
        .and_then(|mut row| row.remove("title"))
        .unwrap_or_default()
}

#[test]
fn test_repository_lookup() {
    let (session, _) = session(PersistConfig::default());

    assert_eq!(session.class_names(), vec!["Article".to_string()]);
    assert!(session.repository("Article").is_ok());
    assert!(matches!(
        session.repository("Comment"),
        Err(PersistError::UnknownClass(name)) if name == "Comment"
    ));
}

#[test]
fn test_flush_saves_dirty_cached_entities() {
    let (session, adapter) = session(PersistConfig::default());
    let articles = session.repository("Article").unwrap();
    let first = articles.load_required(1).unwrap();
    let second = articles.load_required(2).unwrap();
    articles.load_required(3).unwrap();

    first.set_value("title", "Flushed one").unwrap();
    second.set_value("title", "Flushed two").unwrap();
    assert_eq!(session.flush().unwrap(), 2);

    assert_eq!(stored_title(&adapter, 1), Value::from("Flushed one"));
    assert_eq!(stored_title(&adapter, 2), Value::from("Flushed two"));
    assert!(!first.has_changes().unwrap());
    assert_eq!(session.flush().unwrap(), 0);
}

#[test]
fn test_drop_flushes_when_enabled() {
    let (session, adapter) = session(PersistConfig::default());
    let article = session.repository("Article").unwrap().load_required(1).unwrap();
    article.set_value("title", "Saved by session").unwrap();

    drop(session);
    assert_eq!(stored_title(&adapter, 1), Value::from("Saved by session"));
    assert!(!article.has_changes().unwrap());
}

#[test]
fn test_drop_without_flush_leaves_changes_to_the_entity() {
    let (session, adapter) = session(PersistConfig::new().flush_on_drop(false));
    let article = session.repository("Article").unwrap().load_required(1).unwrap();
    article.set_value("title", "Saved on release").unwrap();

    drop(session);
    assert_eq!(stored_title(&adapter, 1), Value::from("First"));
    assert!(article.has_changes().unwrap());

    drop(article);
    assert_eq!(stored_title(&adapter, 1), Value::from("Saved on release"));
}

#[test]
fn test_classes_use_their_adapter_instance() {
    common::init_tracing();
    let main = seeded_adapter();
    let archive_schema = EntitySchema::builder("ArchivedArticle", "article")
        .extends(&Arc::new(article_schema()))
        .instance("archive")
        .build()
        .unwrap();
    let archive = InMemoryAdapter::new()
        .with_table(archive_schema.table_schema())
        .unwrap()
        .into_shared();

    let mut registry = AdapterRegistry::new();
    registry.register("main", main.clone()).register("archive", archive.clone());
    let mut session = Session::with_context(registry, context(PersistConfig::default())).unwrap();
    session.register(EntityClass::new(article_schema())).unwrap();
    let archived = session.register(EntityClass::new(archive_schema)).unwrap();

    let outcome = archived.create(row! { "title" => "Old news" }, None).unwrap();
    assert!(outcome.is_success());
    assert_eq!(archive.lock().unwrap().row_count("article"), 1);
    assert_eq!(main.lock().unwrap().row_count("article"), 3);

    let mut set = session.operation_set(Some("archive")).unwrap();
    let article = archived.load_required(1).unwrap();
    set.add(article.delete_operation());
    assert_eq!(set.save().unwrap().status, SetStatus::Applied);
    assert_eq!(archive.lock().unwrap().row_count("article"), 0);

    assert!(matches!(
        session.operation_set(Some("replica")),
        Err(PersistError::UnknownAdapter(_))
    ));
}

#[test]
fn test_config_from_json() {
    let config = PersistConfig::from_json(r#"{"cache_capacity": 2, "flush_on_drop": false}"#).unwrap();
    assert_eq!(config.cache_capacity, Some(2));
    assert!(!config.flush_on_drop);
    assert!(config.check_field_integrity);

    assert!(matches!(
        PersistConfig::from_json(r#"{"cache_capacity": 0}"#),
        Err(PersistError::Config(_))
    ));
}

#[test]
fn test_session_rejects_invalid_config() {
    let registry = AdapterRegistry::single(seeded_adapter());
    assert!(matches!(
        Session::new(registry, PersistConfig::new().cache_capacity(0)),
        Err(PersistError::Config(_))
    ));

    let registry = AdapterRegistry::single(seeded_adapter());
    assert!(matches!(
        Session::new(registry, PersistConfig::new().default_client_ip(" ")),
        Err(PersistError::Config(_))
    ));
}
