/// Entity tests
///
/// Change tracking, loading through the identity cache, save/update/remove
/// and the write-back of released entities.
/// Run with: cargo test --test entity_tests

mod common;

use common::{FIXED_DATE, Fixture};
use rowkeeper::entity::{EntityClass, EntityHooks, HookContext, LoadInput, SavedTarget};
use rowkeeper::schema::EntitySchema;
use rowkeeper::storage::{DeleteQuery, Filter, StatementKind, StorageAdapter, UpdateQuery};
use rowkeeper::{PersistConfig, PersistError, Row, Value, row};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn test_set_value_tracks_and_cancels_changes() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(1).unwrap();

    assert!(!article.has_changes().unwrap());
    assert!(article.set_value("title", "Renamed").unwrap());
    assert!(!article.set_value("title", "Renamed").unwrap());
    assert!(article.set_value("title", "Renamed again").unwrap());
    assert_eq!(article.modified_fields().unwrap(), vec!["title".to_string()]);

    // Back to the stored value: clean again
    assert!(article.set_value("title", "First").unwrap());
    assert!(!article.has_changes().unwrap());
}

#[test]
fn test_revert_restores_original_values() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(2).unwrap();

    article.set_value("title", "Changed").unwrap();
    article.set_value("views", 999).unwrap();
    assert_eq!(article.modified_fields().unwrap(), fields(&["title", "views"]));

    article.revert().unwrap();
    assert!(!article.has_changes().unwrap());
    assert_eq!(article.get_value("title").unwrap(), Value::from("Second"));
    assert_eq!(article.get_value("views").unwrap(), Value::Integer(20));
}

#[test]
fn test_set_value_rejects_id_and_unknown_fields() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(1).unwrap();

    assert!(matches!(
        article.set_value("id", 42),
        Err(PersistError::IdNotEditable { .. })
    ));
    assert!(matches!(
        article.set_value("missing", 1),
        Err(PersistError::FieldNotFound { .. })
    ));
    assert!(matches!(article.get_value("missing"), Err(PersistError::FieldNotFound { .. })));
    assert!(!article.has_changes().unwrap());
}

#[test]
fn test_load_missing_row() {
    let fixture = Fixture::new(PersistConfig::default());

    assert!(fixture.repository.load(99, true, true).unwrap().is_none());
    match fixture.repository.load(99, false, true) {
        Err(PersistError::NotFound { message, domain }) => {
            assert_eq!(message, "objectNotFound");
            assert_eq!(domain.as_deref(), Some("article"));
        }
        other => panic!("expected not found, got {:?}", other),
    }
}

#[test]
fn test_cache_shares_instances() {
    let fixture = Fixture::new(PersistConfig::default());
    let first = fixture.repository.load_required(1).unwrap();
    let second = fixture.repository.load_required(1).unwrap();
    let uncached = fixture.repository.load(1, false, false).unwrap().unwrap();

    assert!(first.same_instance(&second));
    assert!(!first.same_instance(&uncached));
    assert_eq!(first, uncached);

    first.set_value("title", "Shared").unwrap();
    assert_eq!(second.get_value("title").unwrap(), Value::from("Shared"));
    assert_eq!(uncached.get_value("title").unwrap(), Value::from("First"));
    first.revert().unwrap();
}

#[test]
fn test_save_writes_dirty_fields_only() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(1).unwrap();

    article.set_value("title", "Edited").unwrap();
    assert!(article.save().unwrap());

    let statements = fixture.statements();
    assert_eq!(
        statements[1],
        "UPDATE \"article\" SET \"title\" = 'Edited' WHERE \"id\" = 1 LIMIT 1"
    );
    assert!(!article.has_changes().unwrap());
    assert_eq!(fixture.stored(1, "title"), Value::from("Edited"));

    let count = fixture.statement_count();
    assert!(!article.save().unwrap());
    assert_eq!(fixture.statement_count(), count);
}

#[test]
fn test_failed_save_keeps_changes() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(3).unwrap();
    fixture
        .adapter
        .lock()
        .unwrap()
        .fail_next(StatementKind::Update, Some("article"));

    article.set_value("views", 31).unwrap();
    assert!(!article.save().unwrap());
    assert!(article.has_changes().unwrap());
    assert_eq!(fixture.stored(3, "views"), Value::Integer(30));

    assert!(article.save().unwrap());
    assert_eq!(fixture.stored(3, "views"), Value::Integer(31));
}

#[test]
fn test_update_rejects_invalid_input() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(1).unwrap();

    let outcome = article
        .update(&row! { "title" => "   ", "views" => 5 }, Some(fields(&["title", "views"]).as_slice()))
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.error_count(), 1);
    let error = &outcome.validation.errors()[0];
    assert_eq!(error.field(), Some("title"));
    assert_eq!(error.message, "title_required");
    assert_eq!(fixture.stored(1, "views"), Value::Integer(10));
}

#[test]
fn test_update_applies_and_fills_audit_fields() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(2).unwrap();

    let outcome = article
        .update(&row! { "title" => " Fresh ", "views" => "21" }, None)
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.error_count(), 0);
    assert_eq!(article.get_value("title").unwrap(), Value::from("Fresh"));
    assert_eq!(article.get_value("views").unwrap(), Value::Integer(21));
    assert_eq!(article.get_value("updated_date").unwrap(), Value::from(FIXED_DATE));
    assert_eq!(fixture.stored(2, "updated_date"), Value::from(FIXED_DATE));
    assert!(!article.has_changes().unwrap());
}

#[test]
fn test_update_without_changes_writes_nothing() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(2).unwrap();
    let count = fixture.statement_count();

    let outcome = article
        .update(&row! { "title" => "Second", "views" => 20 }, None)
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.error_count(), 0);
    assert_eq!(fixture.statement_count(), count);
    assert_eq!(fixture.stored(2, "updated_date"), Value::Null);
}

#[test]
fn test_remove_twice_hits_storage_once() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(1).unwrap();

    assert!(article.remove().unwrap());
    assert!(article.is_deleted().unwrap());
    assert!(!article.is_valid().unwrap());
    assert_eq!(fixture.row_count(), 2);

    let count = fixture.statement_count();
    assert!(!article.remove().unwrap());
    assert_eq!(fixture.statement_count(), count);
}

#[test]
fn test_reload_marks_vanished_row_deleted() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(2).unwrap();
    fixture
        .adapter
        .lock()
        .unwrap()
        .delete(&DeleteQuery {
            table: "article".to_string(),
            filter: Filter::eq("id", 2),
            limit: None,
        })
        .unwrap();

    assert!(!article.reload().unwrap());
    assert!(article.is_deleted().unwrap());
    assert!(!article.save().unwrap());
}

#[test]
fn test_reload_swallows_storage_errors() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(2).unwrap();
    fixture
        .adapter
        .lock()
        .unwrap()
        .fail_next(StatementKind::Select, None);

    assert!(!article.reload().unwrap());
    assert!(article.is_deleted().unwrap());
}

#[test]
fn test_reload_field_keeps_other_changes() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(1).unwrap();
    article.set_value("title", "Local").unwrap();
    article.set_value("views", 11).unwrap();
    fixture
        .adapter
        .lock()
        .unwrap()
        .update(&UpdateQuery {
            table: "article".to_string(),
            values: row! { "views" => 500 },
            filter: Filter::eq("id", 1),
            limit: None,
        })
        .unwrap();

    assert!(article.reload_field("views").unwrap());
    assert_eq!(article.get_value("views").unwrap(), Value::Integer(500));
    assert_eq!(article.modified_fields().unwrap(), fields(&["title"]));
    assert!(
        fixture
            .statements()
            .contains(&"SELECT \"views\" FROM \"article\" WHERE \"id\" = 1 LIMIT 1".to_string())
    );
    article.revert().unwrap();
}

#[test]
fn test_log_event_sets_audit_fields() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(1).unwrap();

    article.log_event("created").unwrap();
    assert_eq!(
        article.modified_fields().unwrap(),
        fields(&["created_time", "created_ip"])
    );
    assert_eq!(
        article.get_value("created_time").unwrap(),
        Value::Integer(common::FIXED_TIMESTAMP)
    );
    assert_eq!(article.get_value("created_ip").unwrap(), Value::from(common::CLIENT_IP));

    // No audit field for this event
    article.log_event("archived").unwrap();
    assert_eq!(article.modified_fields().unwrap().len(), 2);
    article.revert().unwrap();
}

#[test]
fn test_released_entity_saves_pending_changes() {
    let fixture = Fixture::new(PersistConfig::default());
    {
        let article = fixture.repository.load(2, false, false).unwrap().unwrap();
        article.set_value("title", "Written on release").unwrap();
    }
    assert_eq!(fixture.stored(2, "title"), Value::from("Written on release"));
}

#[test]
fn test_released_entity_failure_is_only_logged() {
    let fixture = Fixture::new(PersistConfig::default());
    fixture
        .adapter
        .lock()
        .unwrap()
        .fail_on(StatementKind::Update, Some("article"));
    {
        let article = fixture.repository.load(2, false, false).unwrap().unwrap();
        article.set_value("title", "Lost").unwrap();
    }
    assert_eq!(fixture.stored(2, "title"), Value::from("Second"));
    fixture.adapter.lock().unwrap().clear_failures();
}

#[test]
fn test_cached_entity_is_saved_when_cache_is_cleared() {
    let fixture = Fixture::new(PersistConfig::default());
    let article = fixture.repository.load_required(3).unwrap();
    article.set_value("views", 33).unwrap();
    drop(article);

    // The cache still holds the instance
    assert_eq!(fixture.stored(3, "views"), Value::Integer(30));
    assert_eq!(fixture.repository.clear_all_instances().unwrap(), 1);
    assert_eq!(fixture.stored(3, "views"), Value::Integer(33));
}

#[derive(Default)]
struct CountingHooks {
    saved: Arc<AtomicUsize>,
}

impl EntityHooks for CountingHooks {
    fn on_saved(&self, _hooks: HookContext<'_>, _data: &Row, target: SavedTarget<'_>) -> rowkeeper::Result<()> {
        self.saved.fetch_add(1, Ordering::SeqCst);
        if let SavedTarget::Updated(entity) = target {
            // Saving again from the hook must not call the hook again
            entity.set_value("views", 7)?;
            entity.save()?;
        }
        Ok(())
    }
}

#[test]
fn test_saved_hook_runs_once_per_save() {
    let saved = Arc::new(AtomicUsize::new(0));
    let class = EntityClass::new(common::article_schema()).with_hooks(CountingHooks {
        saved: Arc::clone(&saved),
    });
    let fixture = Fixture::with_class(class, PersistConfig::default());
    let article = fixture.repository.load_required(1).unwrap();

    article.set_value("title", "Hooked").unwrap();
    assert!(article.save().unwrap());

    assert_eq!(saved.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.stored(1, "title"), Value::from("Hooked"));
    assert_eq!(fixture.stored(1, "views"), Value::Integer(7));
    assert!(!article.has_changes().unwrap());
}

#[test]
fn test_evicted_entity_keeps_its_identity() {
    let fixture = Fixture::new(PersistConfig::new().cache_capacity(1));
    let first = fixture.repository.load_required(1).unwrap();
    fixture.repository.load_required(2).unwrap();

    let again = fixture.repository.load_required(1).unwrap();
    assert!(first.same_instance(&again));

    first.set_value("title", "Seen by both").unwrap();
    assert_eq!(again.get_value("title").unwrap(), Value::from("Seen by both"));
    assert!(again.has_changes().unwrap());
}

#[test]
fn test_reload_integrity_failure_keeps_changes() {
    let schema = EntitySchema::builder("Article", "article")
        .extends(&Arc::new(common::article_schema()))
        .fields(["subtitle"])
        .build()
        .unwrap();
    let fixture = Fixture::with_class(EntityClass::new(schema), PersistConfig::default());
    let row = row! {
        "id" => 1,
        "title" => "First",
        "views" => 10,
        "created_time" => Value::Null,
        "created_ip" => Value::Null,
        "updated_date" => Value::Null,
        "subtitle" => "Not in the table",
    };
    let article = fixture
        .repository
        .load(LoadInput::Row(row), false, true)
        .unwrap()
        .unwrap();
    article.set_value("title", "Pending").unwrap();

    assert!(matches!(
        article.reload(),
        Err(PersistError::OutOfDateSchema { field, .. }) if field == "subtitle"
    ));
    assert!(article.has_changes().unwrap());
    assert_eq!(article.get_value("title").unwrap(), Value::from("Pending"));
}

struct RefusingHooks;

impl EntityHooks for RefusingHooks {
    fn on_saved(
        &self,
        _hooks: HookContext<'_>,
        data: &Row,
        _target: SavedTarget<'_>,
    ) -> rowkeeper::Result<()> {
        if data.get("title") == Some(&Value::from("Refused")) {
            return Err(PersistError::User {
                message: "saveRefused".to_string(),
                domain: None,
            });
        }
        Ok(())
    }
}

#[test]
fn test_flush_saves_past_a_failing_entity() {
    let class = EntityClass::new(common::article_schema()).with_hooks(RefusingHooks);
    let fixture = Fixture::with_class(class, PersistConfig::default());
    let refused = fixture.repository.load_required(1).unwrap();
    let accepted = fixture.repository.load_required(2).unwrap();
    let also_accepted = fixture.repository.load_required(3).unwrap();

    refused.set_value("title", "Refused").unwrap();
    accepted.set_value("title", "Accepted").unwrap();
    also_accepted.set_value("views", 31).unwrap();

    assert!(matches!(
        fixture.repository.flush(),
        Err(PersistError::User { message, .. }) if message == "saveRefused"
    ));
    assert_eq!(fixture.stored(2, "title"), Value::from("Accepted"));
    assert_eq!(fixture.stored(3, "views"), Value::Integer(31));
    assert!(!accepted.has_changes().unwrap());
    assert!(!also_accepted.has_changes().unwrap());
}
