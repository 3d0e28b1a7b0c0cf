//! Integration tests for loading, commit, and rollback

use weft_data::{EventRecorder, ObjectState, RelationEndPointId};
use weft_foundation::{ErrorKind, ObjectId, StorageFailure, Value};
use weft_transaction::TransactionConfig;
use weft_transaction::testing::{customer, item, order, seeded_transaction, seeded_transaction_with};

use crate::init_tracing;

// =============================================================================
// Loading
// =============================================================================

#[test]
fn every_fact_is_loaded_once() {
    let (tx, storage) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    let orders = RelationEndPointId::new(customer(1), "Orders");

    let first = tx.related_objects(&ada, "Orders").unwrap().get(0).cloned().unwrap();
    assert_eq!(storage.load_count(&order(1)), 0);

    assert_eq!(tx.value(&first, "Number").unwrap(), Value::Int(10));
    tx.value(&first, "Number").unwrap();
    tx.related_objects(&ada, "Orders").unwrap();
    tx.related_object(&first, "Customer").unwrap();

    assert_eq!(storage.load_count(&customer(1)), 1);
    assert_eq!(storage.load_count(&order(1)), 1);
    assert_eq!(storage.related_load_count(&orders), 1);
}

#[test]
fn collections_load_in_sort_order() {
    let (tx, _) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    assert_eq!(tx.related_objects(&ada, "Orders").unwrap().ids(), vec![order(1), order(2)]);
}

#[test]
fn loads_are_announced() {
    let (tx, _) = seeded_transaction();
    let recorder = EventRecorder::new();
    tx.subscribe(recorder.clone()).unwrap();

    tx.get_object(&customer(1)).unwrap();
    tx.get_object(&customer(1)).unwrap();

    assert_eq!(recorder.summaries(), vec!["ObjectsLoaded(1)"]);
}

// =============================================================================
// Commit
// =============================================================================

#[test]
fn commit_writes_changes_and_is_idempotent() {
    init_tracing();
    let (tx, storage) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    tx.set_value(&ada, "Name", "Lovelace").unwrap();
    let recorder = EventRecorder::new();
    tx.subscribe(recorder.clone()).unwrap();

    tx.commit().unwrap();
    assert_eq!(storage.stored_value(&customer(1), "Name"), Some(Value::string("Lovelace")));
    assert_eq!(tx.state(&ada).unwrap(), ObjectState::Unchanged);
    assert_eq!(tx.original_value(&ada, "Name").unwrap(), Value::string("Lovelace"));
    assert!(!tx.has_been_touched(&ada, "Name").unwrap());
    assert_eq!(tx.timestamp(&ada).unwrap(), storage.timestamp(&customer(1)));

    tx.commit().unwrap();
    assert_eq!(storage.save_count(), 1);
    assert_eq!(
        recorder.summaries(),
        vec!["Committing(1)", "Committed(1)", "Committing(0)", "Committed(0)"]
    );
}

#[test]
fn new_objects_get_a_token_on_commit() {
    let (tx, storage) = seeded_transaction();
    let lin = tx.new_object("Customer").unwrap();
    tx.set_value(&lin, "Name", "Lin").unwrap();
    assert_eq!(tx.state(&lin).unwrap(), ObjectState::New);
    assert_eq!(tx.timestamp(&lin).unwrap(), None);
    assert!(!storage.contains(lin.id()));

    tx.commit().unwrap();

    assert_eq!(tx.state(&lin).unwrap(), ObjectState::Unchanged);
    assert_eq!(storage.stored_value(lin.id(), "Name"), Some(Value::string("Lin")));
    assert_eq!(tx.timestamp(&lin).unwrap(), storage.timestamp(lin.id()));
}

#[test]
fn new_object_ids_are_unique() {
    let (tx, _) = seeded_transaction();
    let first = tx.new_object("Customer").unwrap();
    let second = tx.new_object("Customer").unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(first.class_id().as_str(), "Customer");
}

#[test]
fn relation_only_changes_are_committed() {
    let (tx, storage) = seeded_transaction();
    let grace = tx.get_object(&customer(2)).unwrap();
    let first = tx.get_object(&order(1)).unwrap();
    tx.related_collection(&grace, "Orders").unwrap().add(&first).unwrap();

    tx.commit().unwrap();

    assert_eq!(storage.stored_value(&order(1), "Customer"), Some(Value::Object(customer(2))));
    assert_eq!(tx.state(&grace).unwrap(), ObjectState::Unchanged);
    assert_eq!(
        tx.original_related_objects(&grace, "Orders").unwrap().ids(),
        vec![order(3), order(1)]
    );
}

#[test]
fn mark_as_changed_forces_a_write() {
    let (tx, storage) = seeded_transaction();
    let grace = tx.get_object(&customer(2)).unwrap();
    let before = storage.timestamp(&customer(2));

    tx.mark_as_changed(&grace).unwrap();
    assert_eq!(tx.state(&grace).unwrap(), ObjectState::Changed);
    tx.commit().unwrap();

    assert_eq!(storage.save_count(), 1);
    assert_ne!(storage.timestamp(&customer(2)), before);
}

#[test]
fn failed_save_leaves_the_transaction_untouched() {
    let (tx, storage) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    let lin = tx.new_object("Customer").unwrap();
    tx.set_value(&ada, "Name", "Lovelace").unwrap();
    storage.fail_next_save(StorageFailure::Rejected("disk full".into()));

    let err = tx.commit().unwrap_err();

    assert!(matches!(err.kind, ErrorKind::Storage(StorageFailure::Rejected(_))));
    assert_eq!(tx.state(&ada).unwrap(), ObjectState::Changed);
    assert_eq!(tx.state(&lin).unwrap(), ObjectState::New);
    assert_eq!(storage.stored_value(&customer(1), "Name"), Some(Value::string("Ada")));

    tx.commit().unwrap();
    assert_eq!(storage.stored_value(&customer(1), "Name"), Some(Value::string("Lovelace")));
    assert!(storage.contains(lin.id()));
}

#[test]
fn stale_token_is_a_concurrency_violation() {
    let (tx, storage) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    tx.set_value(&ada, "Name", "Lovelace").unwrap();
    storage.bump_timestamp(&customer(1));

    let err = tx.commit().unwrap_err();

    assert!(matches!(
        &err.kind,
        ErrorKind::Storage(StorageFailure::ConcurrencyViolation(id)) if *id == customer(1)
    ));
    assert_eq!(tx.state(&ada).unwrap(), ObjectState::Changed);
    assert_eq!(storage.stored_value(&customer(1), "Name"), Some(Value::string("Ada")));
}

#[test]
fn mandatory_relations_are_checked_before_writing() {
    let (tx, storage) = seeded_transaction();
    let first = tx.get_object(&order(1)).unwrap();
    let ink = tx.new_object("OrderItem").unwrap();
    tx.set_value(&ink, "Product", "Ink refill").unwrap();

    let err = tx.commit().unwrap_err();
    assert!(matches!(
        &err.kind,
        ErrorKind::MandatoryRelationNotSet { object, .. } if object == ink.id()
    ));
    assert_eq!(storage.save_count(), 0);

    tx.related_collection(&first, "OrderItems").unwrap().add(&ink).unwrap();
    tx.commit().unwrap();
    assert_eq!(storage.stored_value(ink.id(), "Order"), Some(Value::Object(order(1))));
}

#[test]
fn mandatory_check_can_be_disabled() {
    let config = TransactionConfig::default().with_validate_mandatory_relations(false);
    let (tx, storage) = seeded_transaction_with(config);
    let ink = tx.new_object("OrderItem").unwrap();

    tx.commit().unwrap();
    assert_eq!(storage.stored_value(ink.id(), "Order"), Some(Value::Null));
}

// =============================================================================
// Rollback
// =============================================================================

#[test]
fn rollback_reverts_every_kind_of_change() {
    let (tx, storage) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    let grace = tx.get_object(&customer(2)).unwrap();
    let first = tx.get_object(&order(1)).unwrap();
    let pen = tx.get_object(&item(1)).unwrap();
    let draft = tx.new_object("Order").unwrap();

    tx.set_value(&ada, "Name", "Lovelace").unwrap();
    tx.related_collection(&grace, "Orders").unwrap().add(&first).unwrap();
    tx.related_collection(&grace, "Orders").unwrap().add(&draft).unwrap();
    tx.delete(&pen).unwrap();

    tx.rollback().unwrap();

    assert_eq!(tx.value(&ada, "Name").unwrap(), Value::string("Ada"));
    assert_eq!(tx.related_object(&first, "Customer").unwrap(), Some(ada.clone()));
    assert_eq!(tx.related_objects(&grace, "Orders").unwrap().ids(), vec![order(3)]);
    assert_eq!(tx.related_objects(&first, "OrderItems").unwrap().len(), 2);
    for object in [&ada, &grace, &first, &pen] {
        assert_eq!(tx.state(object).unwrap(), ObjectState::Unchanged);
    }
    assert_eq!(tx.state(&draft).unwrap(), ObjectState::Discarded);
    assert_eq!(storage.save_count(), 0);
}

#[test]
fn rollback_then_commit_writes_nothing() {
    let (tx, storage) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    tx.set_value(&ada, "Name", "Lovelace").unwrap();

    tx.rollback().unwrap();
    tx.commit().unwrap();

    assert_eq!(storage.save_count(), 0);
    assert!(storage.contains(&ObjectId::int("Customer", 1)));
}
