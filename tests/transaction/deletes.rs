//! Integration tests for delete, cascade, and discarded objects

use weft_data::{Cancelled, EventRecorder, ListenerResult, ObjectState, TransactionEvent};
use weft_foundation::{ErrorKind, Value};
use weft_transaction::TransactionConfig;
use weft_transaction::testing::{
    customer, employee, item, order, seeded_transaction, seeded_transaction_with, ticket,
};

use crate::init_tracing;

// =============================================================================
// Single Objects
// =============================================================================

#[test]
fn deleting_a_supervisor_releases_the_subordinates() {
    let (tx, storage) = seeded_transaction();
    let boss = tx.get_object(&employee(1)).unwrap();
    let team = tx.related_objects(&boss, "Subordinates").unwrap();
    let recorder = EventRecorder::new();
    tx.subscribe(recorder.clone()).unwrap();

    tx.delete(&boss).unwrap();

    let events: Vec<_> = recorder
        .summaries()
        .into_iter()
        .filter(|summary| !summary.starts_with("ObjectsLoaded"))
        .collect();
    assert_eq!(
        events,
        vec![
            "Deleting(Employee|1)",
            "RelationChanging(Employee|2.Supervisor)",
            "RelationChanging(Employee|3.Supervisor)",
            "RelationChanged(Employee|2.Supervisor)",
            "RelationChanged(Employee|3.Supervisor)",
            "Deleted(Employee|1)",
        ]
    );
    assert_eq!(tx.state(&boss).unwrap(), ObjectState::Deleted);
    for worker in team.iter() {
        assert_eq!(tx.related_object(worker, "Supervisor").unwrap(), None);
        assert_eq!(tx.state(worker).unwrap(), ObjectState::Changed);
    }

    tx.commit().unwrap();
    assert!(!storage.contains(&employee(1)));
    assert_eq!(storage.stored_value(&employee(2), "Supervisor"), Some(Value::Null));
    assert_eq!(tx.state(&boss).unwrap(), ObjectState::Discarded);
}

#[test]
fn deleted_objects_keep_their_values_but_not_their_relations() {
    let (tx, _) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    let second = tx.get_object(&order(2)).unwrap();

    tx.delete(&second).unwrap();

    assert_eq!(tx.value(&second, "Number").unwrap(), Value::Int(20));
    let err = tx.related_object(&second, "Customer").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ObjectDeleted(_)));
    assert_eq!(tx.related_object_including_deleted(&second, "Customer").unwrap(), None);
    assert_eq!(tx.original_related_object(&second, "Customer").unwrap(), Some(ada));
    let err = tx.set_value(&second, "Number", 21).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ObjectDeleted(_)));
}

#[test]
fn get_object_hides_deleted_objects() {
    let (tx, _) = seeded_transaction();
    let second = tx.get_object(&order(2)).unwrap();
    tx.delete(&second).unwrap();

    let err = tx.get_object(&order(2)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ObjectDeleted(_)));
    assert_eq!(tx.get_object_including_deleted(&order(2)).unwrap(), second);
}

#[test]
fn deleting_twice_fails() {
    let (tx, _) = seeded_transaction();
    let second = tx.get_object(&order(2)).unwrap();
    tx.delete(&second).unwrap();
    let err = tx.delete(&second).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ObjectDeleted(_)));
}

#[test]
fn rollback_undeletes() {
    let (tx, _) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    let second = tx.get_object(&order(2)).unwrap();
    tx.delete(&second).unwrap();

    tx.rollback().unwrap();

    assert_eq!(tx.state(&second).unwrap(), ObjectState::Unchanged);
    assert_eq!(tx.related_object(&second, "Customer").unwrap(), Some(ada.clone()));
    assert!(tx.related_objects(&ada, "Orders").unwrap().contains(second.id()));
}

// =============================================================================
// Cascades
// =============================================================================

#[test]
fn deleting_an_order_takes_its_ticket_and_items() {
    init_tracing();
    let (tx, storage) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    let first = tx.get_object(&order(1)).unwrap();
    let recorder = EventRecorder::new();
    tx.subscribe(recorder.clone()).unwrap();

    tx.delete(&first).unwrap();

    let deleting: Vec<_> = recorder
        .events()
        .iter()
        .filter(|event| event.event_type() == "Deleting")
        .map(TransactionEvent::summary)
        .collect();
    assert_eq!(deleting[0], "Deleting(Order|1)");
    assert_eq!(deleting.len(), 4);
    for id in [order(1), ticket(1), item(1), item(2)] {
        let handle = tx.get_object_including_deleted(&id).unwrap();
        assert_eq!(tx.state(&handle).unwrap(), ObjectState::Deleted, "{id}");
    }
    assert_eq!(tx.related_objects(&ada, "Orders").unwrap().ids(), vec![order(2)]);

    tx.commit().unwrap();
    for id in [order(1), ticket(1), item(1), item(2)] {
        assert!(!storage.contains(&id), "{id}");
    }
    assert!(storage.contains(&order(2)));
}

#[test]
fn vetoed_cascade_deletes_nothing() {
    let (tx, _) = seeded_transaction();
    let first = tx.get_object(&order(1)).unwrap();
    tx.subscribe(|event: &TransactionEvent| -> ListenerResult {
        match event {
            TransactionEvent::Deleting { object } if object.class_id.as_str() == "OrderTicket" => {
                Err(Cancelled::new("tickets are archived"))
            }
            _ => Ok(()),
        }
    })
    .unwrap();

    assert!(tx.delete(&first).unwrap_err().is_cancellation());

    assert_eq!(tx.state(&first).unwrap(), ObjectState::Unchanged);
    let first_ticket = tx.get_object(&ticket(1)).unwrap();
    assert_eq!(tx.state(&first_ticket).unwrap(), ObjectState::Unchanged);
    assert_eq!(tx.related_object(&first_ticket, "Order").unwrap(), Some(first.clone()));
    assert_eq!(tx.related_objects(&first, "OrderItems").unwrap().len(), 2);
}

#[test]
fn without_cascade_children_are_only_detached() {
    let (tx, _) = seeded_transaction_with(TransactionConfig::default().with_cascade_deletes(false));
    let first = tx.get_object(&order(1)).unwrap();
    let pen = tx.get_object(&item(1)).unwrap();

    tx.delete(&first).unwrap();

    assert_eq!(tx.state(&pen).unwrap(), ObjectState::Changed);
    assert_eq!(tx.related_object(&pen, "Order").unwrap(), None);
    let err = tx.commit().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MandatoryRelationNotSet { .. }));
}

// =============================================================================
// Discarded Objects
// =============================================================================

#[test]
fn a_deleted_new_object_is_discarded_for_good() {
    let (tx, storage) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();
    let draft = tx.new_object("Order").unwrap();
    tx.related_collection(&ada, "Orders").unwrap().add(&draft).unwrap();

    tx.delete(&draft).unwrap();

    assert_eq!(tx.state(&draft).unwrap(), ObjectState::Discarded);
    assert!(!tx.related_objects(&ada, "Orders").unwrap().contains(draft.id()));
    let errors = [
        tx.value(&draft, "Number").unwrap_err(),
        tx.set_value(&draft, "Number", 1).unwrap_err(),
        tx.related_object(&draft, "Customer").unwrap_err(),
        tx.delete(&draft).unwrap_err(),
        tx.get_object(draft.id()).unwrap_err(),
    ];
    for err in errors {
        assert!(matches!(err.kind, ErrorKind::ObjectDiscarded(_)), "{err}");
    }

    tx.commit().unwrap();
    assert!(!storage.contains(draft.id()));
    assert_eq!(tx.state(&draft).unwrap(), ObjectState::Discarded);
}

#[test]
fn committed_delete_discards_the_object() {
    let (tx, _) = seeded_transaction();
    let third = tx.get_object(&order(3)).unwrap();
    tx.delete(&third).unwrap();
    tx.commit().unwrap();

    assert_eq!(tx.state(&third).unwrap(), ObjectState::Discarded);
    let err = tx.get_object_including_deleted(&order(3)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ObjectDiscarded(_)));
    tx.rollback().unwrap();
    assert_eq!(tx.state(&third).unwrap(), ObjectState::Discarded);
}
