//! Integration tests for `DomainObjectCollection`

use std::collections::HashSet;

use weft_data::{DomainObject, DomainObjectCollection, ItemType};
use weft_foundation::{ClassId, ErrorKind, ObjectId, TransactionId};

fn order(n: i64) -> DomainObject {
    DomainObject::new(ObjectId::int("Order", n))
}

fn orders(ns: &[i64]) -> DomainObjectCollection {
    DomainObjectCollection::new()
        .with_items(ns.iter().map(|n| order(*n)))
        .unwrap()
}

// =============================================================================
// Identity and Order
// =============================================================================

#[test]
fn items_keep_insertion_order() {
    let mut collection = orders(&[3, 1]);
    collection.insert(1, order(2)).unwrap();

    assert_eq!(
        collection.ids(),
        vec![
            ObjectId::int("Order", 3),
            ObjectId::int("Order", 2),
            ObjectId::int("Order", 1),
        ]
    );
    assert_eq!(collection.index_of(&ObjectId::int("Order", 1)), Some(2));
}

#[test]
fn identity_is_unique() {
    let mut collection = orders(&[1, 2]);

    let err = collection.add(order(1)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateItem(_)));
    assert_eq!(collection.len(), 2);

    let err = collection.set(0, order(2)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::DuplicateItem(_)));
    assert_eq!(collection, orders(&[1, 2]));
}

#[test]
fn set_with_same_item_is_allowed() {
    let mut collection = orders(&[1, 2]);
    let previous = collection.set(1, order(2)).unwrap();
    assert_eq!(previous.id(), &ObjectId::int("Order", 2));
    assert_eq!(collection, orders(&[1, 2]));
}

#[test]
fn out_of_range_positions_are_rejected() {
    let mut collection = orders(&[1]);

    let err = collection.insert(3, order(2)).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::IndexOutOfBounds { index: 3, length: 1 }
    ));
    let err = collection.set(1, order(2)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::IndexOutOfBounds { .. }));
}

#[test]
fn remove_reports_presence() {
    let mut collection = orders(&[1, 2]);
    assert!(collection.remove(&ObjectId::int("Order", 1)).unwrap());
    assert!(!collection.remove(&ObjectId::int("Order", 1)).unwrap());
    assert_eq!(collection, orders(&[2]));
}

// =============================================================================
// Equality and Combination
// =============================================================================

#[test]
fn equality_is_ordered_but_set_equality_is_not() {
    let forward = orders(&[1, 2]);
    let backward = orders(&[2, 1]);
    assert_ne!(forward, backward);
    assert!(forward.set_equals(&backward));
    assert!(!forward.set_equals(&orders(&[1])));
}

#[test]
fn combine_keeps_left_items_first() {
    let left = orders(&[1, 2]);
    let right = orders(&[2, 3, 4]);

    let combined = left.combine(&right).unwrap();
    assert_eq!(combined, orders(&[1, 2, 3, 4]));
    assert_eq!(left, orders(&[1, 2]));
    assert_eq!(right, orders(&[2, 3, 4]));
}

#[test]
fn combine_of_read_only_is_writable() {
    let read_only = orders(&[1]).as_read_only();
    let mut combined = read_only.combine(&orders(&[2])).unwrap();
    assert!(!combined.is_read_only());
    combined.add(order(3)).unwrap();
    assert_eq!(read_only.len(), 1);
}

// =============================================================================
// Restrictions
// =============================================================================

#[test]
fn read_only_rejects_every_mutation() {
    let mut collection = orders(&[1, 2]).as_read_only();

    for err in [
        collection.add(order(3)).unwrap_err(),
        collection.insert(0, order(3)).unwrap_err(),
        collection.remove(&ObjectId::int("Order", 1)).unwrap_err(),
        collection.set(0, order(3)).unwrap_err(),
        collection.clear().unwrap_err(),
    ] {
        assert!(matches!(err.kind, ErrorKind::ReadOnlyCollection));
    }
    assert_eq!(collection, orders(&[1, 2]));
}

#[test]
fn item_type_accepts_derived_classes() {
    let accepted: HashSet<_> = [ClassId::new("PremiumCustomer")].into_iter().collect();
    let mut customers = DomainObjectCollection::new()
        .with_item_type(ItemType::new(ClassId::new("Customer"), accepted));

    customers
        .add(DomainObject::new(ObjectId::int("Customer", 1)))
        .unwrap();
    customers
        .add(DomainObject::new(ObjectId::int("PremiumCustomer", 2)))
        .unwrap();
    let err = customers.add(order(1)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    assert_eq!(customers.len(), 2);
}

#[test]
fn bound_handles_stay_in_their_transaction() {
    let mine = TransactionId::next();
    let theirs = TransactionId::next();
    let mut collection = DomainObjectCollection::new().for_transaction(mine);

    collection
        .add(DomainObject::bound(ObjectId::int("Order", 1), mine))
        .unwrap();
    collection.add(order(2)).unwrap();
    let err = collection
        .add(DomainObject::bound(ObjectId::int("Order", 3), theirs))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::CrossTransaction { .. }));
}
