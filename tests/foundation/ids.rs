//! Integration tests for identities
//!
//! Tests object, class, and transaction identities.

use std::collections::HashSet;

use weft_foundation::{ClassId, IdValue, ObjectId, PropertyName, Timestamp, TransactionId};

// =============================================================================
// Object Identity
// =============================================================================

#[test]
fn object_ids_compare_by_value() {
    let a = ObjectId::int("Order", 1);
    let b = ObjectId::new(ClassId::new("Order"), IdValue::Int(1));
    assert_eq!(a, b);
    assert_ne!(a, ObjectId::int("Customer", 1));
    assert_ne!(a, ObjectId::int("Order", 2));
}

#[test]
fn object_id_display_is_class_bar_key() {
    assert_eq!(ObjectId::int("Order", 7).to_string(), "Order|7");
    let text = ObjectId::new(ClassId::new("Country"), IdValue::Text("NZ".into()));
    assert_eq!(text.to_string(), "Country|NZ");
}

#[test]
fn guid_ids_are_unique() {
    let ids: HashSet<_> = (0..100)
        .map(|_| ObjectId::new_guid(ClassId::new("Order")))
        .collect();
    assert_eq!(ids.len(), 100);
    assert!(ids.iter().all(|id| matches!(id.value, IdValue::Guid(_))));
}

#[test]
fn object_ids_sort_by_class_then_key() {
    let mut ids = vec![
        ObjectId::int("Order", 2),
        ObjectId::int("Customer", 9),
        ObjectId::int("Order", 1),
    ];
    ids.sort();
    assert_eq!(
        ids,
        vec![
            ObjectId::int("Customer", 9),
            ObjectId::int("Order", 1),
            ObjectId::int("Order", 2),
        ]
    );
}

// =============================================================================
// Names, Timestamps, Transactions
// =============================================================================

#[test]
fn names_convert_from_str() {
    let class: ClassId = "Customer".into();
    let property: PropertyName = "Orders".into();
    assert_eq!(class.as_str(), "Customer");
    assert_eq!(property, PropertyName::new("Orders"));
}

#[test]
fn timestamps_are_ordered_tokens() {
    assert!(Timestamp(1) < Timestamp(2));
    assert_eq!(Timestamp(3), Timestamp(3));
}

#[test]
fn transaction_ids_are_process_unique() {
    let ids: HashSet<_> = (0..50).map(|_| TransactionId::next()).collect();
    assert_eq!(ids.len(), 50);
    let a = TransactionId::next();
    let b = TransactionId::next();
    assert!(b.get() > a.get());
    assert!(a.to_string().starts_with("tx#"));
}
