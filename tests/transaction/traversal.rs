//! Integration tests for graph traversal through a transaction

use std::collections::HashSet;

use weft_data::DomainObject;
use weft_foundation::{ObjectId, PropertyName};
use weft_transaction::testing::{
    customer, employee, item, order, seeded_transaction, seeded_transaction_with, ticket,
};
use weft_transaction::{CascadeDeleteStrategy, FullTraversal, TransactionConfig, TraversalStrategy};

fn set(ids: &[ObjectId]) -> HashSet<ObjectId> {
    ids.iter().cloned().collect()
}

/// Collects orders only, walking through everything.
struct OrdersOnly;

impl TraversalStrategy for OrdersOnly {
    fn should_process_object(&self, object: &ObjectId) -> bool {
        object.class_id.as_str() == "Order"
    }

    fn should_follow_link(&self, _: &ObjectId, _: &ObjectId, _: usize, _: &PropertyName) -> bool {
        true
    }
}

// =============================================================================
// Strategies
// =============================================================================

#[test]
fn full_traversal_reaches_the_connected_component() {
    let (tx, _) = seeded_transaction();
    let ada = tx.get_object(&customer(1)).unwrap();

    let reached = tx.traverse(&ada, &FullTraversal).unwrap();

    assert_eq!(
        reached,
        set(&[customer(1), order(1), order(2), ticket(1), item(1), item(2)])
    );
}

#[test]
fn cascade_strategy_follows_only_cascading_end_points() {
    let (tx, _) = seeded_transaction();
    let first = tx.get_object(&order(1)).unwrap();
    let strategy = CascadeDeleteStrategy::new(tx.mapping().clone());

    let reached = tx.traverse(&first, &strategy).unwrap();

    assert_eq!(reached, set(&[order(1), ticket(1), item(1), item(2)]));
}

#[test]
fn unprocessed_objects_are_still_walked_through() {
    let (tx, _) = seeded_transaction();
    let pen = tx.get_object(&item(1)).unwrap();

    let reached = tx.traverse(&pen, &OrdersOnly).unwrap();

    assert_eq!(reached, set(&[order(1), order(2)]));
}

#[test]
fn traversal_reflects_uncommitted_changes() {
    let (tx, _) = seeded_transaction();
    let grace = tx.get_object(&customer(2)).unwrap();
    let second = tx.get_object(&order(2)).unwrap();
    tx.related_collection(&grace, "Orders").unwrap().add(&second).unwrap();

    let reached = tx.traverse(&grace, &OrdersOnly).unwrap();

    assert_eq!(reached, set(&[order(2), order(3)]));
}

// =============================================================================
// Cycles and Depth
// =============================================================================

#[test]
fn cycles_terminate() {
    let (tx, _) = seeded_transaction();
    let worker = tx.get_object(&employee(2)).unwrap();

    let reached = tx.traverse(&worker, &FullTraversal).unwrap();

    assert_eq!(reached, set(&[employee(1), employee(2), employee(3)]));
}

#[test]
fn reached_objects_are_usable() {
    let (tx, _) = seeded_transaction();
    let worker = tx.get_object(&employee(2)).unwrap();
    let peer = DomainObject::new(employee(3));
    assert!(!tx.is_enlisted(&peer));

    tx.traverse(&worker, &FullTraversal).unwrap();

    assert!(tx.is_enlisted(&peer));
    let boss = tx.related_object(&peer, "Supervisor").unwrap().unwrap();
    assert_eq!(boss.id(), &employee(1));
}

#[test]
fn depth_limit_cuts_the_walk() {
    let config = TransactionConfig::default().with_max_traversal_depth(Some(1));
    let (tx, _) = seeded_transaction_with(config);
    let ada = tx.get_object(&customer(1)).unwrap();

    let reached = tx.traverse(&ada, &FullTraversal).unwrap();

    assert_eq!(reached, set(&[customer(1), order(1), order(2)]));
}
