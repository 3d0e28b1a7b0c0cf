//! Integration tests for Value types
//!
//! Tests value construction, equality, ordering, and type descriptors.

use weft_foundation::{ClassId, ObjectId, Value, ValueType};

// =============================================================================
// Construction
// =============================================================================

#[test]
fn conversions() {
    assert_eq!(Value::from(3i64), Value::Int(3));
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from("Ada"), Value::string("Ada"));
    assert_eq!(Value::from(1.5), Value::Float(1.5));
    let id = ObjectId::int("Order", 1);
    assert_eq!(Value::from(id.clone()), Value::Object(id));
}

#[test]
fn accessors() {
    assert_eq!(Value::Int(4).as_int(), Some(4));
    assert_eq!(Value::string("x").as_str(), Some("x"));
    assert_eq!(Value::Bool(false).as_bool(), Some(false));
    assert_eq!(Value::Int(4).as_str(), None);
    assert!(Value::Null.is_null());
    assert!(Value::Null.as_object().is_none());
}

// =============================================================================
// Types
// =============================================================================

#[test]
fn value_types() {
    assert_eq!(Value::Null.value_type(), None);
    assert_eq!(Value::Float(0.0).value_type(), Some(ValueType::Float));
    assert_eq!(
        Value::Object(ObjectId::int("Customer", 1)).value_type(),
        Some(ValueType::Object(ClassId::new("Customer")))
    );
}

// =============================================================================
// Equality and Ordering
// =============================================================================

#[test]
fn equality_is_type_strict() {
    assert_ne!(Value::Int(1), Value::Float(1.0));
    assert_ne!(Value::Int(1), Value::string("1"));
    assert_eq!(Value::Null, Value::Null);
}

#[test]
fn ordering_for_sort_expressions() {
    let mut values = vec![Value::Int(30), Value::Null, Value::Int(10), Value::Float(20.0)];
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(
        values,
        vec![Value::Null, Value::Int(10), Value::Float(20.0), Value::Int(30)]
    );
}
