//! Integration tests for value validation
//!
//! Tests type, nullability, and length checks against property definitions.

use weft_foundation::{ClassId, ErrorKind, ObjectId, Value, ValueType};
use weft_mapping::{ClassDefinition, MappingConfiguration, PropertyDefinition};

fn mapping() -> MappingConfiguration {
    MappingConfiguration::builder()
        .class(ClassDefinition::new("Customer"))
        .class(ClassDefinition::new("PremiumCustomer").with_base("Customer"))
        .class(ClassDefinition::new("Order"))
        .build()
        .unwrap()
}

#[test]
fn matching_types_pass() {
    let mapping = mapping();
    mapping
        .check_value(&PropertyDefinition::int("Number"), &Value::Int(3))
        .unwrap();
    mapping
        .check_value(&PropertyDefinition::string("Name"), &Value::string("Ada"))
        .unwrap();
}

#[test]
fn null_needs_nullable() {
    let mapping = mapping();
    let err = mapping
        .check_value(&PropertyDefinition::string("Name"), &Value::Null)
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NullNotAllowed(_)));
    mapping
        .check_value(&PropertyDefinition::string("Note").nullable(), &Value::Null)
        .unwrap();
}

#[test]
fn wrong_type_is_rejected() {
    let mapping = mapping();
    let err = mapping
        .check_value(&PropertyDefinition::int("Number"), &Value::string("ten"))
        .unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::TypeMismatch {
            expected: ValueType::Int,
            actual: Some(ValueType::String),
        }
    ));
}

#[test]
fn max_length_counts_characters() {
    let mapping = mapping();
    let property = PropertyDefinition::string("Code").with_max_length(3);
    mapping.check_value(&property, &Value::string("äöü")).unwrap();
    let err = mapping
        .check_value(&property, &Value::string("abcd"))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ValueTooLong { max_length: 3, .. }));
}

#[test]
fn object_values_respect_inheritance() {
    let mapping = mapping();
    let owner = PropertyDefinition::new("Owner", ValueType::Object(ClassId::new("Customer")));
    mapping
        .check_value(&owner, &Value::Object(ObjectId::int("PremiumCustomer", 1)))
        .unwrap();
    let err = mapping
        .check_value(&owner, &Value::Object(ObjectId::int("Order", 1)))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
}
