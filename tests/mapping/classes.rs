//! Integration tests for class definitions
//!
//! Tests inheritance resolution and member lookup.

use weft_foundation::{ClassId, ErrorKind, PropertyName, ValueType};
use weft_mapping::{ClassDefinition, MappingConfiguration, PropertyDefinition, RelationDefinition};

fn party_mapping() -> MappingConfiguration {
    MappingConfiguration::builder()
        .class(ClassDefinition::new("Party").with_property(PropertyDefinition::string("Name")))
        .class(
            ClassDefinition::new("Company")
                .with_base("Party")
                .with_property(PropertyDefinition::string("TaxNumber")),
        )
        .class(ClassDefinition::new("Holding").with_base("Company"))
        .class(ClassDefinition::new("Address").with_property(PropertyDefinition::string("City")))
        .relation(RelationDefinition::one_to_many(
            "Party:Addresses",
            "Party",
            "Addresses",
            "Address",
            "Party",
        ))
        .build()
        .unwrap()
}

// =============================================================================
// Inheritance
// =============================================================================

#[test]
fn derived_classes_inherit_members_base_first() {
    let mapping = party_mapping();
    let holding = mapping.class(&ClassId::new("Holding")).unwrap();

    let names: Vec<_> = holding.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Name", "TaxNumber"]);
    assert!(holding.end_point(&PropertyName::new("Addresses")).is_some());
    assert_eq!(holding.base_class, Some(ClassId::new("Company")));
}

#[test]
fn assignability_follows_the_base_chain() {
    let mapping = party_mapping();
    let party = ClassId::new("Party");
    let holding = ClassId::new("Holding");

    assert!(mapping.is_assignable(&holding, &party));
    assert!(!mapping.is_assignable(&party, &holding));
    assert!(!mapping.is_assignable(&ClassId::new("Address"), &party));

    let accepted = mapping.assignable_classes(&ClassId::new("Company"));
    assert_eq!(accepted.len(), 2);
    assert!(accepted.contains(&holding));
}

// =============================================================================
// Lookup
// =============================================================================

#[test]
fn property_lookup_distinguishes_relations() {
    let mapping = party_mapping();
    let address = ClassId::new("Address");
    let party = ClassId::new("Party");

    let foreign_key = mapping.property(&address, &"Party".into()).unwrap();
    assert!(foreign_key.is_foreign_key());
    assert!(foreign_key.nullable);
    assert_eq!(foreign_key.value_type, ValueType::Object(party.clone()));

    let err = mapping.property(&party, &"Addresses".into()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RelationProperty(_)));

    let err = mapping.end_point(&party, &"Name".into()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotARelation(_)));

    let err = mapping.property(&party, &"Colour".into()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownProperty { .. }));

    let err = mapping.class(&ClassId::new("Nope")).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownClass(_)));
}

#[test]
fn relation_properties_in_declaration_order() {
    let mapping = party_mapping();
    let address = mapping.class(&ClassId::new("Address")).unwrap();
    let names: Vec<_> = address.relation_properties().map(PropertyName::as_str).collect();
    assert_eq!(names, vec!["Party"]);
}

// =============================================================================
// Invalid Declarations
// =============================================================================

#[test]
fn duplicate_class_is_invalid() {
    let err = MappingConfiguration::builder()
        .class(ClassDefinition::new("A"))
        .class(ClassDefinition::new("A"))
        .build()
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidMapping(_)));
}

#[test]
fn inheritance_cycle_is_invalid() {
    let err = MappingConfiguration::builder()
        .class(ClassDefinition::new("A").with_base("B"))
        .class(ClassDefinition::new("B").with_base("A"))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn member_redeclared_in_derived_class_is_invalid() {
    let err = MappingConfiguration::builder()
        .class(ClassDefinition::new("A").with_property(PropertyDefinition::string("Name")))
        .class(
            ClassDefinition::new("B")
                .with_base("A")
                .with_property(PropertyDefinition::string("Name")),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidMapping(_)));
}
