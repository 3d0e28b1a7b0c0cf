//! Integration tests for relation metadata
//!
//! Tests end point pairing, sort expressions, mandatory flags, and cascades.

use weft_foundation::{ClassId, ErrorKind, PropertyName};
use weft_mapping::{
    Cardinality, ClassDefinition, DeleteBehavior, MappingConfiguration, PropertyDefinition,
    RelationDefinition, SortDirection, SortExpression,
};

fn classes() -> weft_mapping::MappingBuilder {
    MappingConfiguration::builder()
        .class(ClassDefinition::new("Customer"))
        .class(ClassDefinition::new("Order").with_property(PropertyDefinition::int("Number")))
        .class(ClassDefinition::new("OrderTicket"))
}

// =============================================================================
// End Points
// =============================================================================

#[test]
fn opposite_end_points_point_at_each_other() {
    let mapping = classes()
        .relation(RelationDefinition::one_to_many(
            "Customer:Orders",
            "Customer",
            "Orders",
            "Order",
            "Customer",
        ))
        .build()
        .unwrap();

    let orders = mapping
        .end_point(&ClassId::new("Customer"), &PropertyName::new("Orders"))
        .unwrap();
    assert!(orders.is_virtual);
    assert_eq!(orders.cardinality, Cardinality::Many);

    let customer = mapping.opposite_end_point(orders).unwrap();
    assert!(customer.is_real());
    assert_eq!(customer.class_id, ClassId::new("Order"));
    assert_eq!(mapping.opposite_end_point(customer).unwrap(), orders);
}

#[test]
fn one_to_one_has_single_valued_virtual_side() {
    let mapping = classes()
        .relation(
            RelationDefinition::one_to_one(
                "Order:OrderTicket",
                "Order",
                "OrderTicket",
                "OrderTicket",
                "Order",
            )
            .with_mandatory("Order")
            .with_cascade_delete("OrderTicket"),
        )
        .build()
        .unwrap();

    let ticket = mapping
        .end_point(&ClassId::new("Order"), &PropertyName::new("OrderTicket"))
        .unwrap();
    assert!(!ticket.is_collection());
    assert!(ticket.is_virtual);
    assert_eq!(ticket.on_delete, DeleteBehavior::Cascade);
    assert!(!ticket.mandatory);

    let order = mapping.opposite_end_point(ticket).unwrap();
    assert!(order.mandatory);
    assert_eq!(order.on_delete, DeleteBehavior::Nullify);
}

#[test]
fn sort_expression_keys_accumulate() {
    let sort = SortExpression::descending("Number").then("Customer", SortDirection::Ascending);
    assert_eq!(sort.specs.len(), 2);
    assert_eq!(sort.specs[0].direction, SortDirection::Descending);

    let mapping = classes()
        .relation(
            RelationDefinition::one_to_many("Customer:Orders", "Customer", "Orders", "Order", "Customer")
                .sorted_by(sort.clone()),
        )
        .build()
        .unwrap();
    let orders = mapping
        .end_point(&ClassId::new("Customer"), &PropertyName::new("Orders"))
        .unwrap();
    assert_eq!(orders.sort_expression.as_ref(), Some(&sort));
}

// =============================================================================
// Invalid Relations
// =============================================================================

#[test]
fn relation_to_unknown_class_is_invalid() {
    let err = classes()
        .relation(RelationDefinition::one_to_many(
            "Customer:Invoices",
            "Customer",
            "Invoices",
            "Invoice",
            "Customer",
        ))
        .build()
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidMapping(_)));
}

#[test]
fn sort_on_unknown_item_property_is_invalid() {
    let err = classes()
        .relation(
            RelationDefinition::one_to_many("Customer:Orders", "Customer", "Orders", "Order", "Customer")
                .sorted_by(SortExpression::ascending("Colour")),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidMapping(_)));
}

#[test]
fn relation_property_clashing_with_scalar_is_invalid() {
    let err = classes()
        .relation(RelationDefinition::one_to_many(
            "Customer:Orders",
            "Customer",
            "Orders",
            "Order",
            "Number",
        ))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("declared twice"));
}
