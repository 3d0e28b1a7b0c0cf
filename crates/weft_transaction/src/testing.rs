//! Shared fixtures for tests and benchmarks.
//!
//! The order domain:
//!
//! ```text
//! Customer 1 ──Orders── * Order 1 ──OrderTicket── 1 OrderTicket
//!    ▲                        └─────OrderItems──── * OrderItem
//! PremiumCustomer
//! Employee 1 ──Subordinates── * Employee (Supervisor)
//! ```
//!
//! `Order.OrderTicket` and `Order.OrderItems` cascade on delete; the ticket
//! and item sides of those relations are mandatory.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use weft_foundation::{ObjectId, PropertyName, Result, Value};
use weft_mapping::{
    ClassDefinition, MappingConfiguration, PropertyDefinition, RelationDefinition, SortExpression,
};

use crate::config::TransactionConfig;
use crate::storage::InMemoryStorageProvider;
use crate::transaction::ClientTransaction;

/// Builds the order domain mapping.
///
/// # Panics
///
/// Never; the declarations are valid.
#[must_use]
pub fn order_mapping() -> Arc<MappingConfiguration> {
    let mapping = MappingConfiguration::builder()
        .class(
            ClassDefinition::new("Customer")
                .with_property(PropertyDefinition::string("Name").with_max_length(40)),
        )
        .class(
            ClassDefinition::new("PremiumCustomer")
                .with_base("Customer")
                .with_property(PropertyDefinition::int("Level")),
        )
        .class(ClassDefinition::new("Order").with_property(PropertyDefinition::int("Number")))
        .class(
            ClassDefinition::new("OrderTicket")
                .with_property(PropertyDefinition::string("FileName").nullable()),
        )
        .class(ClassDefinition::new("OrderItem").with_property(PropertyDefinition::string("Product")))
        .class(ClassDefinition::new("Employee").with_property(PropertyDefinition::string("Name")))
        .relation(
            RelationDefinition::one_to_many("Customer:Orders", "Customer", "Orders", "Order", "Customer")
                .sorted_by(SortExpression::ascending("Number")),
        )
        .relation(
            RelationDefinition::one_to_one("Order:OrderTicket", "Order", "OrderTicket", "OrderTicket", "Order")
                .with_mandatory("Order")
                .with_cascade_delete("OrderTicket"),
        )
        .relation(
            RelationDefinition::one_to_many("Order:OrderItems", "Order", "OrderItems", "OrderItem", "Order")
                .with_mandatory("Order")
                .with_cascade_delete("OrderItems"),
        )
        .relation(RelationDefinition::one_to_many(
            "Employee:Subordinates",
            "Employee",
            "Subordinates",
            "Employee",
            "Supervisor",
        ))
        .build();
    match mapping {
        Ok(mapping) => Arc::new(mapping),
        Err(err) => panic!("order mapping is invalid: {err}"),
    }
}

/// Builds a row from name/value pairs.
#[must_use]
pub fn row(values: &[(&str, Value)]) -> BTreeMap<PropertyName, Value> {
    values
        .iter()
        .map(|(name, value)| (PropertyName::new(name), value.clone()))
        .collect()
}

/// `Customer|n`.
#[must_use]
pub fn customer(n: i64) -> ObjectId {
    ObjectId::int("Customer", n)
}

/// `Order|n`.
#[must_use]
pub fn order(n: i64) -> ObjectId {
    ObjectId::int("Order", n)
}

/// `OrderTicket|n`.
#[must_use]
pub fn ticket(n: i64) -> ObjectId {
    ObjectId::int("OrderTicket", n)
}

/// `OrderItem|n`.
#[must_use]
pub fn item(n: i64) -> ObjectId {
    ObjectId::int("OrderItem", n)
}

/// `Employee|n`.
#[must_use]
pub fn employee(n: i64) -> ObjectId {
    ObjectId::int("Employee", n)
}

/// Fills a store with the standard data set:
///
/// - Customers 1 (Ada) and 2 (Grace)
/// - Orders 1 and 2 of customer 1, order 3 of customer 2
/// - Ticket 1 of order 1, items 1 and 2 of order 1
/// - Employee 1 supervising employees 2 and 3
///
/// # Errors
///
/// Returns an error if the rows do not fit the mapping.
pub fn seed(storage: &InMemoryStorageProvider) -> Result<()> {
    storage.insert(customer(1), row(&[("Name", Value::string("Ada"))]))?;
    storage.insert(customer(2), row(&[("Name", Value::string("Grace"))]))?;
    for (n, owner) in [(1, 1), (2, 1), (3, 2)] {
        storage.insert(
            order(n),
            row(&[
                ("Number", Value::Int(n * 10)),
                ("Customer", Value::Object(customer(owner))),
            ]),
        )?;
    }
    storage.insert(
        ticket(1),
        row(&[
            ("FileName", Value::string("order1.pdf")),
            ("Order", Value::Object(order(1))),
        ]),
    )?;
    for (n, product) in [(1, "Pen"), (2, "Ink")] {
        storage.insert(
            item(n),
            row(&[("Product", Value::string(product)), ("Order", Value::Object(order(1)))]),
        )?;
    }
    storage.insert(employee(1), row(&[("Name", Value::string("Boss"))]))?;
    for n in [2, 3] {
        storage.insert(
            employee(n),
            row(&[
                ("Name", Value::string(format!("Worker {n}"))),
                ("Supervisor", Value::Object(employee(1))),
            ]),
        )?;
    }
    Ok(())
}

/// A seeded store for the order domain.
///
/// # Panics
///
/// Never; the seed rows fit the order mapping.
#[must_use]
pub fn seeded_storage(mapping: Arc<MappingConfiguration>) -> Rc<InMemoryStorageProvider> {
    let storage = InMemoryStorageProvider::new(mapping);
    if let Err(err) = seed(&storage) {
        panic!("seed rows do not fit the order mapping: {err}");
    }
    Rc::new(storage)
}

/// A transaction over a freshly seeded store, plus the store for inspection.
#[must_use]
pub fn seeded_transaction() -> (ClientTransaction, Rc<InMemoryStorageProvider>) {
    seeded_transaction_with(TransactionConfig::default())
}

/// Like [`seeded_transaction`] with a custom configuration.
#[must_use]
pub fn seeded_transaction_with(
    config: TransactionConfig,
) -> (ClientTransaction, Rc<InMemoryStorageProvider>) {
    let mapping = order_mapping();
    let storage = seeded_storage(Arc::clone(&mapping));
    let transaction = ClientTransaction::with_config(mapping, storage.clone(), config);
    (transaction, storage)
}
