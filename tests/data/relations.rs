//! Integration tests for the relation change protocol
//!
//! Drives `RelationEndPointMap` directly: planning, lazy end point loading,
//! execution with listeners, commit, and rollback.

use std::collections::{BTreeMap, HashMap};

use weft_data::{
    Cancelled, DataContainer, DataContainerMap, EventRecorder, ListenerRegistry, ListenerResult,
    NullSink, ObjectState, Plan, RelationChange, RelationEndPointId, RelationEndPointMap,
    TransactionEvent,
};
use weft_foundation::{ObjectId, PropertyName, Result, Timestamp, TransactionId, Value};
use weft_transaction::testing::{customer, item, order, order_mapping, ticket};

/// An in-memory graph with a backing "store" of virtual end point contents,
/// loaded only when a plan asks for them.
struct Graph {
    map: RelationEndPointMap,
    containers: DataContainerMap,
    unloaded: HashMap<RelationEndPointId, Vec<ObjectId>>,
    loads: Vec<RelationEndPointId>,
}

impl Graph {
    fn new() -> Self {
        Self {
            map: RelationEndPointMap::new(order_mapping(), TransactionId::next(), false),
            containers: DataContainerMap::new(),
            unloaded: HashMap::new(),
            loads: Vec::new(),
        }
    }

    fn load(&mut self, id: ObjectId, foreign_keys: &[(&str, &ObjectId)]) {
        let mapping = order_mapping();
        let class = mapping.class(&id.class_id).unwrap();
        let values: BTreeMap<_, _> = foreign_keys
            .iter()
            .map(|(property, related)| (PropertyName::new(property), Value::Object((*related).clone())))
            .collect();
        let container = DataContainer::loaded(id, class, values, Timestamp(1)).unwrap();
        self.map.register_real_end_points(&container).unwrap();
        self.containers.register(container).unwrap();
    }

    fn create(&mut self, id: ObjectId) {
        let mapping = order_mapping();
        let class = mapping.class(&id.class_id).unwrap();
        self.map.register_new_object(&id).unwrap();
        self.containers.register(DataContainer::new_object(id, class)).unwrap();
    }

    fn stored(&mut self, object: &ObjectId, property: &str, related: &[ObjectId]) {
        self.unloaded
            .insert(RelationEndPointId::new(object.clone(), property), related.to_vec());
    }

    /// Re-plans until every end point the change needs is loaded.
    fn plan(&mut self, planner: impl Fn(&RelationEndPointMap) -> Result<Plan>) -> RelationChange {
        loop {
            match planner(&self.map).unwrap() {
                Plan::Ready(change) => return change,
                Plan::Load(id) => {
                    let related = self.unloaded.remove(&id).unwrap_or_default();
                    self.map.register_virtual(id.clone(), related).unwrap();
                    self.loads.push(id);
                }
            }
        }
    }

    fn related(&self, object: &ObjectId, property: &str) -> Vec<ObjectId> {
        self.map
            .get(&RelationEndPointId::new(object.clone(), property))
            .unwrap()
            .related_ids()
    }

    fn foreign_key(&self, object: &ObjectId, property: &str) -> Value {
        self.containers
            .get(object)
            .unwrap()
            .value(&property.into())
            .unwrap()
            .clone()
    }
}

fn ep(object: &ObjectId, property: &str) -> RelationEndPointId {
    RelationEndPointId::new(object.clone(), property)
}

fn recording() -> (ListenerRegistry, EventRecorder) {
    let recorder = EventRecorder::new();
    let mut registry = ListenerRegistry::new();
    registry.subscribe(recorder.clone());
    (registry, recorder)
}

// =============================================================================
// Lazy End Points
// =============================================================================

#[test]
fn planning_loads_only_the_end_points_it_needs() {
    let mut graph = Graph::new();
    graph.load(customer(1), &[]);
    graph.load(customer(2), &[]);
    graph.load(order(1), &[("Customer", &customer(1))]);
    graph.stored(&customer(1), "Orders", &[order(1)]);
    graph.stored(&customer(2), "Orders", &[]);

    let change = graph.plan(|map| map.plan_set_related_object(&ep(&order(1), "Customer"), Some(&customer(2))));
    graph.map.execute(&change, &mut graph.containers, &mut NullSink).unwrap();

    let mut loads = graph.loads.clone();
    loads.sort_by_key(ToString::to_string);
    assert_eq!(loads, vec![ep(&customer(1), "Orders"), ep(&customer(2), "Orders")]);
    assert!(!graph.map.contains(&ep(&order(1), "OrderTicket")));
    assert_eq!(graph.related(&customer(2), "Orders"), vec![order(1)]);
    assert_eq!(graph.foreign_key(&order(1), "Customer"), Value::Object(customer(2)));
}

#[test]
fn clearing_an_unset_relation_needs_no_load() {
    let mut graph = Graph::new();
    graph.load(order(1), &[]);

    let change = graph.plan(|map| map.plan_set_related_object(&ep(&order(1), "Customer"), None));
    graph.map.execute(&change, &mut graph.containers, &mut NullSink).unwrap();

    assert!(graph.loads.is_empty());
    assert!(graph.map.get(&ep(&order(1), "Customer")).unwrap().has_been_touched());
    assert_eq!(graph.containers.get(&order(1)).unwrap().state(), ObjectState::Unchanged);
}

// =============================================================================
// New Objects
// =============================================================================

#[test]
fn new_order_joins_a_customer() {
    let mut graph = Graph::new();
    graph.load(customer(1), &[]);
    graph.stored(&customer(1), "Orders", &[]);
    graph.create(order(9));
    let (mut registry, recorder) = recording();

    let change = graph.plan(|map| map.plan_insert(&ep(&customer(1), "Orders"), 0, &order(9)));
    graph.map.execute(&change, &mut graph.containers, &mut registry).unwrap();

    assert_eq!(
        recorder.summaries(),
        vec![
            "RelationChanging(Order|9.Customer)",
            "ItemAdding(Customer|1.Orders, Order|9)",
            "RelationChanging(Customer|1.Orders)",
            "RelationChanged(Order|9.Customer)",
            "ItemAdded(Customer|1.Orders, Order|9)",
            "RelationChanged(Customer|1.Orders)",
        ]
    );
    assert_eq!(graph.foreign_key(&order(9), "Customer"), Value::Object(customer(1)));
    assert_eq!(graph.containers.get(&order(9)).unwrap().state(), ObjectState::New);
    assert_eq!(graph.map.changed_virtual_owners(), vec![customer(1)]);
}

#[test]
fn new_object_end_points_start_empty() {
    let mut graph = Graph::new();
    graph.create(order(9));

    assert!(graph.related(&order(9), "Customer").is_empty());
    assert!(graph.related(&order(9), "OrderTicket").is_empty());
    assert!(graph.related(&order(9), "OrderItems").is_empty());
    assert!(graph.map.changed_virtual_owners().is_empty());
}

// =============================================================================
// One-to-One
// =============================================================================

/// Orders 1 and 2 with tickets 1 and 2, everything loaded.
fn ticketed_orders() -> Graph {
    let mut graph = Graph::new();
    graph.load(order(1), &[]);
    graph.load(order(2), &[]);
    graph.load(ticket(1), &[("Order", &order(1))]);
    graph.load(ticket(2), &[("Order", &order(2))]);
    graph.map.register_virtual(ep(&order(1), "OrderTicket"), vec![ticket(1)]).unwrap();
    graph.map.register_virtual(ep(&order(2), "OrderTicket"), vec![ticket(2)]).unwrap();
    graph
}

#[test]
fn setting_the_real_side_steals_the_partner() {
    let mut graph = ticketed_orders();
    let (mut registry, recorder) = recording();

    let change = graph.plan(|map| map.plan_set_related_object(&ep(&ticket(1), "Order"), Some(&order(2))));
    graph.map.execute(&change, &mut graph.containers, &mut registry).unwrap();

    assert_eq!(
        recorder.summaries()[..4],
        [
            "RelationChanging(OrderTicket|1.Order)",
            "RelationChanging(Order|2.OrderTicket)",
            "RelationChanging(Order|1.OrderTicket)",
            "RelationChanging(OrderTicket|2.Order)",
        ]
    );
    assert_eq!(graph.foreign_key(&ticket(1), "Order"), Value::Object(order(2)));
    assert_eq!(graph.foreign_key(&ticket(2), "Order"), Value::Null);
    assert!(graph.related(&order(1), "OrderTicket").is_empty());
    assert_eq!(graph.related(&order(2), "OrderTicket"), vec![ticket(1)]);
}

#[test]
fn veto_on_the_last_participant_changes_nothing() {
    let mut graph = ticketed_orders();
    let mut registry = ListenerRegistry::new();
    registry.subscribe(|event: &TransactionEvent| -> ListenerResult {
        if event.summary() == "RelationChanging(OrderTicket|2.Order)" {
            return Err(Cancelled::new("ticket 2 stays"));
        }
        Ok(())
    });

    let change = graph.plan(|map| map.plan_set_related_object(&ep(&ticket(1), "Order"), Some(&order(2))));
    let err = graph.map.execute(&change, &mut graph.containers, &mut registry).unwrap_err();

    assert!(err.is_cancellation());
    assert_eq!(graph.foreign_key(&ticket(1), "Order"), Value::Object(order(1)));
    assert_eq!(graph.foreign_key(&ticket(2), "Order"), Value::Object(order(2)));
    assert_eq!(graph.related(&order(2), "OrderTicket"), vec![ticket(2)]);
    assert!(graph.map.changed_virtual_owners().is_empty());
}

// =============================================================================
// Delete
// =============================================================================

#[test]
fn delete_plan_detaches_every_partner() {
    let mut graph = Graph::new();
    graph.load(customer(1), &[]);
    graph.load(order(1), &[("Customer", &customer(1))]);
    graph.load(ticket(1), &[("Order", &order(1))]);
    graph.load(item(1), &[("Order", &order(1))]);
    graph.stored(&customer(1), "Orders", &[order(1)]);
    graph.stored(&order(1), "OrderTicket", &[ticket(1)]);
    graph.stored(&order(1), "OrderItems", &[item(1)]);
    let (mut registry, recorder) = recording();

    let change = graph.plan(|map| map.plan_delete(&order(1)));
    graph.map.execute(&change, &mut graph.containers, &mut registry).unwrap();

    let mut changing: Vec<_> = recorder
        .events()
        .iter()
        .filter(|event| event.is_cancelable())
        .map(TransactionEvent::summary)
        .collect();
    changing.sort();
    assert_eq!(
        changing,
        vec![
            "ItemRemoving(Customer|1.Orders, Order|1)",
            "RelationChanging(Customer|1.Orders)",
            "RelationChanging(OrderItem|1.Order)",
            "RelationChanging(OrderTicket|1.Order)",
        ]
    );
    assert!(graph.related(&customer(1), "Orders").is_empty());
    assert_eq!(graph.foreign_key(&ticket(1), "Order"), Value::Null);
    assert_eq!(graph.foreign_key(&item(1), "Order"), Value::Null);
    for property in ["Customer", "OrderTicket", "OrderItems"] {
        assert!(graph.related(&order(1), property).is_empty());
    }
}

// =============================================================================
// Commit and Rollback
// =============================================================================

#[test]
fn rollback_restores_both_sides() {
    let mut graph = Graph::new();
    graph.load(customer(1), &[]);
    graph.load(customer(2), &[]);
    graph.load(order(1), &[("Customer", &customer(1))]);
    graph.stored(&customer(1), "Orders", &[order(1)]);
    graph.stored(&customer(2), "Orders", &[]);

    let change = graph.plan(|map| map.plan_insert(&ep(&customer(2), "Orders"), 0, &order(1)));
    graph.map.execute(&change, &mut graph.containers, &mut NullSink).unwrap();
    assert_eq!(graph.map.changed_virtual_owners(), vec![customer(1), customer(2)]);

    graph.map.rollback_all();
    graph.containers.rollback_all();

    assert_eq!(graph.related(&customer(1), "Orders"), vec![order(1)]);
    assert!(graph.related(&customer(2), "Orders").is_empty());
    assert_eq!(graph.related(&order(1), "Customer"), vec![customer(1)]);
    assert_eq!(graph.foreign_key(&order(1), "Customer"), Value::Object(customer(1)));
    assert!(graph.map.changed_virtual_owners().is_empty());
}

#[test]
fn commit_adopts_current_relations() {
    let mut graph = Graph::new();
    graph.load(customer(1), &[]);
    graph.load(order(1), &[("Customer", &customer(1))]);
    graph.stored(&customer(1), "Orders", &[order(1)]);

    let change = graph.plan(|map| map.plan_remove(&ep(&customer(1), "Orders"), &order(1)));
    graph.map.execute(&change, &mut graph.containers, &mut NullSink).unwrap();
    graph.map.commit_all();
    graph.containers.commit_all(&HashMap::new());

    let orders = graph.map.get(&ep(&customer(1), "Orders")).unwrap();
    assert!(orders.original_related_ids().is_empty());
    assert!(!orders.has_been_touched());
    assert_eq!(graph.containers.get(&order(1)).unwrap().original_value(&"Customer".into()).unwrap(), &Value::Null);
}
