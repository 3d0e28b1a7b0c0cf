//! The validated mapping configuration.

use std::collections::{HashMap, HashSet};

use weft_foundation::{ClassId, Error, ErrorKind, PropertyName, Result, Value, ValueType};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::class::ClassDefinition;
use crate::property::PropertyDefinition;
use crate::relation::{Cardinality, RelationDefinition, RelationEndPointDefinition};

/// Immutable class and relation metadata, resolved and validated.
///
/// Built once by [`MappingBuilder::build`] and shared by every transaction.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MappingConfiguration {
    /// Resolved classes (inherited members included).
    classes: HashMap<ClassId, ClassDefinition>,
    /// All relations in declaration order.
    relations: Vec<RelationDefinition>,
}

impl MappingConfiguration {
    /// Starts building a configuration.
    #[must_use]
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    /// Gets a class definition.
    ///
    /// # Errors
    ///
    /// Returns `UnknownClass` if the class is not mapped.
    pub fn class(&self, id: &ClassId) -> Result<&ClassDefinition> {
        self.classes
            .get(id)
            .ok_or_else(|| Error::new(ErrorKind::UnknownClass(id.clone())))
    }

    /// Iterates over all class definitions.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.classes.values()
    }

    /// Returns all relation definitions.
    #[must_use]
    pub fn relations(&self) -> &[RelationDefinition] {
        &self.relations
    }

    /// Gets a stored property of a class.
    ///
    /// # Errors
    ///
    /// Returns `RelationProperty` for virtual end points, `UnknownProperty`
    /// if the class has no member with that name.
    pub fn property(&self, class: &ClassId, name: &PropertyName) -> Result<&PropertyDefinition> {
        let def = self.class(class)?;
        if let Some(property) = def.property(name) {
            return Ok(property);
        }
        if def.end_point(name).is_some() {
            return Err(Error::new(ErrorKind::RelationProperty(name.clone())));
        }
        Err(Error::unknown_property(class.clone(), name.clone()))
    }

    /// Gets a relation end point of a class.
    ///
    /// # Errors
    ///
    /// Returns `NotARelation` for scalar properties, `UnknownProperty` if the
    /// class has no member with that name.
    pub fn end_point(
        &self,
        class: &ClassId,
        name: &PropertyName,
    ) -> Result<&RelationEndPointDefinition> {
        let def = self.class(class)?;
        if let Some(end_point) = def.end_point(name) {
            return Ok(end_point);
        }
        if def.property(name).is_some() {
            return Err(Error::new(ErrorKind::NotARelation(name.clone())));
        }
        Err(Error::unknown_property(class.clone(), name.clone()))
    }

    /// Gets the other side of a relation.
    ///
    /// # Errors
    ///
    /// Returns an error if the opposite class is not mapped.
    pub fn opposite_end_point(
        &self,
        end_point: &RelationEndPointDefinition,
    ) -> Result<&RelationEndPointDefinition> {
        self.end_point(&end_point.opposite_class, &end_point.opposite_property)
    }

    /// Returns true if an object of class `from` can be used where `to` is declared.
    #[must_use]
    pub fn is_assignable(&self, from: &ClassId, to: &ClassId) -> bool {
        let mut current = Some(from);
        while let Some(class) = current {
            if class == to {
                return true;
            }
            current = self.classes.get(class).and_then(|c| c.base_class.as_ref());
        }
        false
    }

    /// Returns the class and every class derived from it.
    #[must_use]
    pub fn assignable_classes(&self, class: &ClassId) -> HashSet<ClassId> {
        self.classes
            .keys()
            .filter(|candidate| self.is_assignable(candidate, class))
            .cloned()
            .collect()
    }

    /// Validates a value against a property definition.
    ///
    /// # Errors
    ///
    /// Returns `NullNotAllowed`, `TypeMismatch`, or `ValueTooLong`.
    pub fn check_value(&self, property: &PropertyDefinition, value: &Value) -> Result<()> {
        let Some(actual) = value.value_type() else {
            if property.nullable {
                return Ok(());
            }
            return Err(Error::new(ErrorKind::NullNotAllowed(property.name.clone())));
        };

        let compatible = match (&property.value_type, &actual) {
            (ValueType::Object(expected), ValueType::Object(actual)) => {
                self.is_assignable(actual, expected)
            }
            (expected, actual) => expected == actual,
        };
        if !compatible {
            return Err(Error::type_mismatch(property.value_type.clone(), Some(actual)));
        }

        if let (Some(max_length), Some(s)) = (property.max_length, value.as_str()) {
            if s.chars().count() > max_length {
                return Err(Error::new(ErrorKind::ValueTooLong {
                    property: property.name.clone(),
                    max_length,
                }));
            }
        }
        Ok(())
    }
}

/// Collects class and relation declarations and resolves them.
#[derive(Clone, Debug, Default)]
pub struct MappingBuilder {
    classes: Vec<ClassDefinition>,
    relations: Vec<RelationDefinition>,
}

impl MappingBuilder {
    /// Adds a class declaration (own members only).
    #[must_use]
    pub fn class(mut self, class: ClassDefinition) -> Self {
        self.classes.push(class);
        self
    }

    /// Adds a relation declaration.
    #[must_use]
    pub fn relation(mut self, relation: RelationDefinition) -> Self {
        self.relations.push(relation);
        self
    }

    /// Validates the declarations and resolves inheritance.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` if:
    /// - A class is declared twice, or its base class is unknown or cyclic
    /// - A relation refers to an unknown class
    /// - A relation does not have exactly one real and one virtual end point
    /// - A real end point has cardinality many
    /// - A sort expression is declared on a single-valued end point or names
    ///   a property the item class does not have
    /// - A member name is declared twice on a class or its bases
    pub fn build(self) -> Result<MappingConfiguration> {
        let mut own: HashMap<ClassId, ClassDefinition> = HashMap::new();
        let mut order = Vec::new();
        for class in self.classes {
            if own.contains_key(&class.id) {
                return Err(invalid(format!("class {} declared twice", class.id)));
            }
            order.push(class.id.clone());
            own.insert(class.id.clone(), class);
        }

        for relation in &self.relations {
            attach_relation(&mut own, relation)?;
        }

        let mut resolved = HashMap::new();
        for id in &order {
            resolve(id, &own, &mut resolved, &mut Vec::new())?;
        }

        let config = MappingConfiguration {
            classes: resolved,
            relations: self.relations,
        };

        for relation in &config.relations {
            for end_point in &relation.end_points {
                check_sort_expression(&config, end_point)?;
            }
        }

        Ok(config)
    }
}

fn invalid(message: String) -> Error {
    Error::new(ErrorKind::InvalidMapping(message))
}

fn attach_relation(
    own: &mut HashMap<ClassId, ClassDefinition>,
    relation: &RelationDefinition,
) -> Result<()> {
    let [a, b] = &relation.end_points;
    if a.is_virtual == b.is_virtual {
        return Err(invalid(format!(
            "relation {} needs exactly one real end point",
            relation.id
        )));
    }
    for end_point in &relation.end_points {
        if end_point.is_real() && end_point.cardinality == Cardinality::Many {
            return Err(invalid(format!(
                "real end point {}.{} cannot hold a collection",
                end_point.class_id, end_point.property
            )));
        }
        if end_point.sort_expression.is_some() && !end_point.is_collection() {
            return Err(invalid(format!(
                "sort expression on single-valued end point {}.{}",
                end_point.class_id, end_point.property
            )));
        }
        if !own.contains_key(&end_point.opposite_class) {
            return Err(invalid(format!(
                "relation {} refers to unknown class {}",
                relation.id, end_point.opposite_class
            )));
        }
        let class = own.get_mut(&end_point.class_id).ok_or_else(|| {
            invalid(format!(
                "relation {} refers to unknown class {}",
                relation.id, end_point.class_id
            ))
        })?;
        if class.declares(&end_point.property) {
            return Err(invalid(format!(
                "{}.{} declared twice",
                end_point.class_id, end_point.property
            )));
        }
        if end_point.is_real() {
            class.properties.push(PropertyDefinition::foreign_key(
                end_point.property.clone(),
                ValueType::Object(end_point.opposite_class.clone()),
            ));
        }
        class.end_points.push(end_point.clone());
    }
    Ok(())
}

fn resolve(
    id: &ClassId,
    own: &HashMap<ClassId, ClassDefinition>,
    resolved: &mut HashMap<ClassId, ClassDefinition>,
    visiting: &mut Vec<ClassId>,
) -> Result<ClassDefinition> {
    if let Some(done) = resolved.get(id) {
        return Ok(done.clone());
    }
    if visiting.contains(id) {
        return Err(invalid(format!("inheritance cycle through {id}")));
    }
    let class = own
        .get(id)
        .ok_or_else(|| invalid(format!("unknown base class {id}")))?;

    let mut result = ClassDefinition::new(id.clone());
    result.base_class = class.base_class.clone();
    if let Some(base) = &class.base_class {
        visiting.push(id.clone());
        let base = resolve(base, own, resolved, visiting)?;
        visiting.pop();
        result.properties = base.properties;
        result.end_points = base.end_points;
    }

    for property in &class.properties {
        if result.declares(&property.name) {
            return Err(invalid(format!("{id}.{} declared twice", property.name)));
        }
        result.properties.push(property.clone());
    }
    for end_point in &class.end_points {
        if result.end_point(&end_point.property).is_some() {
            return Err(invalid(format!("{id}.{} declared twice", end_point.property)));
        }
        result.end_points.push(end_point.clone());
    }

    resolved.insert(id.clone(), result.clone());
    Ok(result)
}

fn check_sort_expression(
    config: &MappingConfiguration,
    end_point: &RelationEndPointDefinition,
) -> Result<()> {
    let Some(sort) = &end_point.sort_expression else {
        return Ok(());
    };
    let item_class = config.class(&end_point.opposite_class)?;
    for spec in &sort.specs {
        if item_class.property(&spec.property).is_none() {
            return Err(invalid(format!(
                "sort property {} not found on {}",
                spec.property, item_class.id
            )));
        }
    }
    Ok(())
}
