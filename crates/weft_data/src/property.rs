//! Value holder for one scalar or foreign-key property.

use weft_foundation::Value;

/// Original and current value of one property, plus its touched flag.
///
/// `touched` becomes true on any explicit assignment, even when the
/// assigned value equals the current one. It is independent of whether the
/// property has changed.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyState {
    original: Value,
    current: Value,
    touched: bool,
}

impl PropertyState {
    /// Creates an unchanged, untouched state holding `value`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            original: value.clone(),
            current: value,
            touched: false,
        }
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.current
    }

    /// Returns the last committed value.
    #[must_use]
    pub fn original_value(&self) -> &Value {
        &self.original
    }

    /// Assigns a value and marks the property touched.
    pub fn set_value(&mut self, value: Value) {
        self.current = value;
        self.touched = true;
    }

    /// Marks the property touched without changing it.
    pub fn touch(&mut self) {
        self.touched = true;
    }

    /// Returns true if the current value differs from the original.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.current != self.original
    }

    /// Returns true if the property was assigned since the last commit or rollback.
    #[must_use]
    pub fn has_been_touched(&self) -> bool {
        self.touched
    }

    /// Makes the current value the new original.
    pub fn commit(&mut self) {
        self.original = self.current.clone();
        self.touched = false;
    }

    /// Restores the original value.
    pub fn rollback(&mut self) {
        self.current = self.original.clone();
        self.touched = false;
    }
}
