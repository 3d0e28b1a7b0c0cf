//! Integration tests for Layer 0: Foundation
//!
//! Tests for object identities, values, and errors.

mod ids;
mod values;
