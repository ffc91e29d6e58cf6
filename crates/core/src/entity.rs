//! Typed models that can be filtered by a data scope.

use std::collections::HashMap;

use crate::join::SemiJoin;
use crate::schema::EntitySchema;
use crate::value::Value;

/// Read access to a row, as needed to evaluate a compiled predicate in memory.
pub trait Row {
    /// Field value by model-level name. `None` means the row has no such
    /// field; `Some(Value::Null)` means the field exists and is null.
    fn field_value(&self, field: &str) -> Option<Value>;

    /// Whether the join table links this row to one of `join.members`.
    ///
    /// Rows that carry no link information never match.
    fn semi_join_matches(&self, join: &SemiJoin) -> bool {
        let _ = join;
        false
    }
}

/// A strongly-typed entity with a static field schema.
pub trait ScopedEntity: Row {
    /// Schema the compiler resolves filter keys against.
    fn schema() -> EntitySchema;
}

impl Row for HashMap<String, Value> {
    fn field_value(&self, field: &str) -> Option<Value> {
        self.get(field).cloned()
    }
}
