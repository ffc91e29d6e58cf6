//! Field schema of a protected entity (name → semantic type).
//!
//! The compiler resolves filter keys against this schema instead of
//! introspecting any ORM type, which keeps it independent of the storage layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Semantic type of a field, as far as literal coercion is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Int,
    Decimal,
    Double,
    DateTime,
    Bool,
    Guid,
    /// Enumeration with its variant names in ordinal order.
    Enum(Vec<String>),
    String,
}

impl ScalarKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Decimal => "decimal",
            ScalarKind::Double => "double",
            ScalarKind::DateTime => "datetime",
            ScalarKind::Bool => "bool",
            ScalarKind::Guid => "guid",
            ScalarKind::Enum(_) => "enum",
            ScalarKind::String => "string",
        }
    }

    /// Whether `<`, `<=`, `>`, `>=` are meaningful.
    pub fn supports_ordering(&self) -> bool {
        !matches!(self, ScalarKind::String | ScalarKind::Bool)
    }

    /// Ordinal of an enum variant, if this is an enum and the name is known.
    pub fn enum_ordinal(&self, variant: &str) -> Option<usize> {
        match self {
            ScalarKind::Enum(variants) => variants.iter().position(|v| v == variant),
            _ => None,
        }
    }
}

/// Semantic type plus nullability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub kind: ScalarKind,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldType {
    pub fn new(kind: ScalarKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub fn int() -> Self {
        Self::new(ScalarKind::Int)
    }

    pub fn decimal() -> Self {
        Self::new(ScalarKind::Decimal)
    }

    pub fn double() -> Self {
        Self::new(ScalarKind::Double)
    }

    pub fn datetime() -> Self {
        Self::new(ScalarKind::DateTime)
    }

    pub fn bool() -> Self {
        Self::new(ScalarKind::Bool)
    }

    pub fn guid() -> Self {
        Self::new(ScalarKind::Guid)
    }

    pub fn string() -> Self {
        Self::new(ScalarKind::String)
    }

    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ScalarKind::Enum(variants.into_iter().map(Into::into).collect()))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, ScalarKind::Enum(_))
    }
}

impl core::fmt::Display for FieldType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.kind.name())?;
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// A field resolved against a schema: what compiled predicates point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    /// Table (entity) the field belongs to.
    pub entity: String,
    /// Model-level field name, as used in filter keys and rows.
    pub name: String,
    /// Storage column name.
    pub column: String,
    pub ty: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldDef {
    name: String,
    column: String,
    ty: FieldType,
}

/// Schema of one protected entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySchema {
    table: String,
    fields: Vec<FieldDef>,
    index: HashMap<String, usize>,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a field whose column name equals its field name.
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        let name = name.into();
        let column = name.clone();
        self.field_with_column(name, column, ty)
    }

    /// Add a field stored under a different column name. Re-adding a name
    /// replaces the earlier definition.
    pub fn field_with_column(
        mut self,
        name: impl Into<String>,
        column: impl Into<String>,
        ty: FieldType,
    ) -> Self {
        let def = FieldDef {
            name: name.into(),
            column: column.into(),
            ty,
        };
        match self.index.get(&def.name) {
            Some(&idx) => self.fields[idx] = def,
            None => {
                self.index.insert(def.name.clone(), self.fields.len());
                self.fields.push(def);
            }
        }
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolve a filter key. Field names are matched exactly.
    pub fn resolve(&self, name: &str) -> Option<FieldRef> {
        let def = &self.fields[*self.index.get(name)?];
        Some(FieldRef {
            entity: self.table.clone(),
            name: def.name.clone(),
            column: def.column.clone(),
            ty: def.ty.clone(),
        })
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_known_and_unknown_fields() {
        let schema = EntitySchema::new("orders")
            .field("Age", FieldType::int())
            .field_with_column("Name", "customer_name", FieldType::string());

        let age = schema.resolve("Age").unwrap();
        assert_eq!(age.entity, "orders");
        assert_eq!(age.column, "Age");
        assert_eq!(schema.resolve("Name").unwrap().column, "customer_name");
        assert!(schema.resolve("age").is_none());
        assert!(schema.resolve("Missing").is_none());
    }

    #[test]
    fn redefining_a_field_replaces_it() {
        let schema = EntitySchema::new("t")
            .field("Score", FieldType::int())
            .field("Score", FieldType::decimal().nullable());

        assert_eq!(schema.len(), 1);
        assert_eq!(schema.resolve("Score").unwrap().ty.to_string(), "decimal?");
    }

    #[test]
    fn ordering_support_by_kind() {
        assert!(ScalarKind::Int.supports_ordering());
        assert!(ScalarKind::DateTime.supports_ordering());
        assert!(!ScalarKind::String.supports_ordering());
        assert!(!ScalarKind::Bool.supports_ordering());

        let status = FieldType::enumeration(["Draft", "Posted"]);
        assert_eq!(status.kind.enum_ordinal("Posted"), Some(1));
        assert_eq!(status.kind.enum_ordinal("Void"), None);
    }
}
