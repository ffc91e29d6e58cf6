//! Registered functions behind `Operator::Extended(name)`.
//!
//! The table is built once at startup; the compiler only looks names up.

use std::collections::HashMap;
use std::sync::Arc;

use datascope_core::{FieldRef, JoinTable, SemiJoin};

use crate::error::RegistryError;
use crate::predicate::Predicate;

/// Name of the built-in join-table membership extension.
pub const SEMI_JOIN: &str = "semi_join";

/// `(literal value, resolved field) -> predicate`.
pub type ExtensionFn = Arc<dyn Fn(&str, &FieldRef) -> Predicate + Send + Sync>;

#[derive(Clone, Default)]
pub struct ExtensionTable {
    functions: HashMap<String, ExtensionFn>,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the `semi_join` extension over `join`.
    pub fn standard(join: JoinTable) -> Self {
        let mut table = Self::new();
        table.functions.insert(SEMI_JOIN.to_string(), semi_join(join));
        table
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> Result<(), RegistryError>
    where
        F: Fn(&str, &FieldRef) -> Predicate + Send + Sync + 'static,
    {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(RegistryError::DuplicateExtension(name));
        }
        self.functions.insert(name, Arc::new(function));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl core::fmt::Debug for ExtensionTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ExtensionTable").field("functions", &names).finish()
    }
}

/// Rows linked through `join` to any of the comma-separated member ids.
pub fn semi_join(join: JoinTable) -> ExtensionFn {
    Arc::new(move |literal: &str, field: &FieldRef| {
        let members: Vec<String> = crate::split_list(literal)
            .map(str::to_string)
            .collect();
        if members.is_empty() {
            return Predicate::never();
        }
        Predicate::SemiJoin(SemiJoin {
            join: join.clone(),
            row_field: field.clone(),
            members,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use datascope_core::{EntitySchema, FieldType};

    #[test]
    fn standard_table_builds_semi_join() {
        let table = ExtensionTable::standard(JoinTable::default());
        let id = EntitySchema::new("orders")
            .field("Id", FieldType::string())
            .resolve("Id")
            .unwrap();

        let f = table.get(SEMI_JOIN).unwrap();
        let Predicate::SemiJoin(join) = f("ou-1, ou-2", &id) else {
            panic!("expected a semi-join");
        };
        assert_eq!(join.members, vec!["ou-1".to_string(), "ou-2".to_string()]);
        assert_eq!(join.row_field.entity, "orders");

        assert!(f("", &id).is_never());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut table = ExtensionTable::standard(JoinTable::default());
        let err = table
            .register(SEMI_JOIN, |_: &str, _: &FieldRef| Predicate::always())
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateExtension(SEMI_JOIN.to_string()));

        table
            .register("always", |_: &str, _: &FieldRef| Predicate::always())
            .unwrap();
        assert!(table.contains("always"));
    }
}
