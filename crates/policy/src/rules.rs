//! Business-defined set-membership rules.
//!
//! A rule maps a `(key, value)` pair appearing in a policy (for example
//! `("CreatorId", "MyTeam")`) to a raw query fragment. The fragment must
//! project exactly two text-castable columns aliased `"Id"` and `"MapKey"`,
//! where `MapKey` equals `"{key},{value}"` of the rule.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::RegistryError;

/// A pluggable set-membership rule.
pub trait Rule: Send + Sync {
    fn key(&self) -> &str;

    fn value(&self) -> &str;

    /// Human-readable name shown in policy-authoring UIs.
    fn label(&self) -> &str;

    /// Query projecting `("Id", "MapKey")` rows.
    fn sql_fragment(&self) -> String;

    /// Free-form metadata for authoring UIs.
    fn extra(&self) -> Option<serde_json::Value> {
        None
    }

    fn correlation_key(&self) -> String {
        format!("{},{}", self.key(), self.value())
    }
}

/// Rule backed by a fixed SQL fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlRule {
    key: String,
    value: String,
    label: String,
    sql: String,
    extra: Option<serde_json::Value>,
}

impl SqlRule {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        label: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            label: label.into(),
            sql: sql.into(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

impl Rule for SqlRule {
    fn key(&self) -> &str {
        &self.key
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn sql_fragment(&self) -> String {
        self.sql.clone()
    }

    fn extra(&self) -> Option<serde_json::Value> {
        self.extra.clone()
    }
}

/// Catalogue entry describing a registered rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDescriptor {
    pub label: String,
    pub value: String,
    pub extra: Option<serde_json::Value>,
}

/// Registered rules, looked up by exact `(key, value)`.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn Rule>>,
    index: HashMap<(String, String), usize>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R: Rule + 'static>(&mut self, rule: R) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(rule))
    }

    pub fn register_arc(&mut self, rule: Arc<dyn Rule>) -> Result<(), RegistryError> {
        let id = (rule.key().to_string(), rule.value().to_string());
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateRule {
                key: id.0,
                value: id.1,
            });
        }
        self.index.insert(id, self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    pub fn with<R: Rule + 'static>(mut self, rule: R) -> Result<Self, RegistryError> {
        self.register(rule)?;
        Ok(self)
    }

    pub fn find(&self, key: &str, value: &str) -> Option<&Arc<dyn Rule>> {
        let idx = self.index.get(&(key.to_string(), value.to_string()))?;
        self.rules.get(*idx)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.iter()
    }

    /// Every rule, in registration order.
    pub fn descriptors(&self) -> Vec<RuleDescriptor> {
        self.rules.iter().map(|r| describe(r.as_ref())).collect()
    }

    /// Rules applicable to one filter key (e.g. the values offered for `CreatorId`).
    pub fn descriptors_for(&self, key: &str) -> Vec<RuleDescriptor> {
        self.rules
            .iter()
            .filter(|r| r.key() == key)
            .map(|r| describe(r.as_ref()))
            .collect()
    }
}

impl core::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.correlation_key()))
            .finish()
    }
}

fn describe(rule: &dyn Rule) -> RuleDescriptor {
    RuleDescriptor {
        label: rule.label().to_string(),
        value: rule.value().to_string(),
        extra: rule.extra(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn my_team() -> SqlRule {
        SqlRule::new(
            "CreatorId",
            "MyTeam",
            "Members of my team",
            r#"SELECT user_id AS "Id", 'CreatorId,MyTeam' AS "MapKey" FROM team_members"#,
        )
    }

    #[test]
    fn lookup_is_exact() {
        let registry = RuleRegistry::new().with(my_team()).unwrap();

        assert!(registry.find("CreatorId", "MyTeam").is_some());
        assert!(registry.find("CreatorId", "myteam").is_none());
        assert!(registry.find("OwnerId", "MyTeam").is_none());
        assert_eq!(
            registry.find("CreatorId", "MyTeam").unwrap().correlation_key(),
            "CreatorId,MyTeam"
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = RuleRegistry::new();
        registry.register(my_team()).unwrap();

        let err = registry.register(my_team()).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateRule {
                key: "CreatorId".into(),
                value: "MyTeam".into()
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn descriptors_list_label_value_extra() {
        let registry = RuleRegistry::new()
            .with(my_team())
            .unwrap()
            .with(
                SqlRule::new("DeptId", "Managed", "Departments I manage", "SELECT 1")
                    .with_extra(serde_json::json!({ "group": "org" })),
            )
            .unwrap();

        let all = registry.descriptors();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].label, "Members of my team");
        assert_eq!(all[0].value, "MyTeam");

        let dept = registry.descriptors_for("DeptId");
        assert_eq!(dept.len(), 1);
        assert_eq!(dept[0].extra, Some(serde_json::json!({ "group": "org" })));
    }
}
