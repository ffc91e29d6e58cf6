//! External collaborators consulted during evaluation.
//!
//! Implementations live in the infra layer (in-memory for tests/dev,
//! Postgres for production). Retries and backoff, if any, belong there too.

use std::sync::Arc;

use async_trait::async_trait;

use datascope_core::{AppId, FilterGroup, ResourceKey, UserId};

use crate::error::StoreError;

/// Source of raw, unresolved policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get_filter_groups(
        &self,
        user_id: &UserId,
        resource_key: &ResourceKey,
        app_id: &AppId,
    ) -> Result<Vec<FilterGroup>, StoreError>;
}

/// Organization membership of a user.
#[async_trait]
pub trait OrgHierarchyLookup: Send + Sync {
    /// Organizational unit ids the user belongs to.
    async fn get_org_ids(&self, user_id: &UserId, app_id: &AppId)
        -> Result<Vec<String>, StoreError>;

    /// The user's units plus every transitive child unit.
    async fn get_org_subtree_ids(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError>;
}

/// One row of the unioned rule query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RulePair {
    pub id: String,
    /// `"{Key},{Value}"` of the rule that produced the row.
    pub map_key: String,
}

impl RulePair {
    pub fn new(id: impl Into<String>, map_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            map_key: map_key.into(),
        }
    }
}

/// The batch of rule fragments sent as a single query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnionQuery {
    fragments: Vec<String>,
}

impl UnionQuery {
    pub fn new(fragments: Vec<String>) -> Self {
        Self { fragments }
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// `SELECT "Id", "MapKey" FROM ((f1) UNION (f2) ...)`, cast to text.
    pub fn to_sql(&self) -> String {
        let union = self
            .fragments
            .iter()
            .map(|f| format!("({f})"))
            .collect::<Vec<_>>()
            .join(" UNION ");
        format!(
            concat!(
                r#"SELECT CAST(u."Id" AS TEXT) AS "Id", "#,
                r#"CAST(u."MapKey" AS TEXT) AS "MapKey" FROM ({union}) AS u"#
            ),
            union = union
        )
    }
}

/// Executes the unioned rule query against the underlying store.
#[async_trait]
pub trait RuleQueryEngine: Send + Sync {
    async fn query_pairs(&self, query: &UnionQuery) -> Result<Vec<RulePair>, StoreError>;
}

#[async_trait]
impl<S> PolicyStore for Arc<S>
where
    S: PolicyStore + ?Sized,
{
    async fn get_filter_groups(
        &self,
        user_id: &UserId,
        resource_key: &ResourceKey,
        app_id: &AppId,
    ) -> Result<Vec<FilterGroup>, StoreError> {
        (**self).get_filter_groups(user_id, resource_key, app_id).await
    }
}

#[async_trait]
impl<S> OrgHierarchyLookup for Arc<S>
where
    S: OrgHierarchyLookup + ?Sized,
{
    async fn get_org_ids(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError> {
        (**self).get_org_ids(user_id, app_id).await
    }

    async fn get_org_subtree_ids(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError> {
        (**self).get_org_subtree_ids(user_id, app_id).await
    }
}

#[async_trait]
impl<S> RuleQueryEngine for Arc<S>
where
    S: RuleQueryEngine + ?Sized,
{
    async fn query_pairs(&self, query: &UnionQuery) -> Result<Vec<RulePair>, StoreError> {
        (**self).query_pairs(query).await
    }
}
