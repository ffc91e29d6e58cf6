use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use datascope_core::{AppId, FilterGroup, ResourceKey, UserId};
use datascope_policy::{
    OrgHierarchyLookup, PolicyStore, RulePair, RuleQueryEngine, StoreError, UnionQuery,
};

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PolicyKey {
    user_id: UserId,
    resource_key: ResourceKey,
    app_id: AppId,
}

/// In-memory policy store.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<HashMap<PolicyKey, Vec<FilterGroup>>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the groups stored for `(user, resource, app)`.
    pub fn put(
        &self,
        user_id: impl Into<UserId>,
        resource_key: impl Into<ResourceKey>,
        app_id: impl Into<AppId>,
        groups: Vec<FilterGroup>,
    ) -> Result<(), StoreError> {
        let key = PolicyKey {
            user_id: user_id.into(),
            resource_key: resource_key.into(),
            app_id: app_id.into(),
        };
        self.policies.write().map_err(|_| poisoned())?.insert(key, groups);
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get_filter_groups(
        &self,
        user_id: &UserId,
        resource_key: &ResourceKey,
        app_id: &AppId,
    ) -> Result<Vec<FilterGroup>, StoreError> {
        let key = PolicyKey {
            user_id: user_id.clone(),
            resource_key: resource_key.clone(),
            app_id: app_id.clone(),
        };
        let policies = self.policies.read().map_err(|_| poisoned())?;
        Ok(policies.get(&key).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct OrgTree {
    children: HashMap<String, Vec<String>>,
    members: HashMap<(UserId, AppId), Vec<String>>,
}

/// In-memory organization tree plus user assignments.
#[derive(Debug, Default)]
pub struct InMemoryOrgDirectory {
    tree: RwLock<OrgTree>,
}

impl InMemoryOrgDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` as a direct child unit of `parent`.
    pub fn add_child(
        &self,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut tree = self.tree.write().map_err(|_| poisoned())?;
        tree.children.entry(parent.into()).or_default().push(child.into());
        Ok(())
    }

    /// Make `user_id` a member of `unit` within `app_id`.
    pub fn assign(
        &self,
        user_id: impl Into<UserId>,
        app_id: impl Into<AppId>,
        unit: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut tree = self.tree.write().map_err(|_| poisoned())?;
        let units = tree.members.entry((user_id.into(), app_id.into())).or_default();
        let unit = unit.into();
        if !units.contains(&unit) {
            units.push(unit);
        }
        Ok(())
    }
}

#[async_trait]
impl OrgHierarchyLookup for InMemoryOrgDirectory {
    async fn get_org_ids(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError> {
        let tree = self.tree.read().map_err(|_| poisoned())?;
        Ok(tree
            .members
            .get(&(user_id.clone(), app_id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_org_subtree_ids(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError> {
        let tree = self.tree.read().map_err(|_| poisoned())?;
        let roots = tree
            .members
            .get(&(user_id.clone(), app_id.clone()))
            .cloned()
            .unwrap_or_default();

        // Breadth-first; the visited set also guards against cycles.
        let mut seen: HashSet<String> = HashSet::new();
        let mut ordered = Vec::new();
        let mut queue: VecDeque<String> = roots.into();
        while let Some(unit) = queue.pop_front() {
            if !seen.insert(unit.clone()) {
                continue;
            }
            if let Some(children) = tree.children.get(&unit) {
                queue.extend(children.iter().cloned());
            }
            ordered.push(unit);
        }
        Ok(ordered)
    }
}

/// Rule engine answering each fragment from canned rows.
///
/// Every query it receives is recorded so tests can assert round-trips.
#[derive(Debug, Default)]
pub struct InMemoryRuleEngine {
    responses: RwLock<HashMap<String, Vec<RulePair>>>,
    queries: Mutex<Vec<UnionQuery>>,
}

impl InMemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned whenever `fragment` is part of a query.
    pub fn respond(
        &self,
        fragment: impl Into<String>,
        rows: Vec<RulePair>,
    ) -> Result<(), StoreError> {
        self.responses
            .write()
            .map_err(|_| poisoned())?
            .insert(fragment.into(), rows);
        Ok(())
    }

    /// Queries received so far, oldest first.
    pub fn queries(&self) -> Vec<UnionQuery> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RuleQueryEngine for InMemoryRuleEngine {
    async fn query_pairs(&self, query: &UnionQuery) -> Result<Vec<RulePair>, StoreError> {
        self.queries.lock().map_err(|_| poisoned())?.push(query.clone());

        let responses = self.responses.read().map_err(|_| poisoned())?;
        let mut rows = Vec::new();
        for fragment in query.fragments() {
            match responses.get(fragment) {
                Some(pairs) => rows.extend(pairs.iter().cloned()),
                None => {
                    return Err(StoreError::Query(format!(
                        "no canned rows for fragment '{fragment}'"
                    )));
                }
            }
        }
        Ok(rows)
    }
}
