//! Infrastructure layer: policy/org/rule stores, SQL rendering, config.

pub mod config;
pub mod scope_store;
pub mod sql;

pub use config::DataScopeConfig;
pub use scope_store::in_memory::{InMemoryOrgDirectory, InMemoryPolicyStore, InMemoryRuleEngine};
pub use scope_store::postgres::{PgOrgHierarchy, PgPolicyStore, PgRuleQueryEngine};
pub use sql::{push_predicate, scoped_select};
