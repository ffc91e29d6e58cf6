//! Data scope evaluation.
//!
//! Turns a user's stored filter groups for a resource into a single
//! [`Predicate`] over that resource's rows:
//!
//! 1. fetch the groups ([`PolicyStore`])
//! 2. substitute identity placeholders ([`PlaceholderResolver`])
//! 3. look up organization ids ([`OrgHierarchyLookup`])
//! 4. rewrite rule references through one unioned query ([`SetMembershipResolver`])
//! 5. compile and fold ([`ExpressionCompiler`])
//!
//! [`FilterGroupEvaluator`] drives the whole sequence.

pub mod cancel;
pub mod coercion;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod extension;
pub mod membership;
pub mod placeholder;
pub mod predicate;
pub mod rules;
pub mod source;

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use coercion::{parse_datetime, parse_literal};
pub use compiler::ExpressionCompiler;
pub use error::{EvaluationError, RegistryError, StoreError};
pub use evaluator::{EvaluatorSettings, FilterGroupEvaluator, ScopeRequest};
pub use extension::{ExtensionFn, ExtensionTable, SEMI_JOIN};
pub use membership::SetMembershipResolver;
pub use placeholder::{
    OrgScope, PendingFilter, PendingGroup, PlaceholderResolver, ResolvedPlaceholders,
    ORGANIZATIONAL_UNIT_ID, SELF_ORGANIZATION_CHILDREN_IDS, SELF_ORGANIZATION_ID, SELF_USER_ID,
};
pub use predicate::{CompareOp, Predicate};
pub use rules::{Rule, RuleDescriptor, RuleRegistry, SqlRule};
pub use source::{OrgHierarchyLookup, PolicyStore, RulePair, RuleQueryEngine, UnionQuery};

/// Comma-separated list items, trimmed, empties dropped.
pub(crate) fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}
