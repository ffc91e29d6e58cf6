//! Error model of the evaluation pipeline.

use thiserror::Error;

use datascope_core::CompileError;

/// Failure reported by an external collaborator (policy store, org lookup,
/// rule query engine). Adapters map their native errors into this type and
/// the evaluator propagates it unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("failed to decode stored data: {0}")]
    Decode(String),
}

/// Why a data-scope evaluation failed. Every variant fails the whole query
/// closed; no partial predicate is ever returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("policy fetch failed: {0}")]
    PolicyFetch(#[source] StoreError),

    #[error("organization lookup failed: {0}")]
    OrgLookup(#[source] StoreError),

    #[error("rule query failed: {0}")]
    RuleQuery(#[source] StoreError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("evaluation cancelled")]
    Cancelled,
}

/// Startup-time registration conflicts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("rule '{key}' = '{value}' is already registered")]
    DuplicateRule { key: String, value: String },

    #[error("extension function '{0}' is already registered")]
    DuplicateExtension(String),
}
