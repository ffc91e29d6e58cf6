//! Rule-backed set membership, resolved with one batched query.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use datascope_core::{Combinator, Filter, Operator};

use crate::cancel::CancelSignal;
use crate::error::EvaluationError;
use crate::placeholder::{PendingFilter, PendingGroup};
use crate::rules::RuleRegistry;
use crate::source::{RulePair, RuleQueryEngine, UnionQuery};

/// Rewrites rule-backed filters into concrete id filters.
///
/// All groups are scanned before anything is queried, so an evaluation costs
/// at most one rule query however many filters reference rules.
#[derive(Debug, Clone)]
pub struct SetMembershipResolver {
    registry: Arc<RuleRegistry>,
}

impl SetMembershipResolver {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Fragments of every distinct rule referenced by a literal filter.
    pub fn batch(&self, groups: &[PendingGroup]) -> UnionQuery {
        let mut seen = HashSet::new();
        let mut fragments = Vec::new();
        for filter in literal_filters(groups) {
            if let Some(rule) = self.registry.find(&filter.key, &filter.value) {
                if seen.insert(rule.correlation_key()) {
                    fragments.push(rule.sql_fragment());
                }
            }
        }
        UnionQuery::new(fragments)
    }

    /// Rewrite rule-backed filters using the rows of the unioned query.
    ///
    /// `In` keeps its operator with the comma-joined ids as value. Any other
    /// operator is replaced by one equality per id, the first keeping the
    /// original combinator and the rest joined by `or`. A rule that yields no
    /// ids turns the filter into an unsatisfiable one.
    pub fn apply(&self, groups: &mut [PendingGroup], rows: &[RulePair]) {
        let mut ids_by_key: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for row in rows {
            if seen.insert((row.map_key.as_str(), row.id.as_str())) {
                ids_by_key
                    .entry(row.map_key.as_str())
                    .or_default()
                    .push(row.id.as_str());
            }
        }

        for group in groups.iter_mut() {
            let mut rewritten = Vec::with_capacity(group.filters.len());
            for slot in group.filters.drain(..) {
                match slot {
                    PendingFilter::Literal(filter)
                        if self.registry.find(&filter.key, &filter.value).is_some() =>
                    {
                        let ids = ids_by_key
                            .get(filter.correlation_key().as_str())
                            .map(Vec::as_slice)
                            .unwrap_or_default();
                        debug!(
                            key = %filter.key,
                            value = %filter.value,
                            ids = ids.len(),
                            "rule resolved"
                        );
                        rewritten.extend(
                            expand(filter, ids)
                                .into_iter()
                                .map(PendingFilter::Literal),
                        );
                    }
                    other => rewritten.push(other),
                }
            }
            group.filters = rewritten;
        }
    }

    /// Batch, query once (if anything references a rule) and rewrite.
    ///
    /// Returns whether a query was issued.
    pub async fn resolve<Q>(
        &self,
        groups: &mut [PendingGroup],
        engine: &Q,
        cancel: &CancelSignal,
    ) -> Result<bool, EvaluationError>
    where
        Q: RuleQueryEngine + ?Sized,
    {
        let query = self.batch(groups);
        if query.is_empty() {
            return Ok(false);
        }

        debug!(rules = query.fragments().len(), "issuing unioned rule query");
        let rows = cancel
            .guard(async {
                engine
                    .query_pairs(&query)
                    .await
                    .map_err(EvaluationError::RuleQuery)
            })
            .await?;

        self.apply(groups, &rows);
        Ok(true)
    }
}

fn literal_filters(groups: &[PendingGroup]) -> impl Iterator<Item = &Filter> {
    groups.iter().flat_map(|g| g.filters.iter()).filter_map(|slot| match slot {
        PendingFilter::Literal(f) => Some(f),
        PendingFilter::Org { .. } => None,
    })
}

fn expand(filter: Filter, ids: &[&str]) -> Vec<Filter> {
    if filter.operator == Operator::In {
        return vec![Filter {
            value: ids.join(","),
            ..filter
        }];
    }

    if ids.is_empty() {
        return vec![Filter::unsatisfiable(filter.key).with_combinator(filter.combinator)];
    }

    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let combinator = if i == 0 { filter.combinator } else { Combinator::Or };
            Filter::eq(filter.key.clone(), *id)
                .with_combinator(combinator)
                .with_declared_type(filter.declared_type.clone())
        })
        .collect()
}
