//! Single entry point: policies in, predicate out.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use datascope_core::{
    AppId, Combinator, EntitySchema, FieldRef, Filter, FilterGroup, JoinTable, Operator,
    ResourceKey, ScopedEntity, UserId,
};

use crate::cancel::CancelSignal;
use crate::compiler::ExpressionCompiler;
use crate::error::{EvaluationError, RegistryError};
use crate::extension::{ExtensionTable, SEMI_JOIN};
use crate::membership::SetMembershipResolver;
use crate::placeholder::{OrgScope, PendingFilter, PlaceholderResolver, ORGANIZATIONAL_UNIT_ID};
use crate::predicate::Predicate;
use crate::rules::RuleRegistry;
use crate::source::{OrgHierarchyLookup, PolicyStore, RuleQueryEngine};

/// Field names and join-table layout the evaluator works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorSettings {
    /// Field carrying the row's organizational unit.
    pub org_field: String,
    /// Field correlated with the join table's business id column.
    pub row_id_field: String,
    pub join: JoinTable,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            org_field: ORGANIZATIONAL_UNIT_ID.to_string(),
            row_id_field: "Id".to_string(),
            join: JoinTable::default(),
        }
    }
}

/// Who is asking, for what.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeRequest {
    pub user_id: UserId,
    pub resource_key: ResourceKey,
    pub app_id: AppId,
}

impl ScopeRequest {
    pub fn new(
        user_id: impl Into<UserId>,
        resource_key: impl Into<ResourceKey>,
        app_id: impl Into<AppId>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            resource_key: resource_key.into(),
            app_id: app_id.into(),
        }
    }
}

/// Resolves a user's data scope on a resource into one predicate.
///
/// Round-trips per evaluation: one policy fetch, up to two organization
/// lookups (run concurrently) and at most one unioned rule query.
///
/// Posture:
/// - no policy rows → no restriction (fail-open, logged)
/// - any compile or store error → the evaluation fails (fail-closed)
pub struct FilterGroupEvaluator<P, O, Q> {
    policies: P,
    orgs: O,
    rule_engine: Q,
    placeholders: PlaceholderResolver,
    membership: SetMembershipResolver,
    compiler: ExpressionCompiler,
    settings: EvaluatorSettings,
}

impl<P, O, Q> FilterGroupEvaluator<P, O, Q>
where
    P: PolicyStore,
    O: OrgHierarchyLookup,
    Q: RuleQueryEngine,
{
    pub fn new(
        policies: P,
        orgs: O,
        rule_engine: Q,
        rules: Arc<RuleRegistry>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            policies,
            orgs,
            rule_engine,
            placeholders: PlaceholderResolver::new(settings.org_field.clone()),
            membership: SetMembershipResolver::new(rules),
            compiler: ExpressionCompiler::new(ExtensionTable::standard(settings.join.clone())),
            settings,
        }
    }

    /// Add an extension function next to the built-in `semi_join`.
    pub fn register_extension<F>(
        &mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&str, &FieldRef) -> Predicate + Send + Sync + 'static,
    {
        self.compiler.register_extension(name, function)
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    pub fn rules(&self) -> &RuleRegistry {
        self.membership.registry()
    }

    /// Resolve the predicate for `request` against `schema`.
    #[instrument(
        skip_all,
        fields(
            user_id = %request.user_id,
            resource = %request.resource_key,
            app_id = %request.app_id,
            table = schema.table()
        ),
        err
    )]
    pub async fn resolve(
        &self,
        schema: &EntitySchema,
        request: &ScopeRequest,
        cancel: &CancelSignal,
    ) -> Result<Predicate, EvaluationError> {
        let Some(groups) = self.materialize(request, cancel).await? else {
            return Ok(Predicate::always());
        };

        let predicate = self
            .compiler
            .fold_groups(schema, &groups)?
            .map(Predicate::simplify)
            .unwrap_or_else(Predicate::always);

        debug!(predicate = %predicate, "data scope resolved");
        Ok(predicate)
    }

    /// [`resolve`](Self::resolve) against a typed entity's own schema.
    pub async fn resolve_for<E: ScopedEntity>(
        &self,
        request: &ScopeRequest,
        cancel: &CancelSignal,
    ) -> Result<Predicate, EvaluationError> {
        self.resolve(&E::schema(), request, cancel).await
    }

    /// Fetch and resolve policies into plain filter groups, ready to compile.
    ///
    /// `None` means the store returned no policy rows at all.
    pub async fn materialize(
        &self,
        request: &ScopeRequest,
        cancel: &CancelSignal,
    ) -> Result<Option<Vec<FilterGroup>>, EvaluationError> {
        let raw = cancel
            .guard(async {
                self.policies
                    .get_filter_groups(&request.user_id, &request.resource_key, &request.app_id)
                    .await
                    .map_err(EvaluationError::PolicyFetch)
            })
            .await?;

        if raw.is_empty() {
            info!(
                user_id = %request.user_id,
                resource = %request.resource_key,
                "no data scope policy rows; access is unrestricted"
            );
            return Ok(None);
        }

        let resolved = self.placeholders.resolve(raw, &request.user_id);
        let (org_ids, subtree_ids) = self
            .fetch_org_ids(
                request,
                resolved.needs_org_ids,
                resolved.needs_org_subtree_ids,
                cancel,
            )
            .await?;

        let mut groups = resolved.groups;
        self.membership
            .resolve(&mut groups, &self.rule_engine, cancel)
            .await?;

        let materialized = groups
            .into_iter()
            .map(|group| {
                let mut filters = Vec::with_capacity(group.filters.len());
                for slot in group.filters {
                    match slot {
                        PendingFilter::Literal(f) => filters.push(f),
                        PendingFilter::Org { filter, scope } => {
                            let ids = match scope {
                                OrgScope::Own => &org_ids,
                                OrgScope::Subtree => &subtree_ids,
                            };
                            filters.extend(self.org_filters(filter, ids));
                        }
                    }
                }
                FilterGroup::new(group.combinator, filters)
            })
            .collect();

        Ok(Some(materialized))
    }

    async fn fetch_org_ids(
        &self,
        request: &ScopeRequest,
        own: bool,
        subtree: bool,
        cancel: &CancelSignal,
    ) -> Result<(Vec<String>, Vec<String>), EvaluationError> {
        if !own && !subtree {
            return Ok((Vec::new(), Vec::new()));
        }

        let user_id = &request.user_id;
        let app_id = &request.app_id;
        cancel
            .guard(async {
                let own_ids = async {
                    if own {
                        self.orgs.get_org_ids(user_id, app_id).await
                    } else {
                        Ok(Vec::new())
                    }
                };
                let subtree_ids = async {
                    if subtree {
                        self.orgs.get_org_subtree_ids(user_id, app_id).await
                    } else {
                        Ok(Vec::new())
                    }
                };
                tokio::try_join!(own_ids, subtree_ids).map_err(EvaluationError::OrgLookup)
            })
            .await
    }

    // `org IN (ids)` OR the join table links the row to one of `ids`. An
    // empty list denies instead of producing an empty `IN`.
    fn org_filters(&self, placeholder: Filter, ids: &[String]) -> Vec<Filter> {
        let mut unique: Vec<&str> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id.as_str()) {
                unique.push(id);
            }
        }

        if unique.is_empty() {
            debug!(field = %self.settings.org_field, "organization list is empty; denying");
            return vec![
                Filter::unsatisfiable(self.settings.org_field.clone())
                    .with_combinator(placeholder.combinator),
            ];
        }

        let joined = unique.join(",");
        vec![
            Filter {
                key: self.settings.org_field.clone(),
                value: joined.clone(),
                operator: Operator::In,
                combinator: placeholder.combinator,
                declared_type: placeholder.declared_type,
            },
            Filter::new(
                self.settings.row_id_field.clone(),
                Operator::extended(SEMI_JOIN),
                joined,
            )
            .with_combinator(Combinator::Or),
        ]
    }
}
