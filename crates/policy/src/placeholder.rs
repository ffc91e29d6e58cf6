//! Reserved context tokens in filter values.
//!
//! `{SelfUserId}` is substituted in place wherever it appears. The two
//! organization tokens only get special handling on the organization field;
//! under any other key they stay literal and may still match a rule.

use datascope_core::{Combinator, Filter, FilterGroup, UserId};

pub const SELF_USER_ID: &str = "{SelfUserId}";
pub const SELF_ORGANIZATION_ID: &str = "{SelfOrganizationId}";
pub const SELF_ORGANIZATION_CHILDREN_IDS: &str = "{SelfOrganizationChildrenIds}";

/// Default name of the organization field.
pub const ORGANIZATIONAL_UNIT_ID: &str = "OrganizationalUnitId";

/// Which organization id list a flagged filter needs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OrgScope {
    /// The user's own units.
    Own,
    /// The user's units and every transitive child.
    Subtree,
}

/// A filter slot during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingFilter {
    /// Ready to compile, or to rewrite through a rule.
    Literal(Filter),
    /// Waiting for an organization id list.
    Org { filter: Filter, scope: OrgScope },
}

impl PendingFilter {
    pub fn combinator(&self) -> Combinator {
        match self {
            PendingFilter::Literal(f) | PendingFilter::Org { filter: f, .. } => f.combinator,
        }
    }
}

/// A filter group whose filters may still be waiting on lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGroup {
    pub combinator: Combinator,
    pub filters: Vec<PendingFilter>,
}

impl PendingGroup {
    /// Convert back to a plain group. Every slot must be a literal by now.
    pub fn into_group(self) -> Option<FilterGroup> {
        let mut filters = Vec::with_capacity(self.filters.len());
        for slot in self.filters {
            match slot {
                PendingFilter::Literal(f) => filters.push(f),
                PendingFilter::Org { .. } => return None,
            }
        }
        Some(FilterGroup::new(self.combinator, filters))
    }
}

/// Output of the placeholder pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedPlaceholders {
    pub groups: Vec<PendingGroup>,
    pub needs_org_ids: bool,
    pub needs_org_subtree_ids: bool,
}

#[derive(Debug, Clone)]
pub struct PlaceholderResolver {
    org_field: String,
}

impl Default for PlaceholderResolver {
    fn default() -> Self {
        Self::new(ORGANIZATIONAL_UNIT_ID)
    }
}

impl PlaceholderResolver {
    pub fn new(org_field: impl Into<String>) -> Self {
        Self {
            org_field: org_field.into(),
        }
    }

    pub fn org_field(&self) -> &str {
        &self.org_field
    }

    pub fn resolve(&self, groups: Vec<FilterGroup>, user_id: &UserId) -> ResolvedPlaceholders {
        let mut out = ResolvedPlaceholders::default();

        for group in groups {
            let mut filters = Vec::with_capacity(group.filters.len());
            for mut filter in group.filters {
                if filter.value.contains(SELF_USER_ID) {
                    filter.value = filter.value.replace(SELF_USER_ID, user_id.as_str());
                }

                match self.org_scope(&filter) {
                    Some(scope) => {
                        match scope {
                            OrgScope::Own => out.needs_org_ids = true,
                            OrgScope::Subtree => out.needs_org_subtree_ids = true,
                        }
                        filters.push(PendingFilter::Org { filter, scope });
                    }
                    None => filters.push(PendingFilter::Literal(filter)),
                }
            }
            out.groups.push(PendingGroup {
                combinator: group.combinator,
                filters,
            });
        }

        out
    }

    fn org_scope(&self, filter: &Filter) -> Option<OrgScope> {
        if filter.key != self.org_field {
            return None;
        }
        if filter.value.contains(SELF_ORGANIZATION_CHILDREN_IDS) {
            Some(OrgScope::Subtree)
        } else if filter.value.contains(SELF_ORGANIZATION_ID) {
            Some(OrgScope::Own)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datascope_core::Operator;

    fn user() -> UserId {
        UserId::new("u-42")
    }

    #[test]
    fn self_user_id_is_substituted_under_any_key() {
        let groups = vec![FilterGroup::and(vec![
            Filter::eq("CreatorId", SELF_USER_ID),
            Filter::new("Watchers", Operator::In, "u-1,{SelfUserId}"),
        ])];

        let out = PlaceholderResolver::default().resolve(groups, &user());
        let PendingFilter::Literal(first) = &out.groups[0].filters[0] else {
            panic!("expected literal");
        };
        let PendingFilter::Literal(second) = &out.groups[0].filters[1] else {
            panic!("expected literal");
        };
        assert_eq!(first.value, "u-42");
        assert_eq!(second.value, "u-1,u-42");
        assert!(!out.needs_org_ids && !out.needs_org_subtree_ids);
    }

    #[test]
    fn org_tokens_are_flagged_on_the_org_field_only() {
        let groups = vec![
            FilterGroup::and(vec![Filter::eq(ORGANIZATIONAL_UNIT_ID, SELF_ORGANIZATION_ID)]),
            FilterGroup::or(vec![
                Filter::eq(ORGANIZATIONAL_UNIT_ID, SELF_ORGANIZATION_CHILDREN_IDS),
                Filter::eq("DepartmentId", SELF_ORGANIZATION_ID),
            ]),
        ];

        let out = PlaceholderResolver::default().resolve(groups, &user());
        assert!(out.needs_org_ids);
        assert!(out.needs_org_subtree_ids);
        assert!(matches!(
            out.groups[0].filters[0],
            PendingFilter::Org { scope: OrgScope::Own, .. }
        ));
        assert!(matches!(
            out.groups[1].filters[0],
            PendingFilter::Org { scope: OrgScope::Subtree, .. }
        ));

        // Same token, other key: left untouched for the rule pass.
        let PendingFilter::Literal(other) = &out.groups[1].filters[1] else {
            panic!("expected literal");
        };
        assert_eq!(other.value, SELF_ORGANIZATION_ID);
    }

    #[test]
    fn org_field_name_is_configurable() {
        let groups = vec![FilterGroup::and(vec![Filter::eq("DeptId", SELF_ORGANIZATION_ID)])];
        let out = PlaceholderResolver::new("DeptId").resolve(groups, &user());
        assert!(out.needs_org_ids);
        assert_eq!(out.groups[0].clone().into_group(), None);
    }
}
