//! Filter → predicate compilation and boolean folding.

use std::collections::HashSet;

use chrono::Duration;
use tracing::debug;

use datascope_core::{
    Combinator, CompileError, CompileResult, EntitySchema, FieldRef, Filter, FilterGroup,
    Operator, ScalarKind, Value,
};

use crate::coercion::{parse_datetime, parse_literal};
use crate::error::RegistryError;
use crate::extension::ExtensionTable;
use crate::predicate::{CompareOp, Predicate};
use crate::split_list;

/// Compiles filters against an entity schema.
///
/// Stateless across calls apart from the extension table fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct ExpressionCompiler {
    extensions: ExtensionTable,
}

impl ExpressionCompiler {
    pub fn new(extensions: ExtensionTable) -> Self {
        Self { extensions }
    }

    pub fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    pub fn register_extension<F>(
        &mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&str, &FieldRef) -> Predicate + Send + Sync + 'static,
    {
        self.extensions.register(name, function)
    }

    /// Compile one filter.
    ///
    /// Returns `Ok(None)` when `filter.key` names no field of `schema`: the
    /// filter is dropped, which is a tolerated policy condition, not an error.
    pub fn compile(
        &self,
        schema: &EntitySchema,
        filter: &Filter,
    ) -> CompileResult<Option<Predicate>> {
        // Neither needs a field: both sides of Intersect are literals, and the
        // synthesized deny filter must hold even when the field is absent.
        if filter.operator == Operator::Intersect {
            return Ok(Some(intersect(&filter.key, &filter.value)));
        }
        if filter.is_unsatisfiable() {
            return Ok(Some(Predicate::never()));
        }

        if let Operator::Extended(name) = &filter.operator {
            if !self.extensions.contains(name) {
                return Err(CompileError::UnknownExtension(name.clone()));
            }
        }

        let Some(field) = schema.resolve(&filter.key) else {
            debug!(key = %filter.key, table = schema.table(), "dropping filter on unknown field");
            return Ok(None);
        };

        let predicate = match &filter.operator {
            Operator::Eq => literal(&field, CompareOp::Eq, &filter.value)?,
            Operator::Ne => literal(&field, CompareOp::Ne, &filter.value)?,
            Operator::Lt => ordering(&field, CompareOp::Lt, &filter.operator, &filter.value)?,
            Operator::Le => ordering(&field, CompareOp::Le, &filter.operator, &filter.value)?,
            Operator::Gt => ordering(&field, CompareOp::Gt, &filter.operator, &filter.value)?,
            Operator::Ge => ordering(&field, CompareOp::Ge, &filter.operator, &filter.value)?,
            Operator::Contains => contains(field, &filter.value)?,
            Operator::In => membership(field, &filter.value, true)?,
            Operator::NotIn => membership(field, &filter.value, false)?,
            Operator::Between => between(field, &filter.value)?,
            Operator::Extended(name) => {
                let function = self
                    .extensions
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownExtension(name.clone()))?;
                function(filter.value.as_str(), &field)
            }
            Operator::Intersect => intersect(&filter.key, &filter.value),
        };

        Ok(Some(predicate))
    }

    /// Left-fold a group's surviving filters, each joined by its own combinator.
    ///
    /// The first surviving filter seeds the fold. `None` means every filter
    /// was dropped and the group restricts nothing.
    pub fn fold_group(
        &self,
        schema: &EntitySchema,
        group: &FilterGroup,
    ) -> CompileResult<Option<Predicate>> {
        let mut acc: Option<Predicate> = None;
        for filter in &group.filters {
            if let Some(fragment) = self.compile(schema, filter)? {
                acc = Some(combine(acc, filter.combinator, fragment));
            }
        }
        Ok(acc)
    }

    /// Left-fold groups by each group's combinator; the seeding group's
    /// combinator is never consulted and empty groups contribute nothing.
    pub fn fold_groups(
        &self,
        schema: &EntitySchema,
        groups: &[FilterGroup],
    ) -> CompileResult<Option<Predicate>> {
        let mut acc: Option<Predicate> = None;
        for group in groups {
            if let Some(fragment) = self.fold_group(schema, group)? {
                acc = Some(combine(acc, group.combinator, fragment));
            }
        }
        Ok(acc)
    }
}

fn combine(acc: Option<Predicate>, combinator: Combinator, next: Predicate) -> Predicate {
    match (acc, combinator) {
        (None, _) => next,
        (Some(prev), Combinator::And) => prev.and(next),
        (Some(prev), Combinator::Or) => prev.or(next),
    }
}

fn literal(field: &FieldRef, op: CompareOp, raw: &str) -> CompileResult<Predicate> {
    let value = parse_literal(field, raw)?;
    Ok(Predicate::compare(field.clone(), op, value))
}

fn ordering(
    field: &FieldRef,
    op: CompareOp,
    operator: &Operator,
    raw: &str,
) -> CompileResult<Predicate> {
    if !field.ty.kind.supports_ordering() {
        return Err(CompileError::unsupported(&field.name, operator, &field.ty));
    }
    literal(field, op, raw)
}

fn contains(field: FieldRef, raw: &str) -> CompileResult<Predicate> {
    if field.ty.kind != ScalarKind::String {
        return Err(CompileError::unsupported(&field.name, Operator::Contains, &field.ty));
    }
    Ok(Predicate::Contains {
        field,
        needle: raw.to_string(),
    })
}

// Enums expand to an equality chain over typed literals; everything else is a
// set test on the string projection. An empty list admits nothing for `In`
// and everything for `NotIn`.
fn membership(field: FieldRef, raw: &str, include: bool) -> CompileResult<Predicate> {
    let items: Vec<&str> = split_list(raw).collect();
    if items.is_empty() {
        return Ok(Predicate::Const(!include));
    }

    if field.ty.is_enum() {
        let op = if include { CompareOp::Eq } else { CompareOp::Ne };
        let mut chain: Option<Predicate> = None;
        for item in items {
            let next = literal(&field, op, item)?;
            chain = Some(match chain {
                None => next,
                Some(prev) if include => prev.or(next),
                Some(prev) => prev.and(next),
            });
        }
        return Ok(chain.unwrap_or(Predicate::Const(!include)));
    }

    let values = items.into_iter().map(str::to_string).collect();
    Ok(if include {
        Predicate::InSet { field, values }
    } else {
        Predicate::NotInSet { field, values }
    })
}

// `[lo, hi + 1 day)`, so the upper date is inclusive of its whole day.
fn between(field: FieldRef, raw: &str) -> CompileResult<Predicate> {
    if field.ty.kind != ScalarKind::DateTime {
        return Err(CompileError::argument(format!(
            "Between requires a datetime field, '{}' is {}",
            field.name, field.ty
        )));
    }

    let bounds: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [lo, hi] = bounds.as_slice() else {
        return Err(CompileError::argument(format!(
            "Between on '{}' needs exactly two comma-separated bounds, got '{}'",
            field.name, raw
        )));
    };

    let parse = |bound: &str| {
        parse_datetime(bound)
            .ok_or_else(|| CompileError::coercion(&field.name, bound, field.ty.to_string()))
    };
    let lo = parse(*lo)?;
    let hi = parse(*hi)?
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| {
            CompileError::argument(format!(
                "Between on '{}' has an upper bound past the last representable day",
                field.name
            ))
        })?;

    Ok(Predicate::compare(field.clone(), CompareOp::Ge, Value::DateTime(lo))
        .and(Predicate::compare(field, CompareOp::Lt, Value::DateTime(hi))))
}

fn intersect(key: &str, value: &str) -> Predicate {
    let left: HashSet<&str> = split_list(key).collect();
    Predicate::Const(split_list(value).any(|v| left.contains(v)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;
    use datascope_core::FieldType;

    fn schema() -> EntitySchema {
        EntitySchema::new("people")
            .field("Age", FieldType::int())
            .field("Name", FieldType::string())
            .field("Active", FieldType::bool())
            .field("CreatedAt", FieldType::datetime())
            .field("Status", FieldType::enumeration(["A", "B", "C"]))
            .field("Score", FieldType::decimal().nullable())
            .field("Code", FieldType::guid())
            .field("Ratio", FieldType::double().nullable())
    }

    fn row(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> Value {
        Value::DateTime(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap())
    }

    fn compile(filter: Filter) -> CompileResult<Option<Predicate>> {
        ExpressionCompiler::default().compile(&schema(), &filter)
    }

    #[test]
    fn eq_matches_row_value_for_each_type() {
        let cases = [
            ("Age", "20", Value::Int(20), Value::Int(21)),
            ("Name", "Liu", Value::text("Liu"), Value::text("Li")),
            ("Active", "false", Value::Bool(false), Value::Bool(true)),
            ("CreatedAt", "2024-01-01", at(2024, 1, 1, 0), at(2024, 1, 1, 1)),
            ("Status", "B", Value::Enum("B".into()), Value::Enum("C".into())),
            (
                "Score",
                "9.5",
                Value::Decimal(rust_decimal::Decimal::new(95, 1)),
                Value::Null,
            ),
            (
                "Code",
                "6f9619ff-8b86-d011-b42d-00cf4fc964ff",
                Value::Guid(uuid::Uuid::parse_str("6f9619ff-8b86-d011-b42d-00cf4fc964ff").unwrap()),
                Value::Guid(uuid::Uuid::nil()),
            ),
            ("Ratio", "0.25", Value::Double(0.25), Value::Null),
            ("Ratio", "0.25", Value::Double(0.25), Value::Double(0.5)),
        ];

        for (key, literal, hit, miss) in cases {
            let p = compile(Filter::eq(key, literal)).unwrap().unwrap();
            assert!(p.matches(&row(&[(key, hit)])), "{key} should match");
            assert!(!p.matches(&row(&[(key, miss)])), "{key} should not match");
        }
    }

    #[test]
    fn unknown_field_is_dropped() {
        assert_eq!(compile(Filter::eq("Nope", "1")).unwrap(), None);
    }

    #[test]
    fn coercion_failure_surfaces() {
        let err = compile(Filter::new("Age", Operator::Gt, "old")).unwrap_err();
        assert!(matches!(err, CompileError::Coercion { .. }));
    }

    #[test]
    fn ordering_on_string_or_bool_is_unsupported() {
        for key in ["Name", "Active"] {
            let err = compile(Filter::new(key, Operator::Lt, "x")).unwrap_err();
            assert!(matches!(err, CompileError::UnsupportedOperator { .. }), "{key}");
        }
    }

    #[test]
    fn contains_only_on_strings() {
        let p = compile(Filter::new("Name", Operator::Contains, "Li")).unwrap().unwrap();
        assert!(p.matches(&row(&[("Name", Value::text("Liu"))])));
        assert!(!p.matches(&row(&[("Name", Value::text("Wang"))])));

        let err = compile(Filter::new("Age", Operator::Contains, "1")).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedOperator { .. }));
    }

    #[test]
    fn in_on_enum_is_an_or_chain() {
        let p = compile(Filter::new("Status", Operator::In, "A,B")).unwrap().unwrap();
        assert!(matches!(p, Predicate::Or(_, _)));
        for (variant, expected) in [("A", true), ("B", true), ("C", false)] {
            assert_eq!(p.matches(&row(&[("Status", Value::Enum(variant.into()))])), expected);
        }

        let not_in = compile(Filter::new("Status", Operator::NotIn, "A,B")).unwrap().unwrap();
        assert!(matches!(not_in, Predicate::And(_, _)));
        assert!(not_in.matches(&row(&[("Status", Value::Enum("C".into()))])));
        assert!(!not_in.matches(&row(&[("Status", Value::Enum("A".into()))])));

        let err = compile(Filter::new("Status", Operator::In, "A,Z")).unwrap_err();
        assert!(matches!(err, CompileError::Coercion { .. }));
    }

    #[test]
    fn in_on_other_types_uses_string_projection() {
        let p = compile(Filter::new("Age", Operator::In, "18, 20")).unwrap().unwrap();
        assert_eq!(
            p,
            Predicate::InSet {
                field: schema().resolve("Age").unwrap(),
                values: vec!["18".into(), "20".into()],
            }
        );
        assert!(p.matches(&row(&[("Age", Value::Int(20))])));

        let not_in = compile(Filter::new("Age", Operator::NotIn, "18")).unwrap().unwrap();
        assert!(not_in.matches(&row(&[("Age", Value::Int(20))])));
        assert!(!not_in.matches(&row(&[("Age", Value::Int(18))])));
    }

    #[test]
    fn decimal_in_agrees_with_eq() {
        let amount = row(&[("Score", Value::Decimal(rust_decimal::Decimal::new(1250, 2)))]);

        let eq = compile(Filter::eq("Score", "12.50")).unwrap().unwrap();
        let listed = compile(Filter::new("Score", Operator::In, "12.50,99")).unwrap().unwrap();

        assert!(eq.matches(&amount));
        assert!(listed.matches(&amount));
    }

    #[test]
    fn empty_in_list_admits_nothing() {
        assert!(compile(Filter::new("Age", Operator::In, "")).unwrap().unwrap().is_never());
        assert!(compile(Filter::new("Age", Operator::NotIn, " , ")).unwrap().unwrap().is_always());
    }

    #[test]
    fn intersect_is_a_compile_time_constant() {
        let hit = compile(Filter::new("admin,auditor", Operator::Intersect, "guest,auditor"));
        assert!(hit.unwrap().unwrap().is_always());

        let miss = compile(Filter::new("admin", Operator::Intersect, "guest"));
        assert!(miss.unwrap().unwrap().is_never());
    }

    #[test]
    fn between_includes_the_whole_upper_day() {
        let p = compile(Filter::new("CreatedAt", Operator::Between, "2024-01-01,2024-01-31"))
            .unwrap()
            .unwrap();

        assert!(p.matches(&row(&[("CreatedAt", at(2024, 1, 1, 0))])));
        assert!(p.matches(&row(&[("CreatedAt", at(2024, 1, 31, 23))])));
        assert!(!p.matches(&row(&[("CreatedAt", at(2024, 2, 1, 0))])));
        assert!(!p.matches(&row(&[("CreatedAt", at(2023, 12, 31, 23))])));
    }

    #[test]
    fn between_rejects_bad_arity_and_field_type() {
        for value in ["2024-01-01", "2024-01-01,2024-01-02,2024-01-03"] {
            let err = compile(Filter::new("CreatedAt", Operator::Between, value)).unwrap_err();
            assert!(matches!(err, CompileError::Argument(_)), "{value}");
        }
        let err = compile(Filter::new("Age", Operator::Between, "1,2")).unwrap_err();
        assert!(matches!(err, CompileError::Argument(_)));
    }

    #[test]
    fn between_upper_bound_on_last_day_is_an_error() {
        let value = format!("2024-01-01,{}", NaiveDate::MAX);
        assert!(parse_datetime(&value[11..]).is_some());

        let err = compile(Filter::new("CreatedAt", Operator::Between, value)).unwrap_err();
        assert!(matches!(err, CompileError::Argument(_)));
    }

    #[test]
    fn unknown_extension_fails_fast() {
        let err = compile(Filter::new("Nope", Operator::extended("missing"), "x")).unwrap_err();
        assert_eq!(err, CompileError::UnknownExtension("missing".into()));
    }

    #[test]
    fn registered_extension_receives_literal_and_field() {
        let mut table = ExtensionTable::new();
        table
            .register("older_than", |literal: &str, field: &FieldRef| {
                let years = literal.parse::<i64>().unwrap_or(i64::MAX);
                Predicate::compare(field.clone(), CompareOp::Gt, Value::Int(years))
            })
            .unwrap();
        let compiler = ExpressionCompiler::new(table);

        let p = compiler
            .compile(&schema(), &Filter::new("Age", Operator::extended("older_than"), "30"))
            .unwrap()
            .unwrap();
        assert!(p.matches(&row(&[("Age", Value::Int(31))])));
        assert!(!p.matches(&row(&[("Age", Value::Int(30))])));
    }

    #[test]
    fn unsatisfiable_filter_is_false_even_without_the_field() {
        let p = compile(Filter::unsatisfiable("OrganizationalUnitId")).unwrap();
        assert_eq!(p, Some(Predicate::never()));
    }

    #[test]
    fn group_uses_each_filters_own_combinator() {
        let group = FilterGroup::and(vec![
            Filter::new("Age", Operator::Gt, "18"),
            Filter::new("Name", Operator::Contains, "Li").with_combinator(Combinator::Or),
        ]);
        let p = ExpressionCompiler::default().fold_group(&schema(), &group).unwrap().unwrap();

        assert!(p.matches(&row(&[("Age", Value::Int(15)), ("Name", Value::text("Liu"))])));
        assert!(!p.matches(&row(&[("Age", Value::Int(15)), ("Name", Value::text("Wang"))])));
    }

    #[test]
    fn scenario_age_and_name() {
        let group = FilterGroup::and(vec![
            Filter::new("Age", Operator::Gt, "18"),
            Filter::new("Name", Operator::Contains, "Li"),
        ]);
        let p = ExpressionCompiler::default().fold_group(&schema(), &group).unwrap().unwrap();

        assert!(p.matches(&row(&[("Age", Value::Int(20)), ("Name", Value::text("Liu"))])));
        assert!(!p.matches(&row(&[("Age", Value::Int(15)), ("Name", Value::text("Liu"))])));
    }

    #[test]
    fn dropped_first_filter_lets_the_next_one_seed() {
        let group = FilterGroup::and(vec![
            Filter::eq("Missing", "1"),
            Filter::new("Age", Operator::Gt, "18").with_combinator(Combinator::Or),
        ]);
        let p = ExpressionCompiler::default().fold_group(&schema(), &group).unwrap().unwrap();
        assert!(matches!(p, Predicate::Compare { .. }));
    }

    #[test]
    fn fully_dropped_group_contributes_nothing() {
        let groups = vec![
            FilterGroup::and(vec![Filter::new("Age", Operator::Gt, "18")]),
            FilterGroup::and(vec![Filter::eq("Missing", "x")]),
        ];
        let compiler = ExpressionCompiler::default();

        assert_eq!(compiler.fold_group(&schema(), &groups[1]).unwrap(), None);
        let p = compiler.fold_groups(&schema(), &groups).unwrap().unwrap();
        assert!(p.matches(&row(&[("Age", Value::Int(20))])));
        assert!(matches!(p, Predicate::Compare { .. }));

        let none = compiler.fold_groups(&schema(), &groups[1..]).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn first_group_combinator_only_seeds() {
        let groups = vec![
            FilterGroup::or(vec![Filter::new("Age", Operator::Gt, "18")]),
            FilterGroup::and(vec![Filter::new("Name", Operator::Contains, "Li")]),
        ];
        let p = ExpressionCompiler::default().fold_groups(&schema(), &groups).unwrap().unwrap();

        assert!(matches!(p, Predicate::And(_, _)));
        assert!(!p.matches(&row(&[("Age", Value::Int(20)), ("Name", Value::text("Wang"))])));
    }

    #[test]
    fn compile_error_in_any_group_fails_the_fold() {
        let groups = vec![
            FilterGroup::and(vec![Filter::new("Age", Operator::Gt, "18")]),
            FilterGroup::or(vec![Filter::new("Name", Operator::Gt, "x")]),
        ];
        assert!(ExpressionCompiler::default().fold_groups(&schema(), &groups).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn or_group_is_the_disjunction_of_its_filters(
            lo in -50i64..50,
            hi in -50i64..50,
            age in -60i64..60,
        ) {
            let f1 = Filter::new("Age", Operator::Lt, lo.to_string());
            let f2 = Filter::new("Age", Operator::Gt, hi.to_string())
                .with_combinator(Combinator::Or);
            let compiler = ExpressionCompiler::default();
            let s = schema();

            let p1 = compiler.compile(&s, &f1).unwrap().unwrap();
            let p2 = compiler.compile(&s, &f2).unwrap().unwrap();
            let group = compiler
                .fold_group(&s, &FilterGroup::or(vec![f1, f2]))
                .unwrap()
                .unwrap();

            let r = row(&[("Age", Value::Int(age))]);
            prop_assert_eq!(group.matches(&r), p1.matches(&r) || p2.matches(&r));
        }

        #[test]
        fn and_group_is_the_conjunction_of_its_filters(
            lo in -50i64..50,
            hi in -50i64..50,
            age in -60i64..60,
        ) {
            let f1 = Filter::new("Age", Operator::Ge, lo.to_string());
            let f2 = Filter::new("Age", Operator::Le, hi.to_string());
            let compiler = ExpressionCompiler::default();
            let s = schema();

            let p1 = compiler.compile(&s, &f1).unwrap().unwrap();
            let p2 = compiler.compile(&s, &f2).unwrap().unwrap();
            let group = compiler
                .fold_group(&s, &FilterGroup::and(vec![f1, f2]))
                .unwrap()
                .unwrap();

            let r = row(&[("Age", Value::Int(age))]);
            prop_assert_eq!(group.matches(&r), p1.matches(&r) && p2.matches(&r));
        }
    }
}
