//! Postgres rendering of compiled predicates.
//!
//! Every literal is bound as a parameter; only identifiers taken from the
//! entity schema and join-table settings are spliced into the SQL text, and
//! those are always quoted.

use sqlx::{Postgres, QueryBuilder};

use datascope_core::{FieldRef, ScalarKind, SemiJoin, Value};
use datascope_policy::{CompareOp, Predicate};

/// Alias given to the scoped table by [`scoped_select`].
pub const ROW_ALIAS: &str = "t";

const JOIN_ALIAS: &str = "scope_link";

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column(field: &FieldRef, alias: Option<&str>) -> String {
    match alias {
        Some(alias) => format!("{}.{}", quote_ident(alias), quote_ident(&field.column)),
        None => quote_ident(&field.column),
    }
}

/// `SELECT * FROM "<table>" AS "t" WHERE <predicate>`.
pub fn scoped_select(table: &str, predicate: &Predicate) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT * FROM {} AS {} WHERE ",
        quote_ident(table),
        quote_ident(ROW_ALIAS)
    ));
    push_predicate(&mut builder, predicate, Some(ROW_ALIAS));
    builder
}

/// Append `predicate` to `builder` as a boolean SQL expression.
///
/// `alias` qualifies column references; pass the outer query's table alias
/// so semi-joins correlate with the right row.
pub fn push_predicate<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    predicate: &Predicate,
    alias: Option<&str>,
) {
    match predicate {
        Predicate::Const(true) => {
            builder.push("1 = 1");
        }
        Predicate::Const(false) => {
            builder.push("1 = 0");
        }
        Predicate::Compare { field, op, value } => push_compare(builder, field, *op, value, alias),
        Predicate::Contains { field, needle } => {
            builder
                .push(format!("strpos({}, ", column(field, alias)))
                .push_bind(needle.clone())
                .push(") > 0");
        }
        Predicate::InSet { field, values } => {
            if values.is_empty() {
                builder.push("1 = 0");
            } else {
                builder
                    .push(format!("CAST({} AS TEXT) = ANY(", column(field, alias)))
                    .push_bind(values.clone())
                    .push(")");
            }
        }
        Predicate::NotInSet { field, values } => {
            let col = column(field, alias);
            if values.is_empty() {
                builder.push(format!("{col} IS NOT NULL"));
            } else {
                builder
                    .push(format!("({col} IS NOT NULL AND NOT (CAST({col} AS TEXT) = ANY("))
                    .push_bind(values.clone())
                    .push(")))");
            }
        }
        Predicate::SemiJoin(join) => push_semi_join(builder, join, alias),
        Predicate::Not(inner) => {
            builder.push("NOT (");
            push_predicate(builder, inner, alias);
            builder.push(")");
        }
        Predicate::And(a, b) => push_binary(builder, a, " AND ", b, alias),
        Predicate::Or(a, b) => push_binary(builder, a, " OR ", b, alias),
    }
}

fn push_binary<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    left: &Predicate,
    keyword: &str,
    right: &Predicate,
    alias: Option<&str>,
) {
    builder.push("(");
    push_predicate(builder, left, alias);
    builder.push(keyword);
    push_predicate(builder, right, alias);
    builder.push(")");
}

fn push_compare<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    field: &FieldRef,
    op: CompareOp,
    value: &Value,
    alias: Option<&str>,
) {
    let col = column(field, alias);
    let lhs = format!("{col} {} ", op.symbol());

    match value {
        Value::Null => {
            builder.push(match op {
                CompareOp::Eq => format!("{col} IS NULL"),
                CompareOp::Ne => format!("{col} IS NOT NULL"),
                _ => "1 = 0".to_string(),
            });
        }
        Value::Int(v) => {
            builder.push(lhs).push_bind(*v);
        }
        Value::Decimal(v) => {
            builder.push(lhs).push_bind(*v);
        }
        Value::Double(v) => {
            builder.push(lhs).push_bind(*v);
        }
        Value::DateTime(v) => {
            builder.push(lhs).push_bind(*v);
        }
        Value::Bool(v) => {
            builder.push(lhs).push_bind(*v);
        }
        Value::Guid(v) => {
            builder.push(lhs).push_bind(*v);
        }
        Value::Text(v) => {
            builder.push(lhs).push_bind(v.clone());
        }
        Value::Enum(name) => push_enum_compare(builder, &col, &field.ty.kind, op, name),
    }
}

// Enums compare by declaration order, so ordering operators go through the
// variant's position rather than its text.
fn push_enum_compare<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    col: &str,
    kind: &ScalarKind,
    op: CompareOp,
    name: &str,
) {
    let ordering = !matches!(op, CompareOp::Eq | CompareOp::Ne);
    match kind {
        ScalarKind::Enum(variants) if ordering => {
            let Some(ordinal) = kind.enum_ordinal(name).and_then(|o| i32::try_from(o).ok()) else {
                builder.push("1 = 0");
                return;
            };
            builder
                .push("(array_position(")
                .push_bind(variants.clone())
                .push(format!("::text[], CAST({col} AS TEXT)) - 1) {} ", op.symbol()))
                .push_bind(ordinal);
        }
        _ => {
            builder
                .push(format!("CAST({col} AS TEXT) {} ", op.symbol()))
                .push_bind(name.to_string());
        }
    }
}

fn push_semi_join<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    semi: &SemiJoin,
    alias: Option<&str>,
) {
    if semi.members.is_empty() {
        builder.push("1 = 0");
        return;
    }

    let link = quote_ident(JOIN_ALIAS);
    builder
        .push(format!(
            "EXISTS (SELECT 1 FROM {} AS {link} \
             WHERE CAST({link}.{} AS TEXT) = CAST({} AS TEXT) AND {link}.{} = ",
            quote_ident(&semi.join.table),
            quote_ident(&semi.join.business_id_column),
            column(&semi.row_field, alias),
            quote_ident(&semi.join.business_table_column),
        ))
        .push_bind(semi.row_field.entity.clone())
        .push(format!(
            " AND CAST({link}.{} AS TEXT) = ANY(",
            quote_ident(&semi.join.member_column)
        ))
        .push_bind(semi.members.clone())
        .push("))");
}
