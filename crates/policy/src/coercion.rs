//! Typed-literal parsing keyed by the target field's semantic type.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use datascope_core::{CompileError, CompileResult, FieldRef, ScalarKind, Value};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a string-encoded policy value into `field`'s semantic type.
///
/// On nullable fields an empty value or `null` (any case) parses to
/// [`Value::Null`]. Strings are taken verbatim.
pub fn parse_literal(field: &FieldRef, raw: &str) -> CompileResult<Value> {
    let trimmed = raw.trim();
    if field.ty.nullable && (trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null")) {
        return Ok(Value::Null);
    }

    let fail = || CompileError::coercion(&field.name, raw, field.ty.to_string());

    let value = match &field.ty.kind {
        ScalarKind::Int => Value::Int(trimmed.parse::<i64>().map_err(|_| fail())?),
        ScalarKind::Decimal => Value::Decimal(Decimal::from_str(trimmed).map_err(|_| fail())?),
        ScalarKind::Double => {
            let v = trimmed.parse::<f64>().map_err(|_| fail())?;
            if !v.is_finite() {
                return Err(fail());
            }
            Value::Double(v)
        }
        ScalarKind::DateTime => Value::DateTime(parse_datetime(trimmed).ok_or_else(fail)?),
        ScalarKind::Bool => {
            if trimmed.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                return Err(fail());
            }
        }
        ScalarKind::Guid => Value::Guid(Uuid::parse_str(trimmed).map_err(|_| fail())?),
        ScalarKind::Enum(variants) => Value::Enum(parse_enum(variants, trimmed).ok_or_else(fail)?),
        ScalarKind::String => Value::Text(raw.to_string()),
    };

    Ok(value)
}

/// Parse a date or datetime literal. Dates mean midnight; RFC 3339 values
/// with an offset are converted to UTC.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(at);
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.naive_utc())
}

// Variant name, or its zero-based ordinal.
fn parse_enum(variants: &[String], raw: &str) -> Option<String> {
    if let Some(v) = variants.iter().find(|v| v.as_str() == raw) {
        return Some(v.clone());
    }
    let ordinal = raw.parse::<usize>().ok()?;
    variants.get(ordinal).cloned()
}
