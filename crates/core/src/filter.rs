//! Declarative filter policies as stored per user/resource/app.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Declared type carried by the synthesized always-false filter.
pub const NEVER_DECLARED_TYPE: &str = "never";

/// Boolean composition switch between filters (within a group) or groups.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn as_str(self) -> &'static str {
        match self {
            Combinator::And => "and",
            Combinator::Or => "or",
        }
    }
}

impl core::fmt::Display for Combinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Combinator {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" | "" => Ok(Combinator::And),
            "or" => Ok(Combinator::Or),
            _ => Err(ParseFilterError::Combinator(s.to_string())),
        }
    }
}

impl TryFrom<String> for Combinator {
    type Error = ParseFilterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Combinator> for String {
    fn from(value: Combinator) -> Self {
        value.as_str().to_string()
    }
}

/// Closed set of filter operators.
///
/// Policies store operators as strings; parsing happens once at load time so
/// the compiler only ever sees one of these variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    In,
    NotIn,
    Between,
    Intersect,
    /// Named function from the compiler's extension table.
    Extended(String),
}

impl Operator {
    /// Whether the operator compares the field against one typed literal.
    pub fn is_literal_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }

    /// Whether the operator needs an ordered field type.
    pub fn is_ordering(&self) -> bool {
        matches!(self, Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge)
    }

    pub fn extended(name: impl Into<String>) -> Self {
        Operator::Extended(name.into())
    }
}

impl core::fmt::Display for Operator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operator::Eq => f.write_str("Eq"),
            Operator::Ne => f.write_str("Ne"),
            Operator::Lt => f.write_str("Lt"),
            Operator::Le => f.write_str("Le"),
            Operator::Gt => f.write_str("Gt"),
            Operator::Ge => f.write_str("Ge"),
            Operator::Contains => f.write_str("Contains"),
            Operator::In => f.write_str("In"),
            Operator::NotIn => f.write_str("NotIn"),
            Operator::Between => f.write_str("Between"),
            Operator::Intersect => f.write_str("Intersect"),
            Operator::Extended(name) => write!(f, "Extended:{name}"),
        }
    }
}

impl FromStr for Operator {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some((head, name)) = trimmed.split_once(':') {
            let head = head.to_ascii_lowercase();
            if (head == "extended" || head == "custom") && !name.trim().is_empty() {
                return Ok(Operator::Extended(name.trim().to_string()));
            }
            return Err(ParseFilterError::Operator(s.to_string()));
        }

        // Canonical names first, then the legacy long names.
        let op = match trimmed.to_ascii_lowercase().as_str() {
            "" | "eq" | "equal" | "equals" => Operator::Eq,
            "ne" | "notequal" => Operator::Ne,
            "lt" | "lessthan" => Operator::Lt,
            "le" | "lessthanorequal" => Operator::Le,
            "gt" | "greaterthan" => Operator::Gt,
            "ge" | "greaterthanorequal" => Operator::Ge,
            "contains" => Operator::Contains,
            "in" | "any" => Operator::In,
            "notin" | "notany" => Operator::NotIn,
            "between" | "daterange" => Operator::Between,
            "intersect" => Operator::Intersect,
            _ => return Err(ParseFilterError::Operator(s.to_string())),
        };
        Ok(op)
    }
}

impl TryFrom<String> for Operator {
    type Error = ParseFilterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        value.to_string()
    }
}

/// Rejected operator/combinator string in a stored policy.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParseFilterError {
    #[error("unknown filter operator '{0}'")]
    Operator(String),

    #[error("unknown combinator '{0}'")]
    Combinator(String),
}

/// One `(key, operator, value)` triplet of a policy.
///
/// `value` is always string-encoded; the compiler parses it against the
/// target field's semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub operator: Operator,
    /// How this filter combines with the expression folded so far.
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub declared_type: String,
}

impl Filter {
    pub fn new(key: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            operator,
            combinator: Combinator::And,
            declared_type: String::new(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, Operator::Eq, value)
    }

    /// `key == "false"`, compiled to the constant `false` whatever the field type.
    pub fn unsatisfiable(key: impl Into<String>) -> Self {
        Self::eq(key, "false").with_declared_type(NEVER_DECLARED_TYPE)
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = declared_type.into();
        self
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.declared_type == NEVER_DECLARED_TYPE
    }

    /// Correlation key used to match rule query rows back to this filter.
    pub fn correlation_key(&self) -> String {
        format!("{},{}", self.key, self.value)
    }
}

/// Filters folded left-to-right; `combinator` joins this group to the
/// groups before it and is ignored for the first group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterGroup {
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl FilterGroup {
    pub fn new(combinator: Combinator, filters: Vec<Filter>) -> Self {
        Self {
            combinator,
            filters,
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::new(Combinator::And, filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::new(Combinator::Or, filters)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
