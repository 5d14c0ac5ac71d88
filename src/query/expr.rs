//! Query statements and the tag filter expression tree
//!
//! A WHERE clause over tags compiles to an [`Expr`] tree:
//!
//! ```text
//! host = 'a' AND (zone in ('z1','z2') OR NOT ip like '10.*')
//!
//!          Binary(And)
//!         /           \
//!   Tag(host=a)     Paren
//!                     |
//!                 Binary(Or)
//!                /          \
//!       Tag(zone in ..)    Not
//!                           |
//!                     Tag(ip like 10.*)
//! ```
//!
//! Comparison semantics belong to the leaf [`TagFilter`]; the tree only
//! arranges leaves with parentheses, negation and binary operators.

use crate::aggregation::AggregationFunc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operators an expression tree can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Whether the operator is a boolean connective usable between tag filters
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::And => write!(f, "and"),
            BinaryOp::Or => write!(f, "or"),
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
        }
    }
}

/// Leaf comparison between one tag key and its values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TagFilter {
    /// `key = 'value'`
    Equals { key: String, value: String },
    /// `key in ('a', 'b')`
    In { key: String, values: Vec<String> },
    /// `key like 'prefix*'`, `*` matches any run of characters
    Like { key: String, pattern: String },
    /// `key =~ 'regexp'`
    Regex { key: String, regexp: String },
}

impl TagFilter {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn in_values(key: impl Into<String>, values: &[&str]) -> Self {
        Self::In {
            key: key.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn like(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like {
            key: key.into(),
            pattern: pattern.into(),
        }
    }

    pub fn regex(key: impl Into<String>, regexp: impl Into<String>) -> Self {
        Self::Regex {
            key: key.into(),
            regexp: regexp.into(),
        }
    }

    /// Tag key this filter compares against
    pub fn tag_key(&self) -> &str {
        match self {
            Self::Equals { key, .. }
            | Self::In { key, .. }
            | Self::Like { key, .. }
            | Self::Regex { key, .. } => key,
        }
    }

    /// Canonical string form, used as the key of per-leaf filter results.
    ///
    /// `in` values are sorted so that `zone in ('b','a')` and
    /// `zone in ('a','b')` share one entry.
    pub fn rewrite(&self) -> String {
        match self {
            Self::Equals { key, value } => format!("{}={}", key, value),
            Self::In { key, values } => {
                let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
                sorted.sort_unstable();
                sorted.dedup();
                format!("{} in ({})", key, sorted.join(","))
            }
            Self::Like { key, pattern } => format!("{} like {}", key, pattern),
            Self::Regex { key, regexp } => format!("{}=~{}", key, regexp),
        }
    }

    /// Build the value matcher for this filter
    ///
    /// Fails only for `like`/`regex` filters whose pattern does not compile.
    pub fn matcher(&self) -> Result<ValueMatcher<'_>, regex::Error> {
        Ok(match self {
            Self::Equals { value, .. } => ValueMatcher::Equals(value),
            Self::In { values, .. } => ValueMatcher::In(values),
            Self::Like { pattern, .. } => {
                let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
                ValueMatcher::Pattern(Regex::new(&format!("^{}$", escaped.join(".*")))?)
            }
            Self::Regex { regexp, .. } => ValueMatcher::Pattern(Regex::new(regexp)?),
        })
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rewrite())
    }
}

/// Compiled form of a [`TagFilter`] for matching many tag values
#[derive(Debug)]
pub enum ValueMatcher<'a> {
    Equals(&'a str),
    In(&'a [String]),
    Pattern(Regex),
}

impl ValueMatcher<'_> {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            ValueMatcher::Equals(expected) => *expected == value,
            ValueMatcher::In(values) => values.iter().any(|v| v == value),
            ValueMatcher::Pattern(re) => re.is_match(value),
        }
    }
}

/// Boolean tag filter expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expr {
    Tag(TagFilter),
    Paren(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn tag(filter: TagFilter) -> Self {
        Expr::Tag(filter)
    }

    pub fn paren(inner: Expr) -> Self {
        Expr::Paren(Box::new(inner))
    }

    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Tag(filter) => write!(f, "{}", filter),
            Expr::Paren(inner) => write!(f, "({})", inner),
            Expr::Not(inner) => write!(f, "not {}", inner),
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
        }
    }
}

/// Time range of a query, inclusive on both ends, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// A compiled data query, shipped to remote nodes as the task payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub namespace: String,
    pub metric_name: String,
    /// Requested fields, in select order
    pub field_names: Vec<String>,
    /// Optional aggregation per field name; fields not listed use Sum
    #[serde(default)]
    pub field_funcs: Vec<(String, AggregationFunc)>,
    #[serde(default)]
    pub condition: Option<Expr>,
    #[serde(default)]
    pub group_by: Vec<String>,
    pub time_range: TimeRange,
    /// Bucket width of the result, in milliseconds
    pub interval: i64,
}

impl Query {
    pub fn new(
        namespace: impl Into<String>,
        metric_name: impl Into<String>,
        field_names: &[&str],
        time_range: TimeRange,
        interval: i64,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            field_names: field_names.iter().map(|f| f.to_string()).collect(),
            field_funcs: Vec::new(),
            condition: None,
            group_by: Vec::new(),
            time_range,
            interval,
        }
    }

    /// Builder: set the tag filter condition
    pub fn condition(mut self, expr: Expr) -> Self {
        self.condition = Some(expr);
        self
    }

    /// Builder: group results by tag keys
    pub fn group_by(mut self, tag_keys: &[&str]) -> Self {
        self.group_by = tag_keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Builder: aggregate a field with a specific function
    pub fn field_func(mut self, field_name: impl Into<String>, func: AggregationFunc) -> Self {
        self.field_funcs.push((field_name.into(), func));
        self
    }

    /// Aggregation function requested for a field
    pub fn func_for(&self, field_name: &str) -> Option<AggregationFunc> {
        self.field_funcs
            .iter()
            .find(|(name, _)| name == field_name)
            .map(|(_, func)| *func)
    }
}

/// Kind of metadata a suggestion query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataType {
    Namespace,
    Metric,
    TagKey,
    TagValue,
    Field,
}

/// Metadata (suggestion) statement, shipped as the payload of metadata jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStmt {
    pub metadata_type: MetadataType,
    pub namespace: String,
    pub metric_name: String,
    #[serde(default)]
    pub tag_key: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub condition: Option<Expr>,
    pub limit: usize,
}

impl MetadataStmt {
    /// Suggest values of one tag key
    pub fn tag_values(
        namespace: impl Into<String>,
        metric_name: impl Into<String>,
        tag_key: impl Into<String>,
    ) -> Self {
        Self {
            metadata_type: MetadataType::TagValue,
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            tag_key: tag_key.into(),
            prefix: String::new(),
            condition: None,
            limit: 100,
        }
    }

    /// Builder: restrict suggestions to a prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Builder: cap the number of suggestions
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
