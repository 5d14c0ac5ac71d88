//! Result Aggregation
//!
//! Partial results of a distributed query arrive at the root as
//! [`SeriesList`] payloads. The [`GroupingAggregator`] folds them per tag
//! group, per field and per time bucket:
//!
//! ```text
//! leaf A: {host=a} usage [(0, 1.0), (5, 2.0)]  ─┐
//! leaf B: {host=a} usage [(7, 4.0)]            ─┼→ {host=a} usage [(0, 3.0), (5, 4.0)]   interval=5, SUM
//! leaf B: {host=b} usage [(1, 9.0)]            ─┘  {host=b} usage [(0, 9.0)]
//! ```

mod grouping;

pub use grouping::GroupingAggregator;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregation functions available in queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunc {
    /// Average of values
    Avg,
    /// Sum of values
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Count of values
    Count,
    /// Last value in the group
    Last,
    /// First value in the group
    First,
}

impl AggregationFunc {
    /// Apply aggregation to a slice of values
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        Some(match self {
            Self::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Self::Sum => values.iter().sum(),
            Self::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Self::Count => values.len() as f64,
            Self::Last => *values.last()?,
            Self::First => *values.first()?,
        })
    }
}

impl std::str::FromStr for AggregationFunc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avg" | "average" => Ok(Self::Avg),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "count" => Ok(Self::Count),
            "last" => Ok(Self::Last),
            "first" => Ok(Self::First),
            other => Err(format!("unknown aggregation function: {}", other)),
        }
    }
}

/// Same lowercase names as the serde form
impl std::fmt::Display for AggregationFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Avg => write!(f, "avg"),
            Self::Sum => write!(f, "sum"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Count => write!(f, "count"),
            Self::Last => write!(f, "last"),
            Self::First => write!(f, "first"),
        }
    }
}

/// How one requested field is aggregated at the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorSpec {
    pub field_name: String,
    pub func: AggregationFunc,
}

impl AggregatorSpec {
    /// Spec for a field, summed unless told otherwise
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            func: AggregationFunc::Sum,
        }
    }

    /// Builder: set the aggregation function
    pub fn func(mut self, func: AggregationFunc) -> Self {
        self.func = func;
        self
    }
}

/// Specs in select order
pub type AggregatorSpecs = Vec<AggregatorSpec>;

/// One series of a partial result: a tag group and its points per field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub tags: BTreeMap<String, String>,
    /// field name → (timestamp, value) points
    pub fields: BTreeMap<String, Vec<(i64, f64)>>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Builder: add points of a field
    pub fn field(mut self, name: impl Into<String>, points: Vec<(i64, f64)>) -> Self {
        self.fields.entry(name.into()).or_default().extend(points);
        self
    }
}

/// Partial result payload sent by a leaf or intermediate node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesList {
    pub series: Vec<TimeSeries>,
}

/// Final result of a data query, one series per tag group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Field names in select order
    pub fields: Vec<String>,
    pub series: Vec<TimeSeries>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
