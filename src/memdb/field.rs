//! Field kinds and write records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a metric field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Sum,
    Min,
    Max,
    Gauge,
}

impl FieldType {
    /// Aggregation applied when two writes land in the same slot
    pub fn agg_type(&self) -> AggType {
        match self {
            FieldType::Sum => AggType::Sum,
            FieldType::Min => AggType::Min,
            FieldType::Max => AggType::Max,
            FieldType::Gauge => AggType::Replace,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Sum => write!(f, "sum"),
            FieldType::Min => write!(f, "min"),
            FieldType::Max => write!(f, "max"),
            FieldType::Gauge => write!(f, "gauge"),
        }
    }
}

/// Slot-level merge function of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggType {
    Sum,
    Min,
    Max,
    /// Last write wins
    Replace,
}

impl AggType {
    pub fn aggregate(&self, existing: f64, value: f64) -> f64 {
        match self {
            AggType::Sum => existing + value,
            AggType::Min => existing.min(value),
            AggType::Max => existing.max(value),
            AggType::Replace => value,
        }
    }
}

/// Value of one field write, tagged with its kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Sum(f64),
    Min(f64),
    Max(f64),
    Gauge(f64),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Sum(_) => FieldType::Sum,
            FieldValue::Min(_) => FieldType::Min,
            FieldValue::Max(_) => FieldType::Max,
            FieldValue::Gauge(_) => FieldType::Gauge,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            FieldValue::Sum(v) | FieldValue::Min(v) | FieldValue::Max(v) | FieldValue::Gauge(v) => v,
        }
    }
}

/// One field of a decoded write record
///
/// `value` is `None` when the record carried no recognizable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub value: Option<FieldValue>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    /// A field whose value could not be decoded
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Where a write lands: family window and slot inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteContext {
    /// Start of the family window, milliseconds
    pub family_time: i64,
    /// Slot offset from `family_time`, in intervals
    pub slot_index: u16,
}

impl WriteContext {
    pub fn new(family_time: i64, slot_index: u16) -> Self {
        Self {
            family_time,
            slot_index,
        }
    }

    /// Locate a timestamp given the slot interval and family window length
    ///
    /// Returns `None` if the window holds more slots than a `u16` can index.
    pub fn for_timestamp(timestamp: i64, interval: i64, family_duration: i64) -> Option<Self> {
        let interval = interval.max(1);
        let family_duration = family_duration.max(interval);
        let family_time = timestamp - timestamp.rem_euclid(family_duration);
        let slot = (timestamp - family_time) / interval;
        let slot_index = u16::try_from(slot).ok()?;
        Some(Self::new(family_time, slot_index))
    }
}
