//! Snapshot data model produced by the mapper.
//!
//! A snapshot mirrors the resource -> scope -> metric nesting of the export
//! document it came from. Every node is read-only once the mapper hands the
//! snapshot back; simulations derive new values instead of mutating it.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Primitive attribute value.
///
/// Numbers compare the way the export format treats them: `+0` and `-0` are
/// the same value and `NaN` equals itself. A string never equals a number,
/// even when the text looks numeric.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// UTF-8 string value
    String(String),
    /// Double or integer value
    Number(f64),
    /// Boolean value
    Bool(bool),
}

impl AttrValue {
    fn number_bits(n: f64) -> u64 {
        if n == 0.0 {
            0.0f64.to_bits()
        } else if n.is_nan() {
            f64::NAN.to_bits()
        } else {
            n.to_bits()
        }
    }

    /// Returns the string payload if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttrValue::String(a), AttrValue::String(b)) => a == b,
            (AttrValue::Number(a), AttrValue::Number(b)) => {
                Self::number_bits(*a) == Self::number_bits(*b)
            },
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttrValue {}

impl Hash for AttrValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            AttrValue::String(s) => {
                0u8.hash(state);
                s.hash(state);
            },
            AttrValue::Number(n) => {
                1u8.hash(state);
                Self::number_bits(*n).hash(state);
            },
            AttrValue::Bool(b) => {
                2u8.hash(state);
                b.hash(state);
            },
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => f.write_str(s),
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Attribute key/value map. Keys are unique and iteration is sorted.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// Canonical series identity built by [`crate::core::series_key::encode_series_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Wraps an already-encoded key
    pub fn from_encoded(key: String) -> Self {
        SeriesKey(key)
    }

    /// Returns the string representation of the key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the inner string value
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Borrow<str> for SeriesKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sampled measurement retained alongside an aggregated point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExemplarData {
    pub time_unix_nano: u64,
    pub value: f64,
    pub span_id: Option<String>,
    pub trace_id: Option<String>,
    pub attributes: AttrMap,
}

/// Gauge or sum data point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberPoint {
    pub timestamp_unix_nano: u64,
    pub start_time_unix_nano: Option<u64>,
    pub value: f64,
    pub attributes: AttrMap,
    pub exemplars: Vec<ExemplarData>,
}

/// Explicit-bucket histogram data point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramPoint {
    pub timestamp_unix_nano: u64,
    pub start_time_unix_nano: Option<u64>,
    pub count: u64,
    pub sum: Option<f64>,
    pub bucket_counts: Vec<u64>,
    pub explicit_bounds: Vec<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub attributes: AttrMap,
    pub exemplars: Vec<ExemplarData>,
}

/// Typed data point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParsedPoint {
    Number(NumberPoint),
    Histogram(HistogramPoint),
}

impl ParsedPoint {
    /// Timestamp of the point in unix nanoseconds
    pub fn timestamp_unix_nano(&self) -> u64 {
        match self {
            ParsedPoint::Number(p) => p.timestamp_unix_nano,
            ParsedPoint::Histogram(p) => p.timestamp_unix_nano,
        }
    }

    /// Exemplars attached to the point
    pub fn exemplars(&self) -> &[ExemplarData] {
        match self {
            ParsedPoint::Number(p) => &p.exemplars,
            ParsedPoint::Histogram(p) => &p.exemplars,
        }
    }
}

/// Aggregation type of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Gauge,
    Sum,
    Histogram,
    Summary,
    Unknown,
}

/// Whether reported values are deltas or running totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Temporality {
    Delta,
    Cumulative,
    Unspecified,
}

/// Immutable description of a metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDefinition {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub instrument_type: InstrumentType,
    pub temporality: Option<Temporality>,
    pub is_monotonic: Option<bool>,
}

/// One time series of a metric
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSeriesData {
    pub series_key: SeriesKey,
    pub resource_attributes: AttrMap,
    pub metric_attributes: AttrMap,
    /// Points in document order
    pub points: Vec<ParsedPoint>,
}

/// A metric and all of its series under one scope
#[derive(Debug, Clone)]
pub struct ParsedMetricData {
    pub definition: MetricDefinition,
    pub series_data: AHashMap<SeriesKey, ParsedSeriesData>,
}

impl ParsedMetricData {
    /// Looks up a series by its encoded key
    pub fn series(&self, key: &str) -> Option<&ParsedSeriesData> {
        self.series_data.get(key)
    }
}

/// Instrumentation scope grouping of metrics
#[derive(Debug, Clone)]
pub struct ParsedScopeData {
    pub scope_name: Option<String>,
    pub scope_version: Option<String>,
    pub scope_attributes: AttrMap,
    pub metrics: Vec<ParsedMetricData>,
}

/// Resource-level grouping of scopes
#[derive(Debug, Clone)]
pub struct ParsedResourceData {
    pub resource_attributes: AttrMap,
    pub scopes: Vec<ParsedScopeData>,
}

/// Root of a mapped export document
#[derive(Debug, Clone)]
pub struct ParsedSnapshot {
    pub id: String,
    pub file_name: String,
    /// Milliseconds since the unix epoch at mapping time
    pub ingestion_timestamp: i64,
    pub resources: Vec<ParsedResourceData>,
}

impl ParsedSnapshot {
    /// Iterates every metric in resource/scope/metric order
    pub fn metrics(&self) -> impl Iterator<Item = &ParsedMetricData> {
        self.resources
            .iter()
            .flat_map(|r| r.scopes.iter())
            .flat_map(|s| s.metrics.iter())
    }

    /// Finds the first metric with the given name
    pub fn find_metric(&self, metric_name: &str) -> Option<&ParsedMetricData> {
        self.metrics().find(|m| m.definition.name == metric_name)
    }

    /// Distinct metric names in first-seen order
    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for metric in self.metrics() {
            let name = metric.definition.name.as_str();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Total number of series across every metric
    pub fn series_count(&self) -> usize {
        self.metrics().map(|m| m.series_data.len()).sum()
    }
}

/// Locates a series by metric name and key.
///
/// Every scope holding a metric with `metric_name` is searched in order and
/// the first scope that contains `series_key` wins.
pub fn find_series_data<'a>(
    snapshot: &'a ParsedSnapshot,
    metric_name: &str,
    series_key: &str,
) -> Option<&'a ParsedSeriesData> {
    for resource in &snapshot.resources {
        for scope in &resource.scopes {
            let metric = scope
                .metrics
                .iter()
                .find(|m| m.definition.name == metric_name);
            if let Some(series) = metric.and_then(|m| m.series(series_key)) {
                return Some(series);
            }
        }
    }
    None
}
