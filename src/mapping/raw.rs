//! Serde mirror of the OTLP/JSON metrics export document.
//!
//! Only the fields the mapper reads are declared; anything else in the
//! document is ignored. 64-bit integer fields are decimal strings in the
//! OTLP/JSON encoding but bare numbers are accepted too.

use serde::Deserialize;

/// Top-level export request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawExportMetricsServiceRequest {
    pub resource_metrics: Vec<RawResourceMetrics>,
}

/// Resource-level wrapper for scope metrics
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawResourceMetrics {
    pub resource: Option<RawResource>,
    pub scope_metrics: Vec<RawScopeMetrics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawResource {
    pub attributes: Vec<RawKeyValue>,
}

/// Instrumentation scope grouping of metrics
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawScopeMetrics {
    pub scope: Option<RawScope>,
    pub metrics: Vec<RawMetric>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawScope {
    pub name: Option<String>,
    pub version: Option<String>,
    pub attributes: Vec<RawKeyValue>,
}

/// Single metric with at most one populated data field
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMetric {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub gauge: Option<RawGauge>,
    pub sum: Option<RawSum>,
    pub histogram: Option<RawHistogram>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawGauge {
    pub data_points: Vec<RawNumberDataPoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSum {
    pub data_points: Vec<RawNumberDataPoint>,
    pub aggregation_temporality: Option<i64>,
    pub is_monotonic: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawHistogram {
    pub data_points: Vec<RawHistogramDataPoint>,
    pub aggregation_temporality: Option<i64>,
}

/// Gauge/sum data point
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawNumberDataPoint {
    pub attributes: Vec<RawKeyValue>,
    #[serde(deserialize_with = "lenient::opt_u64")]
    pub time_unix_nano: Option<u64>,
    #[serde(deserialize_with = "lenient::opt_u64")]
    pub start_time_unix_nano: Option<u64>,
    #[serde(deserialize_with = "lenient::opt_int_as_f64")]
    pub as_int: Option<f64>,
    pub as_double: Option<f64>,
    pub exemplars: Vec<RawExemplar>,
}

/// Explicit-bucket histogram data point
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawHistogramDataPoint {
    pub attributes: Vec<RawKeyValue>,
    #[serde(deserialize_with = "lenient::opt_u64")]
    pub time_unix_nano: Option<u64>,
    #[serde(deserialize_with = "lenient::opt_u64")]
    pub start_time_unix_nano: Option<u64>,
    #[serde(deserialize_with = "lenient::opt_u64")]
    pub count: Option<u64>,
    pub sum: Option<f64>,
    #[serde(deserialize_with = "lenient::u64_vec")]
    pub bucket_counts: Vec<u64>,
    pub explicit_bounds: Vec<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub exemplars: Vec<RawExemplar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawExemplar {
    #[serde(deserialize_with = "lenient::opt_u64")]
    pub time_unix_nano: Option<u64>,
    #[serde(deserialize_with = "lenient::opt_int_as_f64")]
    pub as_int: Option<f64>,
    pub as_double: Option<f64>,
    pub span_id: Option<String>,
    pub trace_id: Option<String>,
    pub filtered_attributes: Vec<RawKeyValue>,
}

/// Key/value pair of an attribute list
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawKeyValue {
    pub key: String,
    pub value: Option<RawAnyValue>,
}

/// Tagged attribute value. Array and kvlist variants are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawAnyValue {
    pub string_value: Option<String>,
    pub double_value: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_int_as_f64")]
    pub int_value: Option<f64>,
    pub bool_value: Option<bool>,
}

mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntLike {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    impl IntLike {
        fn to_u64(&self) -> Result<u64, String> {
            match self {
                IntLike::Text(s) => s
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| format!("invalid unsigned integer string {:?}: {}", s, e)),
                IntLike::Unsigned(n) => Ok(*n),
                IntLike::Signed(n) => {
                    u64::try_from(*n).map_err(|_| format!("negative value {} for unsigned field", n))
                },
                IntLike::Float(f) if f.is_finite() && *f >= 0.0 => Ok(*f as u64),
                IntLike::Float(f) => Err(format!("invalid unsigned value {}", f)),
            }
        }

        // Values beyond 2^53 lose precision here; the export format accepts that.
        fn to_f64(&self) -> Result<f64, String> {
            match self {
                IntLike::Text(s) => s
                    .trim()
                    .parse::<i128>()
                    .map(|n| n as f64)
                    .map_err(|e| format!("invalid integer string {:?}: {}", s, e)),
                IntLike::Unsigned(n) => Ok(*n as f64),
                IntLike::Signed(n) => Ok(*n as f64),
                IntLike::Float(f) => Ok(*f),
            }
        }
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Option::<IntLike>::deserialize(d)?
            .map(|v| v.to_u64())
            .transpose()
            .map_err(D::Error::custom)
    }

    pub fn opt_int_as_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Option::<IntLike>::deserialize(d)?
            .map(|v| v.to_f64())
            .transpose()
            .map_err(D::Error::custom)
    }

    pub fn u64_vec<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u64>, D::Error> {
        Option::<Vec<IntLike>>::deserialize(d)?
            .unwrap_or_default()
            .iter()
            .map(IntLike::to_u64)
            .collect::<Result<Vec<_>, _>>()
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_encoded_integers() {
        let point: RawNumberDataPoint = serde_json::from_str(
            r#"{"timeUnixNano":"1700000000000000000","asInt":"42","attributes":[]}"#,
        )
        .unwrap();
        assert_eq!(point.time_unix_nano, Some(1_700_000_000_000_000_000));
        assert_eq!(point.as_int, Some(42.0));
        assert_eq!(point.as_double, None);
    }

    #[test]
    fn test_bare_number_integers() {
        let point: RawHistogramDataPoint =
            serde_json::from_str(r#"{"timeUnixNano":5,"count":3,"bucketCounts":["1",2]}"#).unwrap();
        assert_eq!(point.time_unix_nano, Some(5));
        assert_eq!(point.count, Some(3));
        assert_eq!(point.bucket_counts, vec![1, 2]);
    }

    #[test]
    fn test_invalid_integer_string_rejected() {
        let result: Result<RawNumberDataPoint, _> =
            serde_json::from_str(r#"{"timeUnixNano":"soon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_fields_default() {
        let request: RawExportMetricsServiceRequest = serde_json::from_str("{}").unwrap();
        assert!(request.resource_metrics.is_empty());

        let kv: RawKeyValue = serde_json::from_str(r#"{"key":"k","value":null}"#).unwrap();
        assert!(kv.value.is_none());
    }
}
