//! OTLP/JSON export mapping.
//!
//! Converts a raw export document into the internal [`ParsedSnapshot`]
//! graph. Points are grouped into series by their canonical series key.
//!
//! | OTLP field present | instrument | temporality        | is_monotonic |
//! |--------------------|------------|--------------------|--------------|
//! | `gauge`            | Gauge      | Unspecified        | -            |
//! | `sum`              | Sum        | enum 1/2 -> Delta/Cumulative | copied |
//! | `histogram`        | Histogram  | enum 1/2 -> Delta/Cumulative | -  |
//!
//! A metric with none of these fields aborts the whole mapping call; no
//! partial snapshot is ever returned.

pub mod attributes;
pub mod raw;

pub use attributes::{extract_exemplars, map_attrs, map_temporality};
pub use raw::RawExportMetricsServiceRequest;

use crate::core::{
    encode_series_key, AttrMap, HistogramPoint, InstrumentType, IntellimetricError,
    MetricDefinition, NumberPoint, ParsedMetricData, ParsedPoint, ParsedResourceData,
    ParsedScopeData, ParsedSeriesData, ParsedSnapshot, Result, SeriesKey, Temporality,
};
use ahash::AHashMap;
use raw::{RawHistogramDataPoint, RawMetric, RawNumberDataPoint};

/// Data points of a metric, typed by instrument
#[derive(Debug, Clone, Copy)]
pub enum RawPoints<'a> {
    Number(&'a [RawNumberDataPoint]),
    Histogram(&'a [RawHistogramDataPoint]),
    Unsupported,
}

/// Definition and raw points derived from one OTLP metric
#[derive(Debug)]
pub struct MetricInfo<'a> {
    pub definition: MetricDefinition,
    pub points: RawPoints<'a>,
}

/// Parses raw JSON text into the export document shape.
pub fn parse_document(raw_json: &str) -> Result<RawExportMetricsServiceRequest> {
    serde_json::from_str(raw_json).map_err(|e| IntellimetricError::malformed_input(e.to_string()))
}

/// Determines the metric definition and locates its data points.
pub fn derive_metric(m: &RawMetric) -> MetricInfo<'_> {
    let definition = |instrument_type: InstrumentType,
                      temporality: Option<Temporality>,
                      is_monotonic: Option<bool>| MetricDefinition {
        name: m.name.clone(),
        description: m.description.clone(),
        unit: m.unit.clone(),
        instrument_type,
        temporality,
        is_monotonic,
    };

    if let Some(gauge) = &m.gauge {
        return MetricInfo {
            definition: definition(InstrumentType::Gauge, Some(Temporality::Unspecified), None),
            points: RawPoints::Number(&gauge.data_points),
        };
    }

    if let Some(sum) = &m.sum {
        return MetricInfo {
            definition: definition(
                InstrumentType::Sum,
                Some(map_temporality(sum.aggregation_temporality)),
                sum.is_monotonic,
            ),
            points: RawPoints::Number(&sum.data_points),
        };
    }

    if let Some(histogram) = &m.histogram {
        return MetricInfo {
            definition: definition(
                InstrumentType::Histogram,
                Some(map_temporality(histogram.aggregation_temporality)),
                None,
            ),
            points: RawPoints::Histogram(&histogram.data_points),
        };
    }

    MetricInfo {
        definition: definition(InstrumentType::Unknown, None, None),
        points: RawPoints::Unsupported,
    }
}

/// Maps a gauge/sum point. `asDouble` wins over `asInt`; neither means 0.
pub fn map_number_point(raw: &RawNumberDataPoint) -> ParsedPoint {
    ParsedPoint::Number(NumberPoint {
        timestamp_unix_nano: raw.time_unix_nano.unwrap_or(0),
        start_time_unix_nano: raw.start_time_unix_nano,
        value: raw.as_double.or(raw.as_int).unwrap_or(0.0),
        attributes: map_attrs(&raw.attributes),
        exemplars: extract_exemplars(&raw.exemplars),
    })
}

/// Maps an explicit-bucket histogram point.
pub fn map_histogram_point(raw: &RawHistogramDataPoint) -> ParsedPoint {
    ParsedPoint::Histogram(HistogramPoint {
        timestamp_unix_nano: raw.time_unix_nano.unwrap_or(0),
        start_time_unix_nano: raw.start_time_unix_nano,
        count: raw.count.unwrap_or(0),
        sum: raw.sum,
        bucket_counts: raw.bucket_counts.clone(),
        explicit_bounds: raw.explicit_bounds.clone(),
        min: raw.min,
        max: raw.max,
        attributes: map_attrs(&raw.attributes),
        exemplars: extract_exemplars(&raw.exemplars),
    })
}

/// Transforms an export document into a [`ParsedSnapshot`].
pub fn map_to_parsed_snapshot(
    raw: &RawExportMetricsServiceRequest,
    snapshot_id: &str,
    file_name: &str,
) -> Result<ParsedSnapshot> {
    map_with_checkpoint(raw, snapshot_id, file_name, |_, _| Ok(()))
}

/// Same as [`map_to_parsed_snapshot`], calling `checkpoint(done, total)`
/// after each resource. An error from the checkpoint aborts mapping.
pub fn map_with_checkpoint<F>(
    raw: &RawExportMetricsServiceRequest,
    snapshot_id: &str,
    file_name: &str,
    mut checkpoint: F,
) -> Result<ParsedSnapshot>
where
    F: FnMut(usize, usize) -> Result<()>,
{
    let total = raw.resource_metrics.len();
    let mut resources = Vec::with_capacity(total);

    for (index, res) in raw.resource_metrics.iter().enumerate() {
        let resource_attrs = res
            .resource
            .as_ref()
            .map(|r| map_attrs(&r.attributes))
            .unwrap_or_default();

        let mut scopes = Vec::with_capacity(res.scope_metrics.len());
        for scope in &res.scope_metrics {
            let mut metrics = Vec::with_capacity(scope.metrics.len());
            for m in &scope.metrics {
                metrics.push(map_metric(m, &resource_attrs)?);
            }

            scopes.push(ParsedScopeData {
                scope_name: scope.scope.as_ref().and_then(|s| s.name.clone()),
                scope_version: scope.scope.as_ref().and_then(|s| s.version.clone()),
                scope_attributes: scope
                    .scope
                    .as_ref()
                    .map(|s| map_attrs(&s.attributes))
                    .unwrap_or_default(),
                metrics,
            });
        }

        resources.push(ParsedResourceData {
            resource_attributes: resource_attrs,
            scopes,
        });
        checkpoint(index + 1, total)?;
    }

    Ok(ParsedSnapshot {
        id: snapshot_id.to_string(),
        file_name: file_name.to_string(),
        ingestion_timestamp: chrono::Utc::now().timestamp_millis(),
        resources,
    })
}

fn map_metric(m: &RawMetric, resource_attrs: &AttrMap) -> Result<ParsedMetricData> {
    let info = derive_metric(m);
    let name = info.definition.name.as_str();
    let mut series_data: AHashMap<SeriesKey, ParsedSeriesData> = AHashMap::new();

    match info.points {
        RawPoints::Number(points) => {
            for pt in points {
                push_point(&mut series_data, name, resource_attrs, &pt.attributes, map_number_point(pt));
            }
        },
        RawPoints::Histogram(points) => {
            for pt in points {
                push_point(
                    &mut series_data,
                    name,
                    resource_attrs,
                    &pt.attributes,
                    map_histogram_point(pt),
                );
            }
        },
        RawPoints::Unsupported => {
            tracing::debug!(metric = %m.name, "metric has no gauge, sum or histogram data");
            return Err(IntellimetricError::unsupported_metric(m.name.as_str()));
        },
    }

    Ok(ParsedMetricData {
        definition: info.definition,
        series_data,
    })
}

fn push_point(
    series_data: &mut AHashMap<SeriesKey, ParsedSeriesData>,
    metric_name: &str,
    resource_attrs: &AttrMap,
    raw_attrs: &[raw::RawKeyValue],
    point: ParsedPoint,
) {
    let metric_attrs = map_attrs(raw_attrs);
    let series_key = encode_series_key(metric_name, resource_attrs, &metric_attrs);
    series_data
        .entry(series_key)
        .or_insert_with_key(|key| ParsedSeriesData {
            series_key: key.clone(),
            resource_attributes: resource_attrs.clone(),
            metric_attributes: metric_attrs,
            points: Vec::new(),
        })
        .points
        .push(point);
}
