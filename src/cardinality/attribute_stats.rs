//! Per-attribute unique value statistics.

use crate::core::{AttrValue, ParsedMetricData};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::collections::BTreeMap;

/// Unique value counts and ranking for one metric
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeStats {
    /// Distinct value count per attribute key
    pub attr_uniq: BTreeMap<String, usize>,
    /// Keys by descending count, ties broken by key
    pub attr_rank: Vec<String>,
}

/// Counts distinct values in an iterator.
///
/// `"42"` and `42` are different values.
pub fn count_unique_values<'a, I>(values: I) -> usize
where
    I: IntoIterator<Item = &'a AttrValue>,
{
    values.into_iter().collect::<AHashSet<_>>().len()
}

/// Computes [`AttributeStats`] over resource and metric attributes of every series.
pub fn calculate_attribute_stats(metric: &ParsedMetricData) -> AttributeStats {
    let mut collector: AHashMap<&str, AHashSet<&AttrValue>> = AHashMap::new();

    for series in metric.series_data.values() {
        let attrs = series
            .resource_attributes
            .iter()
            .chain(series.metric_attributes.iter());
        for (key, value) in attrs {
            collector.entry(key.as_str()).or_default().insert(value);
        }
    }

    let attr_uniq: BTreeMap<String, usize> = collector
        .into_iter()
        .map(|(key, values)| (key.to_string(), values.len()))
        .collect();

    // BTreeMap iteration is already sorted by key; a stable sort keeps that for ties
    let mut attr_rank: Vec<String> = attr_uniq.keys().cloned().collect();
    attr_rank.sort_by(|a, b| attr_uniq[b].cmp(&attr_uniq[a]));

    AttributeStats {
        attr_uniq,
        attr_rank,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        encode_series_key, AttrMap, InstrumentType, MetricDefinition, ParsedSeriesData,
    };

    fn metric_with(series: Vec<(AttrMap, AttrMap)>) -> ParsedMetricData {
        let mut series_data = AHashMap::new();
        for (resource, attrs) in series {
            let key = encode_series_key("m", &resource, &attrs);
            series_data.insert(
                key.clone(),
                ParsedSeriesData {
                    series_key: key,
                    resource_attributes: resource,
                    metric_attributes: attrs,
                    points: Vec::new(),
                },
            );
        }
        ParsedMetricData {
            definition: MetricDefinition {
                name: "m".to_string(),
                description: None,
                unit: None,
                instrument_type: InstrumentType::Gauge,
                temporality: None,
                is_monotonic: None,
            },
            series_data,
        }
    }

    fn map(pairs: &[(&str, AttrValue)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_count_unique_values() {
        let values = [
            AttrValue::from("a"),
            AttrValue::from("a"),
            AttrValue::from("42"),
            AttrValue::Number(42.0),
            AttrValue::Bool(true),
        ];
        assert_eq!(count_unique_values(&values), 4);
        let empty: [AttrValue; 0] = [];
        assert_eq!(count_unique_values(&empty), 0);
    }

    #[test]
    fn test_rank_ordering_with_ties() {
        let metric = metric_with(vec![
            (map(&[("zone", "a".into())]), map(&[("method", "GET".into()), ("pod", "p1".into())])),
            (map(&[("zone", "a".into())]), map(&[("method", "PUT".into()), ("pod", "p2".into())])),
            (map(&[("zone", "a".into())]), map(&[("method", "GET".into()), ("pod", "p3".into())])),
        ]);
        let stats = calculate_attribute_stats(&metric);

        assert_eq!(stats.attr_uniq["pod"], 3);
        assert_eq!(stats.attr_uniq["method"], 2);
        assert_eq!(stats.attr_uniq["zone"], 1);
        assert_eq!(stats.attr_rank, vec!["pod", "method", "zone"]);
    }

    #[test]
    fn test_equal_counts_break_ties_by_key() {
        let metric = metric_with(vec![
            (AttrMap::new(), map(&[("b", "1".into()), ("a", "1".into())])),
            (AttrMap::new(), map(&[("b", "2".into()), ("a", "2".into())])),
        ]);
        let stats = calculate_attribute_stats(&metric);
        assert_eq!(stats.attr_rank, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_metric() {
        let stats = calculate_attribute_stats(&metric_with(Vec::new()));
        assert!(stats.attr_uniq.is_empty());
        assert!(stats.attr_rank.is_empty());
    }
}
