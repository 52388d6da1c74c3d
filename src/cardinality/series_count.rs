//! Actual and projected series counts.

use crate::core::{encode_series_key, AttrMap, ParsedMetricData};
use ahash::AHashSet;

/// Number of series the metric actually has.
pub fn get_actual_series_count(metric: &ParsedMetricData) -> usize {
    metric.series_data.len()
}

/// Projects the series count if `keys_to_drop` were removed from every series.
///
/// The projection never exceeds [`get_actual_series_count`].
pub fn simulate_dropped_attributes_series_count<S: AsRef<str>>(
    metric: &ParsedMetricData,
    keys_to_drop: &[S],
) -> usize {
    if keys_to_drop.is_empty() {
        return get_actual_series_count(metric);
    }

    let name = metric.definition.name.as_str();
    let mut projected = AHashSet::with_capacity(metric.series_data.len());
    for series in metric.series_data.values() {
        let mut resource: AttrMap = series.resource_attributes.clone();
        let mut attrs: AttrMap = series.metric_attributes.clone();
        for key in keys_to_drop {
            resource.remove(key.as_ref());
            attrs.remove(key.as_ref());
        }
        projected.insert(encode_series_key(name, &resource, &attrs));
    }
    projected.len()
}
