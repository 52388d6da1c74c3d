//! Cardinality engine.
//!
//! Computes per-attribute unique value counts, actual series counts and the
//! projected count after hypothetically dropping an attribute. Results are
//! memoised per `(snapshot id, metric name)` in [`MetricInfoCache`]; the
//! snapshot itself is never modified.

pub mod attribute_stats;
pub mod jaccard;
pub mod series_count;

pub use attribute_stats::{calculate_attribute_stats, count_unique_values, AttributeStats};
pub use jaccard::estimate_jaccard;
pub use series_count::{get_actual_series_count, simulate_dropped_attributes_series_count};

use crate::core::{MetricDefinition, ParsedSnapshot};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Options for [`MetricInfoCache::get_processed_metric_info`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessMetricOptions {
    /// Attribute key to drop when projecting the series count
    pub simulate_drop_attribute_key: Option<String>,
}

impl ProcessMetricOptions {
    pub fn dropping(key: impl Into<String>) -> Self {
        Self {
            simulate_drop_attribute_key: Some(key.into()),
        }
    }
}

/// Series counts and attribute statistics of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardinalityContext {
    /// Projected count when a drop key was requested, else the actual count
    pub series_count: usize,
    pub base_series_count: usize,
    pub attr_uniq: BTreeMap<String, usize>,
    pub attr_rank: Vec<String>,
}

/// Metric definition combined with its cardinality context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedMetricInfo {
    pub definition: MetricDefinition,
    pub cardinality: CardinalityContext,
}

/// Computes [`ProcessedMetricInfo`] without caching.
///
/// The first metric named `metric_name` in resource/scope order is used.
pub fn compute_processed_metric_info(
    snapshot: &ParsedSnapshot,
    metric_name: &str,
    options: &ProcessMetricOptions,
) -> Option<ProcessedMetricInfo> {
    let metric = snapshot.find_metric(metric_name)?;

    let stats = calculate_attribute_stats(metric);
    let base_series_count = get_actual_series_count(metric);
    let series_count = match options.simulate_drop_attribute_key.as_deref() {
        Some(key) if !key.is_empty() => simulate_dropped_attributes_series_count(metric, &[key]),
        _ => base_series_count,
    };

    Some(ProcessedMetricInfo {
        definition: metric.definition.clone(),
        cardinality: CardinalityContext {
            series_count,
            base_series_count,
            attr_uniq: stats.attr_uniq,
            attr_rank: stats.attr_rank,
        },
    })
}

#[derive(Debug, Clone)]
struct CacheEntry {
    drop_key: Option<String>,
    info: Arc<ProcessedMetricInfo>,
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memo of processed metric info keyed by `(snapshot id, metric name)`.
///
/// One entry is kept per metric. Requesting a different drop key (including
/// none) recomputes and replaces it. Entries live until
/// [`MetricInfoCache::evict_snapshot`] or [`MetricInfoCache::clear`].
#[derive(Debug, Default)]
pub struct MetricInfoCache {
    entries: DashMap<(String, String), CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetricInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns cached info for the metric, computing it on a miss.
    pub fn get_processed_metric_info(
        &self,
        snapshot: &ParsedSnapshot,
        metric_name: &str,
        options: &ProcessMetricOptions,
    ) -> Option<Arc<ProcessedMetricInfo>> {
        let drop_key = options
            .simulate_drop_attribute_key
            .clone()
            .filter(|k| !k.is_empty());
        let cache_key = (snapshot.id.clone(), metric_name.to_string());

        if let Some(entry) = self.entries.get(&cache_key) {
            if entry.drop_key == drop_key {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Arc::clone(&entry.info));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let info = Arc::new(compute_processed_metric_info(snapshot, metric_name, options)?);
        tracing::trace!(
            snapshot_id = %snapshot.id,
            metric = metric_name,
            drop_key = ?drop_key,
            "Computed metric cardinality"
        );
        self.entries.insert(
            cache_key,
            CacheEntry {
                drop_key,
                info: Arc::clone(&info),
            },
        );
        Some(info)
    }

    /// Drops every entry belonging to a snapshot. Returns how many were removed.
    pub fn evict_snapshot(&self, snapshot_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| id != snapshot_id);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{map_to_parsed_snapshot, parse_document};
    use pretty_assertions::assert_eq;

    const STATUS_DOC: &str = r#"{"resourceMetrics":[{
        "resource":{"attributes":[{"key":"host.name","value":{"stringValue":"h1"}}]},
        "scopeMetrics":[{"metrics":[{"name":"http.server.requests","sum":{
            "aggregationTemporality":2,"isMonotonic":true,"dataPoints":[
            {"timeUnixNano":"1","asInt":"1","attributes":[{"key":"status","value":{"intValue":"200"}}]},
            {"timeUnixNano":"1","asInt":"2","attributes":[{"key":"status","value":{"intValue":"404"}}]},
            {"timeUnixNano":"1","asInt":"3","attributes":[{"key":"status","value":{"intValue":"500"}}]}
        ]}}]}]
    }]}"#;

    fn snapshot(id: &str) -> ParsedSnapshot {
        let raw = parse_document(STATUS_DOC).unwrap();
        map_to_parsed_snapshot(&raw, id, "status.json").unwrap()
    }

    #[test]
    fn test_status_scenario() {
        let snap = snapshot("s1");
        let info = compute_processed_metric_info(
            &snap,
            "http.server.requests",
            &ProcessMetricOptions::default(),
        )
        .unwrap();

        let expected: BTreeMap<String, usize> =
            [("host.name".to_string(), 1), ("status".to_string(), 3)].into_iter().collect();
        assert_eq!(info.cardinality.attr_uniq, expected);
        assert_eq!(info.cardinality.attr_rank, vec!["status", "host.name"]);
        assert_eq!(info.cardinality.series_count, 3);
        assert_eq!(info.cardinality.base_series_count, 3);
    }

    #[test]
    fn test_missing_metric_returns_none() {
        let snap = snapshot("s1");
        let cache = MetricInfoCache::new();
        assert!(cache
            .get_processed_metric_info(&snap, "nope", &ProcessMetricOptions::default())
            .is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_simulated_drop() {
        let snap = snapshot("s1");
        let info = compute_processed_metric_info(
            &snap,
            "http.server.requests",
            &ProcessMetricOptions::dropping("status"),
        )
        .unwrap();
        assert_eq!(info.cardinality.series_count, 1);
        assert_eq!(info.cardinality.base_series_count, 3);

        let info = compute_processed_metric_info(
            &snap,
            "http.server.requests",
            &ProcessMetricOptions::dropping("absent"),
        )
        .unwrap();
        assert_eq!(info.cardinality.series_count, 3);
    }

    #[test]
    fn test_cache_hits_and_invalidation() {
        let snap = snapshot("s1");
        let cache = MetricInfoCache::new();
        let none = ProcessMetricOptions::default();
        let drop_status = ProcessMetricOptions::dropping("status");

        let first = cache
            .get_processed_metric_info(&snap, "http.server.requests", &none)
            .unwrap();
        let second = cache
            .get_processed_metric_info(&snap, "http.server.requests", &none)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let dropped = cache
            .get_processed_metric_info(&snap, "http.server.requests", &drop_status)
            .unwrap();
        assert_eq!(dropped.cardinality.series_count, 1);

        // Switching back to no drop key recomputes
        let third = cache
            .get_processed_metric_info(&snap, "http.server.requests", &none)
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.cardinality.series_count, 3);

        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 3,
                entries: 1
            }
        );
    }

    #[test]
    fn test_evict_snapshot() {
        let a = snapshot("a");
        let b = snapshot("b");
        let cache = MetricInfoCache::new();
        let opts = ProcessMetricOptions::default();
        cache.get_processed_metric_info(&a, "http.server.requests", &opts);
        cache.get_processed_metric_info(&b, "http.server.requests", &opts);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.evict_snapshot("a"), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.evict_snapshot("a"), 0);
    }
}
