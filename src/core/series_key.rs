//! Canonical series identity encoding.
//!
//! A series key is `<metric><SEP_ATTR><k1>=<v1><SEP_ATTR><k2>=<v2>...` with
//! resource and metric attributes merged (metric attributes win) and the
//! merged keys sorted. The key is only meant for map lookups and debugging.
//!
//! Decoding is best effort. Values are rendered without type tags, so a string
//! attribute such as `"123"` or `"true"` comes back as a number or boolean.
//! Metric names containing `|` and attribute keys containing `=` do not
//! decode correctly either.

use crate::core::types::{AttrMap, AttrValue, SeriesKey};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Separator between attribute key/value pairs.
pub const SEP_ATTR: char = '|';
/// Separator between attribute key and value.
pub const SEP_KV: char = '=';

/// Metric name and attributes recovered from a series key
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSeriesKey {
    pub metric_name: String,
    pub attributes: AttrMap,
}

/// Encodes a metric name and attribute maps into a [`SeriesKey`].
///
/// The result does not depend on insertion order of either map.
pub fn encode_series_key(
    metric_name: &str,
    resource_attrs: &AttrMap,
    metric_attrs: &AttrMap,
) -> SeriesKey {
    let mut merged: BTreeMap<&str, &AttrValue> = BTreeMap::new();
    for (k, v) in resource_attrs.iter().chain(metric_attrs.iter()) {
        merged.insert(k.as_str(), v);
    }

    let mut key = String::with_capacity(metric_name.len() + merged.len() * 16 + 1);
    key.push_str(metric_name);
    key.push(SEP_ATTR);
    for (i, (k, v)) in merged.into_iter().enumerate() {
        if i > 0 {
            key.push(SEP_ATTR);
        }
        // Writing into a String cannot fail
        let _ = write!(key, "{}{}{}", k, SEP_KV, v);
    }
    SeriesKey::from_encoded(key)
}

/// Best-effort inverse of [`encode_series_key`].
///
/// Returns `None` when the key has no metric name or a pair is missing its
/// key or the `=` separator.
pub fn decode_series_key(key: &str) -> Option<DecodedSeriesKey> {
    let mut parts = key.split(SEP_ATTR);
    let metric_name = parts.next().filter(|name| !name.is_empty())?;
    let pairs: Vec<&str> = parts.collect();

    let mut attributes = AttrMap::new();
    // `name|` is how a series without attributes encodes
    if pairs.len() == 1 && pairs[0].is_empty() {
        return Some(DecodedSeriesKey {
            metric_name: metric_name.to_string(),
            attributes,
        });
    }

    for pair in pairs {
        let (attr_key, raw_value) = pair.split_once(SEP_KV)?;
        if attr_key.is_empty() {
            return None;
        }
        attributes.insert(attr_key.to_string(), parse_literal(raw_value));
    }

    Some(DecodedSeriesKey {
        metric_name: metric_name.to_string(),
        attributes,
    })
}

fn parse_literal(raw: &str) -> AttrValue {
    match raw {
        "true" => AttrValue::Bool(true),
        "false" => AttrValue::Bool(false),
        _ => match raw.trim().parse::<f64>() {
            Ok(n) if !raw.trim().is_empty() && !n.is_nan() => AttrValue::Number(n),
            _ => AttrValue::String(raw.to_string()),
        },
    }
}
