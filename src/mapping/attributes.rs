//! Attribute, temporality and exemplar conversion helpers.

use crate::core::{AttrMap, AttrValue, ExemplarData, Temporality};
use crate::mapping::raw::{RawAnyValue, RawExemplar, RawKeyValue};

/// Maps an OTLP attribute list into an [`AttrMap`].
///
/// The first populated variant wins in string, double, int, bool order.
/// Entries without a primitive value are skipped.
pub fn map_attrs(raw: &[RawKeyValue]) -> AttrMap {
    collect_attrs(raw, primitive_value)
}

fn collect_attrs(raw: &[RawKeyValue], pick: fn(&RawAnyValue) -> Option<AttrValue>) -> AttrMap {
    let mut out = AttrMap::new();
    for kv in raw {
        if let Some(value) = kv.value.as_ref().and_then(pick) {
            out.insert(kv.key.clone(), value);
        }
    }
    out
}

fn primitive_value(v: &RawAnyValue) -> Option<AttrValue> {
    if let Some(s) = &v.string_value {
        Some(AttrValue::String(s.clone()))
    } else if let Some(d) = v.double_value {
        Some(AttrValue::Number(d))
    } else if let Some(i) = v.int_value {
        Some(AttrValue::Number(i))
    } else {
        v.bool_value.map(AttrValue::Bool)
    }
}

/// Exemplar filtered attributes prefer the integer payload over the double.
fn exemplar_value(v: &RawAnyValue) -> Option<AttrValue> {
    if let Some(s) = &v.string_value {
        Some(AttrValue::String(s.clone()))
    } else if let Some(i) = v.int_value {
        Some(AttrValue::Number(i))
    } else if let Some(d) = v.double_value {
        Some(AttrValue::Number(d))
    } else {
        v.bool_value.map(AttrValue::Bool)
    }
}

/// Converts the OTLP aggregation temporality enum.
pub fn map_temporality(t: Option<i64>) -> Temporality {
    match t {
        Some(1) => Temporality::Delta,
        Some(2) => Temporality::Cumulative,
        _ => Temporality::Unspecified,
    }
}

/// Maps raw exemplars, keeping only primitive filtered attributes.
pub fn extract_exemplars(raw: &[RawExemplar]) -> Vec<ExemplarData> {
    raw.iter()
        .map(|r| ExemplarData {
            time_unix_nano: r.time_unix_nano.unwrap_or(0),
            value: r.as_double.or(r.as_int).unwrap_or(0.0),
            span_id: r.span_id.clone(),
            trace_id: r.trace_id.clone(),
            attributes: collect_attrs(&r.filtered_attributes, exemplar_value),
        })
        .collect()
}
