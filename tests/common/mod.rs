//! Common test utilities and fixtures.

#![allow(dead_code)]

use crossbeam_channel::{bounded, Receiver, Sender};
use intellimetric_lib::core::{ParsedSnapshot, PoolConfig, Result};
use intellimetric_lib::mapping::RawExportMetricsServiceRequest;
use intellimetric_lib::pool::{OtlpJsonParser, PoolEvent, SnapshotParser};
use serde_json::{json, Value};
use std::time::Duration;

/// Builds an OTLP/JSON attribute list from string pairs.
pub fn attrs(pairs: &[(&str, &str)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(k, v)| json!({"key": k, "value": {"stringValue": v}}))
            .collect(),
    )
}

/// Number data point carrying `asDouble`
pub fn point(value: f64, attributes: &[(&str, &str)]) -> Value {
    json!({
        "timeUnixNano": "1700000000000000000",
        "asDouble": value,
        "attributes": attrs(attributes),
    })
}

/// Number data point carrying a string encoded `asInt`
pub fn int_point(value: i64, attributes: &[(&str, &str)]) -> Value {
    json!({
        "timeUnixNano": "1700000000000000000",
        "asInt": value.to_string(),
        "attributes": attrs(attributes),
    })
}

pub fn gauge(name: &str, points: Vec<Value>) -> Value {
    json!({"name": name, "unit": "1", "gauge": {"dataPoints": points}})
}

pub fn sum(name: &str, temporality: i64, monotonic: bool, points: Vec<Value>) -> Value {
    json!({
        "name": name,
        "sum": {
            "aggregationTemporality": temporality,
            "isMonotonic": monotonic,
            "dataPoints": points,
        },
    })
}

/// Fixture builder for OTLP export documents.
#[derive(Default)]
pub struct DocumentBuilder {
    resources: Vec<Value>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, resource_attrs: &[(&str, &str)], metrics: Vec<Value>) -> Self {
        self.resources.push(json!({
            "resource": {"attributes": attrs(resource_attrs)},
            "scopeMetrics": [{
                "scope": {"name": "intellimetric.tests", "version": "0.1.0"},
                "metrics": metrics,
            }],
        }));
        self
    }

    pub fn build(self) -> String {
        json!({"resourceMetrics": self.resources}).to_string()
    }
}

/// Three series sharing `host.name=h1`, differing in `status`.
pub fn status_document() -> String {
    DocumentBuilder::new()
        .resource(
            &[("host.name", "h1")],
            vec![sum(
                "http.server.requests",
                2,
                true,
                vec![
                    int_point(10, &[("status", "200")]),
                    int_point(2, &[("status", "404")]),
                    int_point(1, &[("status", "500")]),
                ],
            )],
        )
        .build()
}

/// One gauge with a series per pod spread over `resources` resources.
pub fn pod_document(resources: usize, pods_per_resource: usize) -> String {
    let mut builder = DocumentBuilder::new();
    for r in 0..resources {
        let host = format!("host-{}", r);
        let points = (0..pods_per_resource)
            .map(|p| {
                let pod = format!("pod-{}-{}", r, p);
                point(p as f64, &[("k8s.pod.name", pod.as_str()), ("method", "GET")])
            })
            .collect();
        builder = builder.resource(&[("host.name", host.as_str())], vec![gauge("container.cpu", points)]);
    }
    builder.build()
}

/// Pool configuration with a fixed number of units
pub fn units_config(units: usize) -> PoolConfig {
    PoolConfig {
        units: Some(units),
        max_units: units.max(4),
        ..PoolConfig::default()
    }
}

/// Parser that blocks documents containing `GATE` until released and
/// panics on documents containing `PANIC` (after the gate, if both).
pub struct GatedParser {
    gate: Receiver<()>,
}

impl GatedParser {
    /// Returns the parser and the sender that releases one gated document per message.
    pub fn new() -> (Self, Sender<()>) {
        let (tx, rx) = bounded(16);
        (Self { gate: rx }, tx)
    }
}

impl SnapshotParser for GatedParser {
    fn parse(&self, raw_text: &str) -> Result<RawExportMetricsServiceRequest> {
        if raw_text.contains("GATE") {
            // A dropped sender also opens the gate
            let _ = self.gate.recv_timeout(Duration::from_secs(10));
        }
        if raw_text.contains("PANIC") {
            panic!("parser exploded");
        }
        let json = raw_text.replace("GATE", "").replace("PANIC", "");
        OtlpJsonParser.parse(&json)
    }

    fn map(
        &self,
        raw: &RawExportMetricsServiceRequest,
        snapshot_id: &str,
        file_name: &str,
        checkpoint: &mut dyn FnMut(usize, usize) -> Result<()>,
    ) -> Result<ParsedSnapshot> {
        OtlpJsonParser.map(raw, snapshot_id, file_name, checkpoint)
    }
}

/// Marks a document so [`GatedParser`] blocks on it. The marker is stripped
/// before parsing.
pub fn gated(doc: &str) -> String {
    format!("GATE{}", doc)
}

pub fn panicking() -> String {
    "PANIC".to_string()
}

/// Drains every event currently buffered in the receiver.
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<PoolEvent>) -> Vec<PoolEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
