//! Intellimetric - OTLP metric snapshot explorer.
//!
//! Intellimetric loads OpenTelemetry metric exports (OTLP/JSON), maps them
//! into an immutable in-memory snapshot of time series and explains where
//! series cardinality comes from.
//!
//! # Features
//!
//! - **Parallel Parsing**: documents are parsed and mapped on background
//!   units with progress events and cooperative cancellation
//! - **Canonical Series Keys**: attribute order never splits a series
//! - **Cardinality Analysis**: unique values per attribute, ranking, and
//!   "what if this attribute was dropped" projections
//! - **Structured Failures**: every task ends in a snapshot, a typed
//!   failure, or a cancellation
//!
//! # Architecture
//!
//! - `core`: Domain models, series key codec, configuration, errors
//! - `mapping`: OTLP/JSON document to snapshot mapping
//! - `cardinality`: Attribute statistics and series count projections
//! - `pool`: Task dispatch pool with progress and cancellation
//! - `input`: Input file validation and loading
//! - `cli`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use intellimetric_lib::cardinality::{MetricInfoCache, ProcessMetricOptions};
//! use intellimetric_lib::core::PoolConfig;
//! use intellimetric_lib::pool::{ParseTask, ParserPool, TaskOutcome};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = ParserPool::new(PoolConfig::default());
//!     let raw = std::fs::read_to_string("metrics.json").unwrap();
//!     let handle = pool.dispatch(ParseTask::new("snap-1", "metrics.json", raw));
//!
//!     if let TaskOutcome::Success(snapshot) = handle.outcome().await {
//!         let cache = MetricInfoCache::new();
//!         let info = cache.get_processed_metric_info(
//!             &snapshot,
//!             "http.server.requests",
//!             &ProcessMetricOptions::dropping("k8s.pod.name"),
//!         );
//!         println!("{:?}", info.map(|i| i.cardinality.series_count));
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cardinality;
pub mod cli;
pub mod core;
pub mod input;
pub mod mapping;
pub mod pool;

// Re-export core types for convenience
pub use crate::core::{Config, IntellimetricError, Result};
pub use crate::pool::{ParseTask, ParserPool, TaskOutcome};
