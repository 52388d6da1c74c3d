//! Core domain models and shared infrastructure for Intellimetric.
//!
//! This module contains the snapshot data model, the series key codec,
//! configuration and the crate error type.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod series_key;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, LogLevel, PoolConfig};
pub use error::{IntellimetricError, Result};
pub use series_key::{decode_series_key, encode_series_key, DecodedSeriesKey};
pub use types::{
    find_series_data, AttrMap, AttrValue, ExemplarData, HistogramPoint, InstrumentType,
    MetricDefinition, NumberPoint, ParsedMetricData, ParsedPoint, ParsedResourceData,
    ParsedScopeData, ParsedSeriesData, ParsedSnapshot, SeriesKey, Temporality,
};
