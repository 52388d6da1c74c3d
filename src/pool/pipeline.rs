//! The parse -> map pipeline executed for every task.
//!
//! Both the background units and the synchronous fallback run
//! [`run_pipeline`], so progress stages and cancellation checks are identical
//! on either path.

use crate::core::{IntellimetricError, ParsedSnapshot, Result};
use crate::mapping::{self, RawExportMetricsServiceRequest};
use crate::pool::cancel::CancellationToken;
use crate::pool::events::ProgressStage;
use crate::pool::task::{TaskContext, TaskOutcome};
use std::sync::Arc;

const PARSE_START: u8 = 0;
const PARSE_DONE: u8 = 33;
const MAPPING_START: u8 = 50;
const MAPPING_END: u8 = 89;
const PROCESSING_START: u8 = 90;
const DONE: u8 = 100;

/// Turns raw document text into a snapshot.
///
/// The pool owns one parser shared by all units.
pub trait SnapshotParser: Send + Sync + 'static {
    /// Parses raw text into the export document shape.
    fn parse(&self, raw_text: &str) -> Result<RawExportMetricsServiceRequest>;

    /// Maps a parsed document, calling `checkpoint(done, total)` per resource.
    fn map(
        &self,
        raw: &RawExportMetricsServiceRequest,
        snapshot_id: &str,
        file_name: &str,
        checkpoint: &mut dyn FnMut(usize, usize) -> Result<()>,
    ) -> Result<ParsedSnapshot>;
}

/// OTLP/JSON parser backed by serde_json and the mapper
#[derive(Debug, Clone, Copy, Default)]
pub struct OtlpJsonParser;

impl SnapshotParser for OtlpJsonParser {
    fn parse(&self, raw_text: &str) -> Result<RawExportMetricsServiceRequest> {
        mapping::parse_document(raw_text)
    }

    fn map(
        &self,
        raw: &RawExportMetricsServiceRequest,
        snapshot_id: &str,
        file_name: &str,
        checkpoint: &mut dyn FnMut(usize, usize) -> Result<()>,
    ) -> Result<ParsedSnapshot> {
        mapping::map_with_checkpoint(raw, snapshot_id, file_name, checkpoint)
    }
}

/// Percentage reported after `done` of `total` resources were mapped
fn mapping_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return MAPPING_END;
    }
    let span = usize::from(MAPPING_END - MAPPING_START);
    let step = span * done.min(total) / total;
    MAPPING_START + step as u8
}

/// Runs parse and map for one task.
///
/// `progress` is invoked at every stage boundary with non-decreasing
/// percentages. The token is checked before each stage and after each mapped
/// resource; a tripped token yields [`TaskOutcome::Canceled`].
pub fn run_pipeline(
    parser: &dyn SnapshotParser,
    ctx: &TaskContext,
    raw_text: &str,
    token: &CancellationToken,
    progress: &mut dyn FnMut(u8, ProgressStage),
) -> TaskOutcome {
    progress(PARSE_START, ProgressStage::Parsing);
    if token.is_canceled() {
        return TaskOutcome::Canceled;
    }

    let raw = match parser.parse(raw_text) {
        Ok(raw) => raw,
        Err(IntellimetricError::Canceled) => return TaskOutcome::Canceled,
        Err(e) => {
            tracing::debug!(task_id = %ctx.task_id, error = %e, "Parse stage failed");
            return TaskOutcome::Failure(ctx.parse_failure(&e));
        },
    };
    progress(PARSE_DONE, ProgressStage::Parsing);

    if token.is_canceled() {
        return TaskOutcome::Canceled;
    }
    progress(MAPPING_START, ProgressStage::Mapping);

    let mut checkpoint = |done: usize, total: usize| -> Result<()> {
        token.check()?;
        progress(mapping_percent(done, total), ProgressStage::Mapping);
        Ok(())
    };
    let snapshot = match parser.map(&raw, &ctx.snapshot_id, &ctx.file_name, &mut checkpoint) {
        Ok(snapshot) => snapshot,
        Err(IntellimetricError::Canceled) => return TaskOutcome::Canceled,
        Err(e) => {
            tracing::debug!(task_id = %ctx.task_id, error = %e, "Mapping stage failed");
            return TaskOutcome::Failure(ctx.mapping_failure(&e));
        },
    };

    progress(PROCESSING_START, ProgressStage::Processing);
    if token.is_canceled() {
        return TaskOutcome::Canceled;
    }
    progress(DONE, ProgressStage::Processing);

    TaskOutcome::Success(Arc::new(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::task::{FailureKind, TaskId};
    use pretty_assertions::assert_eq;

    fn ctx() -> TaskContext {
        TaskContext {
            task_id: TaskId::from("t"),
            snapshot_id: "snap".to_string(),
            file_name: "doc.json".to_string(),
        }
    }

    const TWO_RESOURCES: &str = r#"{"resourceMetrics":[
        {"scopeMetrics":[{"metrics":[{"name":"a","gauge":{"dataPoints":[{"asDouble":1}]}}]}]},
        {"scopeMetrics":[{"metrics":[{"name":"b","gauge":{"dataPoints":[{"asDouble":2}]}}]}]}
    ]}"#;

    fn run(raw: &str, token: &CancellationToken) -> (TaskOutcome, Vec<(u8, ProgressStage)>) {
        let mut seen = Vec::new();
        let outcome = run_pipeline(&OtlpJsonParser, &ctx(), raw, token, &mut |p, s| {
            seen.push((p, s))
        });
        (outcome, seen)
    }

    #[test]
    fn test_stages_in_order() {
        let (outcome, seen) = run(TWO_RESOURCES, &CancellationToken::new());
        assert!(outcome.is_success());
        assert_eq!(
            seen,
            vec![
                (0, ProgressStage::Parsing),
                (33, ProgressStage::Parsing),
                (50, ProgressStage::Mapping),
                (69, ProgressStage::Mapping),
                (89, ProgressStage::Mapping),
                (90, ProgressStage::Processing),
                (100, ProgressStage::Processing),
            ]
        );
        let percents: Vec<u8> = seen.iter().map(|(p, _)| *p).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_malformed_input() {
        let (outcome, seen) = run("{", &CancellationToken::new());
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::MalformedInput);
        assert!(failure.message.starts_with("JSON parsing failed"));
        assert_eq!(failure.task_id, TaskId::from("t"));
        assert_eq!(seen, vec![(0, ProgressStage::Parsing)]);
    }

    #[test]
    fn test_unsupported_metric_is_mapping_failure() {
        let raw = r#"{"resourceMetrics":[{"scopeMetrics":[{"metrics":[{"name":"s","summary":{}}]}]}]}"#;
        let (outcome, _) = run(raw, &CancellationToken::new());
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::UnsupportedMetricShape);
        assert!(failure.message.starts_with("OTLP mapping failed"));
    }

    #[test]
    fn test_precanceled_token() {
        let token = CancellationToken::new();
        token.cancel();
        let (outcome, seen) = run(TWO_RESOURCES, &token);
        assert!(outcome.is_canceled());
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_cancel_during_mapping() {
        let token = CancellationToken::new();
        let mut seen = Vec::new();
        let outcome = run_pipeline(&OtlpJsonParser, &ctx(), TWO_RESOURCES, &token, &mut |p, s| {
            seen.push((p, s));
            if s == ProgressStage::Mapping && p > 50 {
                token.cancel();
            }
        });
        assert!(outcome.is_canceled());
        assert_eq!(seen.last(), Some(&(69, ProgressStage::Mapping)));
    }

    #[test]
    fn test_mapping_percent_bounds() {
        assert_eq!(mapping_percent(0, 0), 89);
        assert_eq!(mapping_percent(1, 4), 59);
        assert_eq!(mapping_percent(4, 4), 89);
        assert_eq!(mapping_percent(9, 4), 89);
    }
}
