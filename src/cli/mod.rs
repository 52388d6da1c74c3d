//! Command-line interface for Intellimetric.
//!
//! Loads one or more OTLP/JSON export files through the parser pool and
//! prints per-metric series counts, the attribute ranking and, with
//! `--drop`, the projected count after removing an attribute.

use crate::cardinality::{MetricInfoCache, ProcessMetricOptions, ProcessedMetricInfo};
use crate::core::config::{ConfigBuilder, LoggingConfig};
use crate::core::{Config, IntellimetricError, Result};
use crate::input;
use crate::pool::{ParserPool, PoolEvent, TaskOutcome};
use clap::Parser;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Inspect OTLP metric exports and simulate cardinality reduction
#[derive(Parser, Debug)]
#[command(name = "intellimetric")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// OTLP/JSON export files to load
    #[arg(required_unless_present = "check_config")]
    pub files: Vec<PathBuf>,

    /// Only report this metric
    #[arg(short, long)]
    pub metric: Option<String>,

    /// Attribute key to drop when projecting series counts
    #[arg(long = "drop", value_name = "KEY")]
    pub drop_key: Option<String>,

    /// Parse on the calling thread instead of background units
    #[arg(long)]
    pub sync: bool,

    /// Number of background units
    #[arg(long, env = "INTELLIMETRIC_UNITS")]
    pub units: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Configuration file path (default: ~/.config/intellimetric/config.yaml)
    #[arg(short, long, env = "INTELLIMETRIC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "INTELLIMETRIC_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("intellimetric").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/intellimetric/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(IntellimetricError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if self.sync {
            builder = builder.parallel(false);
        }
        if let Some(units) = self.units {
            builder = builder.units(units);
        }
        builder.debug(self.debug).build()
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self, logging: &LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level = std::env::var("INTELLIMETRIC_LOG_LEVEL")
            .unwrap_or_else(|_| logging.level.as_str().to_string());
        let log_level = if self.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if logging.structured {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(false)
                .compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| IntellimetricError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Report for one input file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub snapshot_id: Option<String>,
    pub status: FileStatus,
    pub error: Option<String>,
    pub metrics: Vec<ProcessedMetricInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Failed,
    Canceled,
}

/// Complete CLI output
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub drop_key: Option<String>,
    pub files: Vec<FileReport>,
}

/// Builds the report for loaded files.
///
/// `outcomes` pairs each file name with its load result. Returns
/// `MetricNotFound` when `metric` was requested and no snapshot has it.
pub fn build_report(
    outcomes: Vec<(String, Result<TaskOutcome>)>,
    metric: Option<&str>,
    drop_key: Option<&str>,
    cache: &MetricInfoCache,
) -> Result<Report> {
    let options = ProcessMetricOptions {
        simulate_drop_attribute_key: drop_key.map(str::to_string),
    };
    let mut metric_seen = false;
    let mut files = Vec::with_capacity(outcomes.len());

    for (file_name, outcome) in outcomes {
        let report = match outcome {
            Ok(TaskOutcome::Success(snapshot)) => {
                let names: Vec<&str> = match metric {
                    Some(name) => vec![name],
                    None => snapshot.metric_names(),
                };
                let metrics: Vec<ProcessedMetricInfo> = names
                    .into_iter()
                    .filter_map(|name| cache.get_processed_metric_info(&snapshot, name, &options))
                    .map(|info| (*info).clone())
                    .collect();
                metric_seen |= !metrics.is_empty();
                cache.evict_snapshot(&snapshot.id);

                FileReport {
                    file_name,
                    snapshot_id: Some(snapshot.id.clone()),
                    status: FileStatus::Ok,
                    error: None,
                    metrics,
                }
            },
            Ok(TaskOutcome::Failure(failure)) => FileReport {
                file_name,
                snapshot_id: Some(failure.snapshot_id.clone()),
                status: FileStatus::Failed,
                error: Some(failure.message.clone()),
                metrics: Vec::new(),
            },
            Ok(TaskOutcome::Canceled) => FileReport {
                file_name,
                snapshot_id: None,
                status: FileStatus::Canceled,
                error: None,
                metrics: Vec::new(),
            },
            Err(e) => FileReport {
                file_name,
                snapshot_id: None,
                status: FileStatus::Failed,
                error: Some(e.to_string()),
                metrics: Vec::new(),
            },
        };
        files.push(report);
    }

    if let Some(name) = metric {
        let any_loaded = files.iter().any(|f| f.status == FileStatus::Ok);
        if any_loaded && !metric_seen {
            return Err(IntellimetricError::MetricNotFound(name.to_string()));
        }
    }

    Ok(Report {
        drop_key: drop_key.map(str::to_string),
        files,
    })
}

/// Renders the report as a plain text table.
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();

    for file in &report.files {
        match file.status {
            FileStatus::Ok => {
                let _ = writeln!(
                    out,
                    "{} (snapshot {})",
                    file.file_name,
                    file.snapshot_id.as_deref().unwrap_or("-")
                );
            },
            FileStatus::Failed => {
                let _ = writeln!(
                    out,
                    "{} FAILED: {}",
                    file.file_name,
                    file.error.as_deref().unwrap_or("unknown error")
                );
                continue;
            },
            FileStatus::Canceled => {
                let _ = writeln!(out, "{} CANCELED", file.file_name);
                continue;
            },
        }

        for info in &file.metrics {
            let card = &info.cardinality;
            let _ = writeln!(
                out,
                "  {:<40} {:<10} series={}",
                info.definition.name,
                format!("{:?}", info.definition.instrument_type),
                card.base_series_count
            );
            if !card.attr_rank.is_empty() {
                let ranked: Vec<String> = card
                    .attr_rank
                    .iter()
                    .map(|key| format!("{}={}", key, card.attr_uniq.get(key).copied().unwrap_or(0)))
                    .collect();
                let _ = writeln!(out, "    attributes: {}", ranked.join(" "));
            }
            if let Some(key) = &report.drop_key {
                let _ = writeln!(
                    out,
                    "    drop {}: {} -> {} series",
                    key, card.base_series_count, card.series_count
                );
            }
        }
    }

    out
}

/// Execute the Intellimetric CLI.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config.logging)?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Parallel units: {}", if config.pool.parallel { config.pool.resolved_units() } else { 0 });
        println!("  Progress ping above: {} bytes", config.pool.progress_ping_threshold_bytes);
        println!("  Max file size: {} bytes", config.input.max_file_bytes);
        println!("  Log level: {}", config.logging.level.as_str());
        return Ok(());
    }

    let pool = ParserPool::new(config.pool.clone());
    let mut events = pool.subscribe();
    let progress_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PoolEvent::TaskProgress { file_name, percent, stage, .. }) => {
                    tracing::debug!(file_name = %file_name, percent, stage = %stage, "Loading");
                },
                Ok(PoolEvent::TaskFailed { file_name, message, .. }) => {
                    tracing::warn!(file_name = %file_name, error = %message, "Failed to load file");
                },
                Ok(_) => {},
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress logger lagged");
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut outcomes: Vec<(String, Result<TaskOutcome>)> = Vec::with_capacity(cli.files.len());
    let mut pending = Vec::new();
    for path in &cli.files {
        let name = path.display().to_string();
        match input::load_task(path, &config.input).await {
            Ok(task) => pending.push((name, pool.dispatch(task))),
            Err(e) => {
                tracing::warn!(file_name = %name, error = %e, "Skipping input file");
                outcomes.push((name, Err(e)));
            },
        }
    }

    let (names, handles): (Vec<String>, Vec<_>) = pending.into_iter().unzip();
    let results = futures::future::join_all(handles.into_iter().map(|h| h.outcome())).await;
    outcomes.extend(names.into_iter().zip(results.into_iter().map(Ok)));

    tracing::info!(stats = ?pool.stats(), "All files processed");
    pool.terminate_all();
    drop(pool);
    progress_logger.abort();

    let cache = MetricInfoCache::new();
    let report = build_report(outcomes, cli.metric.as_deref(), cli.drop_key.as_deref(), &cache)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&report));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{map_to_parsed_snapshot, parse_document};
    use crate::pool::{FailureKind, ParserFailure, TaskId};
    use std::io::Write;
    use std::sync::Arc;

    const DOC: &str = r#"{"resourceMetrics":[{
        "resource":{"attributes":[{"key":"host.name","value":{"stringValue":"h1"}}]},
        "scopeMetrics":[{"metrics":[{"name":"http.requests","sum":{"aggregationTemporality":2,"dataPoints":[
            {"asInt":"1","attributes":[{"key":"pod","value":{"stringValue":"a"}}]},
            {"asInt":"1","attributes":[{"key":"pod","value":{"stringValue":"b"}}]}
        ]}}]}]
    }]}"#;

    fn cli() -> Cli {
        Cli {
            files: Vec::new(),
            metric: None,
            drop_key: None,
            sync: false,
            units: None,
            json: false,
            config: None,
            debug: false,
            check_config: false,
        }
    }

    fn success() -> TaskOutcome {
        let raw = parse_document(DOC).unwrap();
        TaskOutcome::Success(Arc::new(map_to_parsed_snapshot(&raw, "snap-1", "ok.json").unwrap()))
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "intellimetric",
            "a.json",
            "b.json",
            "--drop",
            "pod",
            "--sync",
            "--units",
            "2",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.drop_key.as_deref(), Some("pod"));
        assert!(cli.sync);
        assert_eq!(cli.units, Some(2));
        assert!(cli.json);
    }

    #[test]
    fn test_cli_requires_files() {
        assert!(Cli::try_parse_from(["intellimetric"]).is_err());
        assert!(Cli::try_parse_from(["intellimetric", "--check-config"]).is_ok());
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool:\n  max_units: 8\n  units: 6\nlogging:\n  level: debug").unwrap();

        let mut cli = cli();
        cli.config = Some(file.path().to_path_buf());
        cli.sync = true;
        let config = cli.load_config().await.unwrap();
        assert_eq!(config.pool.units, Some(6));
        assert!(!config.pool.parallel);
    }

    #[tokio::test]
    async fn test_missing_explicit_config_is_error() {
        let mut cli = cli();
        cli.config = Some(PathBuf::from("/nonexistent/intellimetric.yaml"));
        assert!(cli.load_config().await.is_err());
    }

    #[test]
    fn test_report_with_drop() {
        let failure = ParserFailure {
            snapshot_id: "snap-2".to_string(),
            file_name: "bad.json".to_string(),
            task_id: TaskId::from("t"),
            kind: FailureKind::MalformedInput,
            message: "JSON parsing failed: EOF".to_string(),
            detail: None,
        };
        let outcomes = vec![
            ("ok.json".to_string(), Ok(success())),
            ("bad.json".to_string(), Ok(TaskOutcome::Failure(failure))),
        ];

        let cache = MetricInfoCache::new();
        let report = build_report(outcomes, None, Some("pod"), &cache).unwrap();
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0].status, FileStatus::Ok);
        assert_eq!(report.files[0].metrics[0].cardinality.series_count, 1);
        assert_eq!(report.files[0].metrics[0].cardinality.base_series_count, 2);
        assert_eq!(report.files[1].status, FileStatus::Failed);
        assert!(cache.is_empty());

        let text = render_text(&report);
        assert!(text.contains("http.requests"));
        assert!(text.contains("attributes: pod=2 host.name=1"));
        assert!(text.contains("drop pod: 2 -> 1 series"));
        assert!(text.contains("bad.json FAILED: JSON parsing failed: EOF"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["files"][0]["status"], "ok");
        assert_eq!(json["files"][0]["metrics"][0]["cardinality"]["attr_rank"][0], "pod");
    }

    #[test]
    fn test_report_unknown_metric() {
        let cache = MetricInfoCache::new();
        let err = build_report(vec![("ok.json".to_string(), Ok(success()))], Some("nope"), None, &cache)
            .unwrap_err();
        assert!(matches!(err, IntellimetricError::MetricNotFound(ref m) if m == "nope"));
    }
}
