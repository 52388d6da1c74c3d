use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntellimetricError {
    #[error("JSON parsing failed: {0}")]
    MalformedInput(String),

    #[error("Unsupported OTLP metric shape: {metric}")]
    UnsupportedMetricShape { metric: String },

    #[error("Worker crashed: {0}")]
    UnitFault(String),

    #[error("Task canceled")]
    Canceled,

    #[error("Pool terminated")]
    PoolTerminated,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input file ({code}): {message}")]
    InvalidFile { code: &'static str, message: String },

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Intellimetric operations
pub type Result<T> = std::result::Result<T, IntellimetricError>;

impl IntellimetricError {
    /// Creates a new malformed input error
    pub fn malformed_input<S: Into<String>>(msg: S) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Creates a new unsupported metric shape error
    pub fn unsupported_metric<S: Into<String>>(metric: S) -> Self {
        Self::UnsupportedMetricShape {
            metric: metric.into(),
        }
    }

    /// Creates a new unit fault error
    pub fn unit_fault<S: Into<String>>(msg: S) -> Self {
        Self::UnitFault(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true if the caller can keep using the pool after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Canceled | Self::PoolTerminated | Self::Config(_))
    }

    /// Returns true for user-initiated aborts that should not be surfaced as failures
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Canceled | Self::PoolTerminated)
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) | Self::Serialization(_) => "parse",
            Self::UnsupportedMetricShape { .. } => "mapping",
            Self::UnitFault(_) => "unit",
            Self::Canceled | Self::PoolTerminated => "abort",
            Self::Config(_) => "config",
            Self::InvalidFile { .. } => "validation",
            Self::MetricNotFound(_) => "not_found",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = IntellimetricError::malformed_input("EOF while parsing an object");
        assert_eq!(err.to_string(), "JSON parsing failed: EOF while parsing an object");
        assert_eq!(err.category(), "parse");
    }

    #[test]
    fn test_unsupported_metric_message() {
        let err = IntellimetricError::unsupported_metric("jvm.summary");
        assert_eq!(err.to_string(), "Unsupported OTLP metric shape: jvm.summary");
        assert_eq!(err.category(), "mapping");
    }

    #[test]
    fn test_abort_errors() {
        assert!(IntellimetricError::Canceled.is_abort());
        assert!(IntellimetricError::PoolTerminated.is_abort());
        assert!(!IntellimetricError::unit_fault("boom").is_abort());
        assert!(IntellimetricError::unit_fault("boom").is_recoverable());
        assert!(!IntellimetricError::Canceled.is_recoverable());
    }

    #[test]
    fn test_invalid_file_error() {
        let err = IntellimetricError::InvalidFile {
            code: "FILE_TOO_LARGE",
            message: "File size 10 bytes exceeds limit of 5".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid input file (FILE_TOO_LARGE): File size 10 bytes exceeds limit of 5"
        );
        assert_eq!(err.category(), "validation");
    }
}
