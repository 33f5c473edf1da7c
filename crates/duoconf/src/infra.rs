//! Infrastructure configuration - output files and telemetry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the transcript and summary are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory both files are written into. Created if missing.
    /// Default: output
    #[serde(default = "OutputConfig::default_dir")]
    pub dir: PathBuf,

    /// Default: conversation_log.md
    #[serde(default = "OutputConfig::default_log_file")]
    pub log_file: String,

    /// Default: conversation_summary.md
    #[serde(default = "OutputConfig::default_summary_file")]
    pub summary_file: String,
}

impl OutputConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("output")
    }

    fn default_log_file() -> String {
        "conversation_log.md".to_string()
    }

    fn default_summary_file() -> String {
        "conversation_summary.md".to_string()
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(&self.log_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(&self.summary_file)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            log_file: Self::default_log_file(),
            summary_file: Self::default_summary_file(),
        }
    }
}

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint. Spans are only exported when this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths() {
        let output = OutputConfig {
            dir: PathBuf::from("/tmp/run"),
            ..OutputConfig::default()
        };
        assert_eq!(output.log_path(), PathBuf::from("/tmp/run/conversation_log.md"));
        assert_eq!(
            output.summary_path(),
            PathBuf::from("/tmp/run/conversation_summary.md")
        );
    }
}
