//! Layered configuration loading for duologue.
//!
//! Configuration is split by concern:
//!
//! - **Backend** (`BackendConfig`): which chat API to talk to, the credential,
//!   and the model identifiers.
//! - **Dialogue** (`ConversationConfig`, `ConsentConfig`, `SummaryConfig`):
//!   the script of the run - opening prompt, personas, round limit, retry policy.
//! - **Infrastructure** (`OutputConfig`, `TelemetryConfig`): where files land
//!   and how logs are emitted.
//!
//! # Usage
//!
//! ```rust,no_run
//! use duoconf::DuoConfig;
//!
//! let config = DuoConfig::load().expect("Failed to load config");
//! println!("Model: {}", config.backend.default_model);
//! println!("Rounds: {}", config.conversation.rounds);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/duologue/config.toml` (system)
//! 2. `~/.config/duologue/config.toml` (user)
//! 3. `./duologue.toml` (local override, or the path given on the command line)
//! 4. Environment variables (`DUOLOGUE_*`, plus the backend's API key variable)
//!
//! # Example Config
//!
//! ```toml
//! [backend]
//! kind = "openai"
//! base_url = "http://127.0.0.1:1234"
//! default_model = "local-model"
//!
//! [conversation]
//! rounds = 10
//!
//! [conversation.speaker_b]
//! system_prompt = "You are a skeptical philosopher."
//!
//! [output]
//! dir = "runs/today"
//! ```

pub mod backend;
pub mod dialogue;
pub mod infra;
pub mod loader;

pub use backend::{BackendConfig, BackendKind};
pub use dialogue::{ConsentConfig, ConversationConfig, FailurePolicy, SpeakerConfig, SummaryConfig};
pub use infra::{OutputConfig, TelemetryConfig};
pub use loader::{ConfigSources, discover_config_files_with_override};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete duologue configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DuoConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub consent: ConsentConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl DuoConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/duologue/config.toml`
    /// 3. `~/.config/duologue/config.toml`
    /// 4. `./duologue.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./duologue.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::table_to_config(merged, sources.files.last())?;
        loader::apply_env_overrides(&mut config, &mut sources, std::env::vars());
        config.validate()?;

        Ok((config, sources))
    }

    /// Parse a single TOML document on top of the compiled defaults.
    ///
    /// No files are discovered and no environment is consulted.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let path = PathBuf::from("<inline>");
        let table = loader::parse_table(contents, &path)?;
        let config = loader::table_to_config(table, Some(&path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversation.rounds == 0 {
            return Err(ConfigError::Invalid(
                "conversation.rounds must be at least 1".to_string(),
            ));
        }
        if self.backend.default_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "backend.default_model must not be empty".to_string(),
            ));
        }
        if self.conversation.initial_prompt.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "conversation.initial_prompt must not be empty".to_string(),
            ));
        }
        if self.consent.enabled && self.consent.refusal_repeats == 0 {
            return Err(ConfigError::Invalid(
                "consent.refusal_repeats must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize config to TOML, with the API key redacted.
    pub fn to_toml(&self) -> String {
        let mut redacted = self.clone();
        if redacted.backend.api_key.is_some() {
            redacted.backend.api_key = Some("<redacted>".to_string());
        }

        let body = toml::to_string_pretty(&redacted).unwrap_or_default();
        format!("# duologue configuration\n\n{}", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DuoConfig::default();
        assert_eq!(config.backend.kind, BackendKind::Gemini);
        assert_eq!(config.backend.default_model, "gemini-2.5-flash-lite");
        assert_eq!(config.conversation.rounds, 100);
        assert_eq!(config.output.log_file, "conversation_log.md");
        assert_eq!(config.output.summary_file, "conversation_summary.md");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_redacts_key() {
        let mut config = DuoConfig::default();
        config.backend.api_key = Some("super-secret".to_string());
        let toml = config.to_toml();
        assert!(toml.contains("[backend]"));
        assert!(toml.contains("[conversation]"));
        assert!(toml.contains("<redacted>"));
        assert!(!toml.contains("super-secret"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let config = DuoConfig::default();
        let reparsed = DuoConfig::from_toml_str(&config.to_toml()).unwrap();
        assert_eq!(reparsed.conversation.rounds, config.conversation.rounds);
        assert_eq!(reparsed.backend.base_url, config.backend.base_url);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let err = DuoConfig::from_toml_str("[conversation]\nrounds = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_with_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[conversation]\nrounds = 7\n").unwrap();

        let (config, sources) = DuoConfig::load_with_sources_from(Some(&path)).unwrap();
        assert!(sources.files.contains(&path));
        // DUOLOGUE_ROUNDS in the environment would win, so only check when unset
        if std::env::var("DUOLOGUE_ROUNDS").is_err() {
            assert_eq!(config.conversation.rounds, 7);
        }
    }
}
