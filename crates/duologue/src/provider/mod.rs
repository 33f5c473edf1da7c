//! Chat backends both speakers talk through.
//!
//! [`ChatBackend`] is the seam between the turn loop and the wire: the loop
//! hands over a model id, an optional persona and a rolling history, and gets
//! back the reply text. Two implementations ship:
//!
//! - [`GeminiBackend`] for Google's `generateContent` API
//! - [`OpenAiCompatBackend`] for `/v1/chat/completions` servers such as llama.cpp

mod gemini;
mod openai;

pub use gemini::GeminiBackend;
pub use openai::OpenAiCompatBackend;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use duochat::ChatMessage;
use duoconf::{BackendConfig, BackendKind};

/// One call's worth of input, borrowed from a session.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    /// Persona, sent the way the backend expects system instructions
    pub system_prompt: Option<&'a str>,
    pub messages: &'a [ChatMessage],
}

impl<'a> CompletionRequest<'a> {
    /// A request with no persona, for one-off prompts
    pub fn bare(model: &'a str, messages: &'a [ChatMessage]) -> Self {
        Self {
            model,
            system_prompt: None,
            messages,
        }
    }
}

/// A model the credential can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Name as the API reports it (`models/gemini-2.5-flash`)
    pub name: String,
    /// Identifier to put in the config (`gemini-2.5-flash`)
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the model can be used for chat replies
    pub supports_generation: bool,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Response withheld by safety filters (reason: {})", .reason.as_deref().unwrap_or("unspecified"))]
    Blocked { reason: Option<String> },

    #[error("Model returned an empty reply")]
    EmptyReply,
}

impl BackendError {
    /// Transient failures worth another attempt: network trouble,
    /// request timeout, rate limiting and server-side errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            BackendError::Decode(_) | BackendError::Blocked { .. } | BackendError::EmptyReply => {
                false
            }
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Produce the next reply for the given history.
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, BackendError>;

    /// List the models the configured credential can reach.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError>;
}

/// Sampling knobs shared by both backends.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sampling {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Sampling {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.max_tokens.is_none()
    }
}

/// Build the backend named by `config.kind`.
pub fn backend_from_config(config: &BackendConfig) -> Result<Arc<dyn ChatBackend>> {
    match config.kind {
        BackendKind::Gemini => {
            let api_key = config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| match config.api_key_env.as_deref() {
                    Some(var) => anyhow!(
                        "No API key for the Gemini backend: set {} (or DUOLOGUE_API_KEY)",
                        var
                    ),
                    None => anyhow!("No API key for the Gemini backend: set DUOLOGUE_API_KEY"),
                })?;
            Ok(Arc::new(GeminiBackend::new(config, api_key)?))
        }
        BackendKind::OpenAi => Ok(Arc::new(OpenAiCompatBackend::new(config)?)),
    }
}

fn http_client(config: &BackendConfig) -> Result<reqwest::Client, BackendError> {
    let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().map_err(BackendError::Transport)
}

fn base_url_for(config: &BackendConfig) -> String {
    let base_url = if config.base_url.trim().is_empty() {
        config.kind.default_base_url()
    } else {
        config.base_url.trim()
    };
    base_url.trim_end_matches('/').to_string()
}

/// Send a request and decode a JSON body, mapping every failure to a
/// [`BackendError`] variant.
async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, BackendError> {
    let response = request.send().await.map_err(BackendError::Transport)?;

    let status = response.status();
    let body = response.text().await.map_err(BackendError::Transport)?;

    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> BackendError {
        BackendError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(status(408).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());

        assert!(!status(400).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn test_terminal_errors() {
        assert!(!BackendError::Blocked { reason: None }.is_retryable());
        assert!(!BackendError::EmptyReply.is_retryable());
        assert!(!BackendError::Decode("eof".to_string()).is_retryable());
    }

    #[test]
    fn test_blocked_message() {
        let err = BackendError::Blocked {
            reason: Some("SAFETY".to_string()),
        };
        assert!(err.to_string().contains("SAFETY"));

        let err = BackendError::Blocked { reason: None };
        assert!(err.to_string().contains("unspecified"));
    }

    #[test]
    fn test_gemini_requires_key() {
        let config = BackendConfig {
            api_key: None,
            ..BackendConfig::default()
        };
        let err = backend_from_config(&config).err().unwrap();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let config = BackendConfig {
            api_key: Some("   ".to_string()),
            ..BackendConfig::default()
        };
        assert!(backend_from_config(&config).is_err());
    }

    #[test]
    fn test_openai_needs_no_key() {
        let config = BackendConfig {
            kind: BackendKind::OpenAi,
            base_url: String::new(),
            default_model: String::new(),
            ..BackendConfig::default()
        };
        let backend = backend_from_config(&config).unwrap();
        assert_eq!(backend.name(), "openai");
    }

    #[test]
    fn test_base_url_for() {
        let mut config = BackendConfig {
            kind: BackendKind::OpenAi,
            base_url: "http://localhost:1234/".to_string(),
            ..BackendConfig::default()
        };
        assert_eq!(base_url_for(&config), "http://localhost:1234");

        config.base_url = String::new();
        assert_eq!(base_url_for(&config), "http://127.0.0.1:1234");
    }
}
