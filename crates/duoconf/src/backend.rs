//! Chat backend configuration - which API, which credential, which models.

use serde::{Deserialize, Serialize};

/// Wire protocol spoken by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Gemini `generateContent` API.
    Gemini,
    /// OpenAI-compatible `/v1/chat/completions` (llama.cpp server, etc).
    #[serde(alias = "llamacpp", alias = "openai-compatible")]
    OpenAi,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::OpenAi => "openai",
        }
    }

    /// Base URL used when none is configured.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "https://generativelanguage.googleapis.com",
            BackendKind::OpenAi => "http://127.0.0.1:1234",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini-2.5-flash-lite",
            // llama.cpp does not validate the model name
            BackendKind::OpenAi => "local-model",
        }
    }

    /// Environment variable the credential is read from when none is configured.
    /// A local server needs no key, so `openai` reads none.
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            BackendKind::Gemini => Some("GEMINI_API_KEY"),
            BackendKind::OpenAi => None,
        }
    }

    /// Sampling filled in when none is configured, as `(temperature, top_p)`.
    pub fn default_sampling(&self) -> (Option<f32>, Option<f32>) {
        match self {
            BackendKind::Gemini => (None, None),
            // llama.cpp sampling used by the local variant
            BackendKind::OpenAi => (Some(0.9), Some(0.95)),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "openai" | "llamacpp" | "openai-compatible" => Ok(BackendKind::OpenAi),
            other => Err(format!("Unknown backend kind: {}", other)),
        }
    }
}

/// Configuration for the chat backend both speakers share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Wire protocol.
    /// Default: gemini
    #[serde(default = "BackendConfig::default_kind")]
    pub kind: BackendKind,

    /// Base URL of the API, without the versioned path.
    /// Default: depends on `kind`
    #[serde(default)]
    pub base_url: String,

    /// API key. Usually supplied through the environment rather than a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable the API key is read from.
    /// Default: GEMINI_API_KEY for gemini, none for openai
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Model both speakers use unless they override it.
    #[serde(default)]
    pub default_model: String,

    /// Model to use for the final summary (can be same or smaller)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Maximum tokens for responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Per-request timeout. Unset leaves the HTTP client's default in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// User-Agent header sent with every request.
    #[serde(default = "BackendConfig::default_user_agent")]
    pub user_agent: String,
}

impl BackendConfig {
    fn default_kind() -> BackendKind {
        BackendKind::Gemini
    }

    fn default_user_agent() -> String {
        format!("duologue/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Fill the settings that depend on `kind` where they were left unset.
    pub fn apply_kind_defaults(&mut self) {
        if self.base_url.trim().is_empty() {
            self.base_url = self.kind.default_base_url().to_string();
        }
        if self.default_model.trim().is_empty() {
            self.default_model = self.kind.default_model().to_string();
        }
        if self.api_key_env.is_none() {
            self.api_key_env = self.kind.default_api_key_env().map(str::to_string);
        }
        let (temperature, top_p) = self.kind.default_sampling();
        if self.temperature.is_none() {
            self.temperature = temperature;
        }
        if self.top_p.is_none() {
            self.top_p = top_p;
        }
    }

    /// Change `kind`, dropping every setting that still holds the previous
    /// kind's default so the new kind's defaults take its place.
    pub fn switch_kind(&mut self, kind: BackendKind) {
        let previous = self.kind;
        if kind == previous {
            return;
        }

        if self.base_url == previous.default_base_url() {
            self.base_url.clear();
        }
        if self.default_model == previous.default_model() {
            self.default_model.clear();
        }
        if self.api_key_env.as_deref() == previous.default_api_key_env() {
            self.api_key_env = None;
        }
        let (temperature, top_p) = previous.default_sampling();
        if temperature.is_some() && self.temperature == temperature {
            self.temperature = None;
        }
        if top_p.is_some() && self.top_p == top_p {
            self.top_p = None;
        }

        self.kind = kind;
        self.apply_kind_defaults();
    }

    /// Get the model to use for summaries
    pub fn summary_model(&self) -> &str {
        self.summary_model.as_deref().unwrap_or(&self.default_model)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        let mut config = Self {
            kind: Self::default_kind(),
            base_url: String::new(),
            api_key: None,
            api_key_env: None,
            default_model: String::new(),
            summary_model: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            timeout_secs: None,
            user_agent: Self::default_user_agent(),
        };
        config.apply_kind_defaults();
        config
    }
}
