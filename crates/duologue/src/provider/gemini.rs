//! Google Gemini `generateContent` backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use duochat::{ChatMessage, Role};
use duoconf::BackendConfig;

use super::{base_url_for, http_client, send_json, BackendError, ChatBackend, CompletionRequest, ModelInfo, Sampling};

const API_VERSION: &str = "v1beta";
const GENERATE_METHOD: &str = "generateContent";
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    sampling: Sampling,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig, api_key: &str) -> Result<Self, BackendError> {
        Ok(Self {
            client: http_client(config)?,
            base_url: base_url_for(config),
            api_key: api_key.to_string(),
            sampling: Sampling::from_config(config),
        })
    }

    fn generate_url(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!(
            "{}/{}/models/{}:{}",
            self.base_url, API_VERSION, model, GENERATE_METHOD
        )
    }

    fn build_request<'a>(&self, request: &CompletionRequest<'a>) -> GenerateContentRequest<'a> {
        let contents = request
            .messages
            .iter()
            .map(|m| Content {
                role: gemini_role(m),
                parts: vec![Part { text: &m.content }],
            })
            .collect();

        let system_instruction = request
            .system_prompt
            .filter(|p| !p.trim().is_empty())
            .map(|text| SystemInstruction {
                parts: vec![Part { text }],
            });

        let generation_config = (!self.sampling.is_empty()).then(|| GenerationConfig {
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            max_output_tokens: self.sampling.max_tokens,
        });

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config,
        }
    }
}

/// Gemini only knows two roles: the model and everyone else.
fn gemini_role(message: &ChatMessage) -> &'static str {
    match message.role {
        Role::Assistant => "model",
        Role::System | Role::User => "user",
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, BackendError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(BackendError::Blocked {
                reason: self.prompt_feedback.and_then(|f| f.block_reason),
            });
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if !text.trim().is_empty() {
            return Ok(text);
        }

        match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII")) => {
                Err(BackendError::Blocked {
                    reason: Some(reason.to_string()),
                })
            }
            _ => Err(BackendError::EmptyReply),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<GeminiModel>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl From<GeminiModel> for ModelInfo {
    fn from(model: GeminiModel) -> Self {
        let id = model
            .name
            .strip_prefix("models/")
            .unwrap_or(&model.name)
            .to_string();
        let supports_generation = model
            .supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_METHOD);

        ModelInfo {
            name: model.name,
            id,
            display_name: model.display_name,
            supports_generation,
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            llm.backend = "gemini",
            llm.model = %request.model,
            llm.messages = request.messages.len(),
        )
    )]
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, BackendError> {
        let body = self.build_request(request);

        let response: GenerateContentResponse = send_json(
            self.client
                .post(self.generate_url(request.model))
                .header(API_KEY_HEADER, &self.api_key)
                .json(&body),
        )
        .await?;

        let text = response.into_text()?;
        tracing::debug!(chars = text.len(), "Gemini reply received");
        Ok(text)
    }

    #[tracing::instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let url = format!("{}/{}/models", self.base_url, API_VERSION);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).header(API_KEY_HEADER, &self.api_key);
            if let Some(token) = page_token.take() {
                request = request.query(&[("pageToken", token)]);
            }

            let page: ListModelsResponse = send_json(request).await?;
            models.extend(page.models.into_iter().map(ModelInfo::from));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }
}
