//! OpenAI-compatible `/v1/chat/completions` backend (llama.cpp server and friends).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use duoconf::BackendConfig;

use super::{base_url_for, http_client, send_json, BackendError, ChatBackend, CompletionRequest, ModelInfo, Sampling};

pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    sampling: Sampling,
}

impl OpenAiCompatBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: http_client(config)?,
            base_url: base_url_for(config),
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            sampling: Sampling::from_config(config),
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn build_request<'a>(&self, request: &CompletionRequest<'a>) -> ChatCompletionRequest<'a> {
        let persona = request
            .system_prompt
            .filter(|p| !p.trim().is_empty())
            .map(|content| WireMessage {
                role: "system",
                content,
            });

        let messages = persona
            .into_iter()
            .chain(request.messages.iter().map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            }))
            .collect();

        ChatCompletionRequest {
            model: request.model,
            messages,
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            max_tokens: self.sampling.max_tokens,
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai"
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            llm.backend = "openai",
            llm.model = %request.model,
            llm.messages = request.messages.len(),
        )
    )]
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, BackendError> {
        let body = self.build_request(request);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response: ChatCompletionResponse =
            send_json(self.authorized(self.client.post(url)).json(&body)).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(BackendError::EmptyReply)
    }

    #[tracing::instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let url = format!("{}/v1/models", self.base_url);
        let list: ModelList = send_json(self.authorized(self.client.get(url))).await?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.id.clone(),
                id: m.id,
                display_name: None,
                supports_generation: true,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duochat::ChatMessage;
    use duoconf::BackendKind;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config(base_url: &str) -> BackendConfig {
        let mut config = BackendConfig {
            kind: BackendKind::OpenAi,
            base_url: base_url.to_string(),
            default_model: String::new(),
            ..BackendConfig::default()
        };
        config.apply_kind_defaults();
        config
    }

    #[tokio::test]
    async fn test_complete_sends_persona_and_sampling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_json(json!({
                "model": "local-model",
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "hello" }
                ],
                "temperature": 0.9,
                "top_p": 0.95,
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "hi" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAiCompatBackend::new(&config(&server.uri())).unwrap();
        let messages = vec![ChatMessage::user("hello")];
        let request = CompletionRequest {
            model: "local-model",
            system_prompt: Some("Be brief."),
            messages: &messages,
        };
        assert_eq!(backend.complete(&request).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_no_auth_header_without_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(|req: &Request| {
                let status = if req.headers.contains_key("authorization") { 400 } else { 200 };
                ResponseTemplate::new(status).set_body_json(json!({
                    "choices": [{ "message": { "content": "ok" } }]
                }))
            })
            .mount(&server)
            .await;

        let backend = OpenAiCompatBackend::new(&config(&server.uri())).unwrap();
        let messages = vec![ChatMessage::user("hello")];
        let text = backend
            .complete(&CompletionRequest::bare("local-model", &messages))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_bearer_auth_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("authorization", "Bearer sk-local"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{ "id": "qwen2.5-7b", "object": "model" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config(&server.uri());
        config.api_key = Some("sk-local".to_string());
        let backend = OpenAiCompatBackend::new(&config).unwrap();

        let models = backend.list_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "qwen2.5-7b");
        assert!(models[0].supports_generation);
    }

    #[tokio::test]
    async fn test_no_choices_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let backend = OpenAiCompatBackend::new(&config(&server.uri())).unwrap();
        let messages = vec![ChatMessage::user("hello")];
        let err = backend
            .complete(&CompletionRequest::bare("local-model", &messages))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmptyReply));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
            .mount(&server)
            .await;

        let backend = OpenAiCompatBackend::new(&config(&server.uri())).unwrap();
        let messages = vec![ChatMessage::user("hello")];
        let err = backend
            .complete(&CompletionRequest::bare("local-model", &messages))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
        assert!(!err.is_retryable());
    }
}
