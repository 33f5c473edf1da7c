use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use duochat::{write_summary, ChatMessage};
use duoconf::DuoConfig;

use crate::conversation::{call_with_retry, RetryPolicy};
use crate::provider::{ChatBackend, CompletionRequest};

/// Turns a finished conversation log into a Markdown summary.
pub struct Summarizer {
    backend: Arc<dyn ChatBackend>,
    model: String,
    prompt: String,
    retry: RetryPolicy,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &DuoConfig) -> Self {
        Self {
            backend,
            model: config.backend.summary_model().to_string(),
            prompt: config.summary.prompt.clone(),
            retry: RetryPolicy::from_config(&config.conversation),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Read the log back, ask for a summary, write it to `summary_path`.
    #[tracing::instrument(
        skip(self),
        fields(llm.model = %self.model)
    )]
    pub async fn summarize(&self, log_path: &Path, summary_path: &Path) -> Result<PathBuf> {
        let transcript = std::fs::read_to_string(log_path)
            .with_context(|| format!("Failed to read conversation log {}", log_path.display()))?;
        if transcript.trim().is_empty() {
            bail!("Conversation log {} is empty", log_path.display());
        }

        let prompt = [ChatMessage::user(format!("{}\n\n{}", self.prompt.trim(), transcript))];
        let request = CompletionRequest::bare(&self.model, &prompt);
        let summary = call_with_retry(self.backend.as_ref(), &request, self.retry)
            .await
            .context("Summary request failed")?;

        if summary.trim().is_empty() {
            bail!("Model returned an empty summary");
        }

        write_summary(summary_path, &summary, chrono::Local::now())?;
        tracing::info!(path = %summary_path.display(), "Summary written");

        Ok(summary_path.to_path_buf())
    }
}
