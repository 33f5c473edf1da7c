use anyhow::{Context, Result};
use serde::Serialize;

use crate::provider::{ChatBackend, ModelInfo};

/// What the configured credential can reach.
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub backend: String,
    pub models: Vec<ModelInfo>,
    /// First model that supports generation, ready to paste into the config
    pub suggested: Option<String>,
}

impl ModelReport {
    pub fn generation_models(&self) -> impl Iterator<Item = &ModelInfo> {
        self.models.iter().filter(|m| m.supports_generation)
    }
}

/// List every model the backend exposes and pick one for chat.
#[tracing::instrument(skip(backend), fields(backend = backend.name()))]
pub async fn check_model_access(backend: &dyn ChatBackend) -> Result<ModelReport> {
    let models = backend
        .list_models()
        .await
        .with_context(|| format!("Failed to list models from {}", backend.name()))?;

    let suggested = models
        .iter()
        .find(|m| m.supports_generation)
        .map(|m| m.id.clone());

    tracing::info!(
        total = models.len(),
        suggested = suggested.as_deref().unwrap_or("none"),
        "Model access checked"
    );

    Ok(ModelReport {
        backend: backend.name().to_string(),
        models,
        suggested,
    })
}
