use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use tokio::sync::Mutex;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

use crate::error::GraphRagError;
use crate::utils::config::{AppConfig, EmbeddingProviderKind};

const MAX_RETRIES: usize = 3;

/// Pluggable embedding backend (C4). A provider aligns one-to-one with
/// input order and always returns vectors of its fixed `dimension()`,
/// except the null provider which returns empty vectors so retrieval
/// falls back to structural + lexical signal only.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, GraphRagError>;
    fn dimension(&self) -> usize;
    /// Tag persisted alongside cached embeddings; changing provider or
    /// model invalidates cache hits for the same text.
    fn provider_tag(&self) -> String;
}

pub struct OpenAiEmbeddingProvider {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        client: async_openai::Client<async_openai::config::OpenAIConfig>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            dimension,
            timeout,
        }
    }

    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, GraphRagError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimension as u32)
            .input([input])
            .build()
            .map_err(GraphRagError::Provider)?;

        let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| GraphRagError::Transient("embedding request timed out".into()))?
            .map_err(GraphRagError::Provider)?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GraphRagError::ProviderFailure("no embedding data received".into()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, GraphRagError> {
        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            let retry_strategy = ExponentialBackoff::from_millis(200)
                .map(jitter)
                .take(MAX_RETRIES);
            let result = Retry::spawn(retry_strategy, || self.embed_one(input)).await;
            match result {
                Ok(vector) => out.push(vector),
                Err(err) => {
                    warn!(error = %err, "embedding provider failed after retries, returning empty vector");
                    out.push(Vec::new());
                }
            }
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_tag(&self) -> String {
        format!("openai:{}", self.model)
    }
}

/// Local CPU-bound embedding backend (§4.2), avoiding the OpenAI API
/// entirely. Model weights load once in [`Self::new`] and are reused
/// across calls behind a `tokio::Mutex`, since `fastembed`'s model isn't
/// `Sync`.
pub struct FastEmbedEmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: EmbeddingModel,
    dimension: usize,
}

impl FastEmbedEmbeddingProvider {
    pub async fn new(model_code: &str) -> Result<Self, GraphRagError> {
        let model_name = EmbeddingModel::from_str(model_code).unwrap_or_else(|err| {
            warn!(error = %err, model_code, "unknown fastembed model code, falling back to the default model");
            EmbeddingModel::default()
        });

        let options = TextInitOptions::new(model_name.clone()).with_show_download_progress(true);
        let model_name_for_task = model_name.clone();
        let (model, dimension) = tokio::task::spawn_blocking(move || {
            let model = TextEmbedding::try_new(options)
                .map_err(|err| GraphRagError::ProviderFailure(format!("fastembed model init failed: {err}")))?;
            let info = EmbeddingModel::get_model_info(&model_name_for_task).ok_or_else(|| {
                GraphRagError::ProviderFailure("fastembed model metadata missing".to_string())
            })?;
            Ok::<_, GraphRagError>((model, info.dim))
        })
        .await
        .map_err(|err| GraphRagError::ProviderFailure(format!("fastembed init task panicked: {err}")))??;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name,
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedEmbeddingProvider {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, GraphRagError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.model.lock().await;
        guard
            .embed(inputs.to_vec(), None)
            .map_err(|err| GraphRagError::ProviderFailure(format!("fastembed embedding failed: {err}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_tag(&self) -> String {
        format!("fastembed:{}", self.model_name)
    }
}

/// `disable_embeddings=true` path: retrieval then runs structural + lexical only.
pub struct NullEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, GraphRagError> {
        debug!(count = inputs.len(), "embeddings disabled, returning empty vectors");
        Ok(vec![Vec::new(); inputs.len()])
    }

    fn dimension(&self) -> usize {
        0
    }

    fn provider_tag(&self) -> String {
        "none".to_string()
    }
}

pub async fn provider_from_config(
    config: &AppConfig,
    openai_client: async_openai::Client<async_openai::config::OpenAIConfig>,
) -> Result<Box<dyn EmbeddingProvider>, GraphRagError> {
    match config.embedding_provider {
        EmbeddingProviderKind::None => Ok(Box::new(NullEmbeddingProvider)),
        EmbeddingProviderKind::Openai => Ok(Box::new(OpenAiEmbeddingProvider::new(
            openai_client,
            config.embedding_model.clone(),
            1536,
            Duration::from_secs(config.embedding_timeout_secs),
        ))),
        EmbeddingProviderKind::Fastembed => {
            Ok(Box::new(FastEmbedEmbeddingProvider::new(&config.embedding_model).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_provider_returns_empty_vectors_aligned_with_input() {
        let provider = NullEmbeddingProvider;
        let result = provider
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .expect("embed should not fail");
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(Vec::is_empty));
        assert_eq!(provider.dimension(), 0);
    }
}
