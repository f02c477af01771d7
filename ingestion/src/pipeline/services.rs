use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use async_trait::async_trait;
use common::error::GraphRagError;
use common::utils::embedding::EmbeddingProvider;

use crate::chunker::{self, ParsedDocument};
use crate::extractor::{self, ExtractionResult};

/// Chunking, extraction and embedding, injected so `stages` can be tested
/// against a fake without real LLM or embedding calls (teacher's
/// `DefaultPipelineServices` shape).
#[async_trait]
pub trait PipelineServices: Send + Sync {
    fn parse_document(&self, text: &str) -> Result<ParsedDocument, GraphRagError>;
    async fn extract(&self, text: &str, force_heuristic: bool) -> ExtractionResult;
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, GraphRagError>;
    /// Cache key suffix (§4.4); changing provider/model invalidates hits.
    fn provider_tag(&self) -> String;
}

pub struct DefaultPipelineServices {
    openai_client: Option<Client<OpenAIConfig>>,
    extraction_model: String,
    embedding_provider: Arc<dyn EmbeddingProvider>,
}

impl DefaultPipelineServices {
    pub fn new(
        openai_client: Option<Client<OpenAIConfig>>,
        extraction_model: impl Into<String>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            openai_client,
            extraction_model: extraction_model.into(),
            embedding_provider,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    fn parse_document(&self, text: &str) -> Result<ParsedDocument, GraphRagError> {
        chunker::parse_document(text)
    }

    async fn extract(&self, text: &str, force_heuristic: bool) -> ExtractionResult {
        if force_heuristic {
            return extractor::extract_heuristic(text);
        }
        match &self.openai_client {
            Some(client) => extractor::extract_llm(client, &self.extraction_model, text).await,
            None => extractor::extract_heuristic(text),
        }
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, GraphRagError> {
        self.embedding_provider.embed(inputs).await
    }

    fn provider_tag(&self) -> String {
        self.embedding_provider.provider_tag()
    }
}
