use std::collections::HashMap;

use common::error::GraphRagError;
use common::storage::types::ingestion_task::IngestionDocument;
use common::storage::types::node::NodeLabel;
use tracing::error;

use crate::chunker::{Chunk, Section};
use crate::extractor::{ExtractedRelation, ExtractionTag};

use super::{config::IngestionConfig, services::PipelineServices};

/// One entity's accumulated state across every chunk of the document it
/// was found in (spec.md §4.5 step 3 aggregation).
#[derive(Debug, Clone)]
pub struct AggregatedEntity {
    pub name: String,
    pub label: NodeLabel,
    pub confidence: f32,
    pub mention_chunks: Vec<u32>,
}

pub struct PipelineContext<'a> {
    pub task_id: String,
    pub doc: IngestionDocument,
    pub pipeline_config: &'a IngestionConfig,
    pub services: &'a dyn PipelineServices,

    pub content_hash: String,
    pub sections: Vec<Section>,
    pub chunks: Vec<Chunk>,

    pub entities: HashMap<String, AggregatedEntity>,
    pub relations: HashMap<(String, String, String), f32>,
    pub extraction_tag: Option<ExtractionTag>,

    pub chunk_embeddings: Vec<Vec<f32>>,
    pub entity_embeddings: HashMap<String, Vec<f32>>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        task_id: String,
        doc: IngestionDocument,
        pipeline_config: &'a IngestionConfig,
        services: &'a dyn PipelineServices,
    ) -> Self {
        Self {
            task_id,
            doc,
            pipeline_config,
            services,
            content_hash: String::new(),
            sections: Vec::new(),
            chunks: Vec::new(),
            entities: HashMap::new(),
            relations: HashMap::new(),
            extraction_tag: None,
            chunk_embeddings: Vec::new(),
            entity_embeddings: HashMap::new(),
        }
    }

    /// Adds (or strengthens) an entity observed in `chunk_index`, keeping
    /// the maximum confidence seen across chunks.
    pub fn record_entity(
        &mut self,
        name: &str,
        label: NodeLabel,
        confidence: f32,
        chunk_index: u32,
    ) {
        let key = name.to_lowercase();
        let entry = self.entities.entry(key).or_insert_with(|| AggregatedEntity {
            name: name.to_string(),
            label,
            confidence,
            mention_chunks: Vec::new(),
        });
        entry.confidence = entry.confidence.max(confidence);
        if !entry.mention_chunks.contains(&chunk_index) {
            entry.mention_chunks.push(chunk_index);
        }
    }

    /// Merges a relation, keeping the higher confidence on repeats
    /// (mirrors `Edge::merge_confidence`, §3 identity invariants).
    pub fn record_relation(&mut self, relation: ExtractedRelation) {
        let key = (
            relation.source_name.to_lowercase(),
            relation.target_name.to_lowercase(),
            relation.relation,
        );
        let entry = self.relations.entry(key).or_insert(0.0);
        *entry = entry.max(relation.confidence);
    }

    pub fn abort(&mut self, err: GraphRagError) -> GraphRagError {
        error!(task_id = %self.task_id, doc_id = %self.doc.doc_id, error = %err, "ingestion pipeline aborted");
        err
    }
}
