use std::collections::HashMap;

use chrono::Utc;
use common::error::GraphRagError;
use common::events::{EventBus, GraphEvent};
use common::storage::db::GraphStore;
use common::storage::db::SurrealDbClient;
use common::storage::embedding_cache;
use common::storage::types::edge::{Edge, CONTAINS, HAS_ENTITY, MENTIONED_IN};
use common::storage::types::ingest_log::{IngestLog, IngestStatus};
use common::storage::types::node::{Node, NodeLabel};
use serde_json::{json, Map};
use sha2::{Digest, Sha256};
use state_machines::core::GuardError;
use tracing::{debug, instrument};

use super::{
    context::PipelineContext,
    state::{ContentHashed, Embedded, Extracted, IngestionMachine, Persisted, Ready, Sectioned},
};

fn map_guard_error(event: &str, guard: &GuardError) -> GraphRagError {
    GraphRagError::Validation(format!(
        "invalid ingestion pipeline transition during {event}: {guard:?}"
    ))
}

/// Step 1 of spec.md §4.5 (hash computation only; the NOOP short-circuit
/// against the last-indexed hash happens in the caller, before the
/// machine is entered).
#[instrument(level = "trace", skip_all, fields(doc_id = %ctx.doc.doc_id))]
pub fn hash_content(
    machine: IngestionMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), ContentHashed>, GraphRagError> {
    let mut hasher = Sha256::new();
    hasher.update(ctx.doc.text.as_bytes());
    ctx.content_hash = format!("{:x}", hasher.finalize());
    machine
        .hash_content()
        .map_err(|(_, guard)| map_guard_error("hash_content", &guard))
}

/// Step 2: C2 section/chunk parsing.
#[instrument(level = "trace", skip_all, fields(doc_id = %ctx.doc.doc_id))]
pub fn section(
    machine: IngestionMachine<(), ContentHashed>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Sectioned>, GraphRagError> {
    let parsed = ctx.services.parse_document(&ctx.doc.text)?;
    debug!(
        doc_id = %ctx.doc.doc_id,
        sections = parsed.sections.len(),
        chunks = parsed.chunks.len(),
        "document sectioned and chunked"
    );
    ctx.sections = parsed.sections;
    ctx.chunks = parsed.chunks;
    machine
        .section()
        .map_err(|(_, guard)| map_guard_error("section", &guard))
}

/// Step 3: C3 extraction per chunk, aggregated into `ctx.entities`/`ctx.relations`.
#[instrument(level = "trace", skip_all, fields(doc_id = %ctx.doc.doc_id))]
pub async fn extract(
    machine: IngestionMachine<(), Sectioned>,
    ctx: &mut PipelineContext<'_>,
) -> Result<IngestionMachine<(), Extracted>, GraphRagError> {
    let chunks = ctx.chunks.clone();
    for chunk in &chunks {
        let result = ctx
            .services
            .extract(&chunk.text, ctx.doc.force_heuristic)
            .await;
        ctx.extraction_tag = Some(result.tag);

        for entity in &result.entities {
            ctx.record_entity(&entity.name, entity.label, entity.confidence, chunk.chunk_index);
        }
        for relation in crate::extractor::derive_co_occurrence(&result.entities) {
            ctx.record_relation(relation);
        }
        for relation in result.relations {
            ctx.record_relation(relation);
        }
    }

    debug!(
        doc_id = %ctx.doc.doc_id,
        entities = ctx.entities.len(),
        relations = ctx.relations.len(),
        "extraction aggregated across chunks"
    );

    machine
        .extract()
        .map_err(|(_, guard)| map_guard_error("extract", &guard))
}

/// Step 4: C4 embeddings for chunk texts and unique entity names, cached
/// per `sha256(text)` + provider tag.
#[instrument(level = "trace", skip_all, fields(doc_id = %ctx.doc.doc_id))]
pub async fn embed(
    machine: IngestionMachine<(), Extracted>,
    ctx: &mut PipelineContext<'_>,
    db: &SurrealDbClient,
) -> Result<IngestionMachine<(), Embedded>, GraphRagError> {
    if ctx.doc.disable_embeddings {
        ctx.chunk_embeddings = vec![Vec::new(); ctx.chunks.len()];
        return machine
            .embed()
            .map_err(|(_, guard)| map_guard_error("embed", &guard));
    }

    let provider_tag = ctx.services.provider_tag();
    let chunk_texts: Vec<String> = ctx.chunks.iter().map(|c| c.text.clone()).collect();
    ctx.chunk_embeddings = embed_with_cache(db, ctx.services, &provider_tag, &chunk_texts).await?;

    let entity_names: Vec<String> = ctx.entities.values().map(|e| e.name.clone()).collect();
    let entity_vectors = embed_with_cache(db, ctx.services, &provider_tag, &entity_names).await?;
    for (name, vector) in entity_names.into_iter().zip(entity_vectors) {
        ctx.entity_embeddings.insert(name.to_lowercase(), vector);
    }

    machine
        .embed()
        .map_err(|(_, guard)| map_guard_error("embed", &guard))
}

async fn embed_with_cache(
    db: &SurrealDbClient,
    services: &dyn super::services::PipelineServices,
    provider_tag: &str,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, GraphRagError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
    let mut misses: Vec<(usize, String)> = Vec::new();
    for (idx, text) in texts.iter().enumerate() {
        match embedding_cache::get(db, text, provider_tag).await? {
            Some(vector) => results.push(Some(vector)),
            None => {
                results.push(None);
                misses.push((idx, text.clone()));
            }
        }
    }

    if !misses.is_empty() {
        let miss_texts: Vec<String> = misses.iter().map(|(_, text)| text.clone()).collect();
        let embedded = services.embed(&miss_texts).await?;
        for ((idx, text), vector) in misses.into_iter().zip(embedded) {
            if !vector.is_empty() {
                embedding_cache::put(db, &text, provider_tag, vector.clone()).await?;
            }
            results[idx] = Some(vector);
        }
    }

    Ok(results.into_iter().map(Option::unwrap_or_default).collect())
}

/// Steps 5-7: upsert the accumulated graph, advance the ingest log, and
/// publish `node_added`/`edges_added` events.
#[instrument(level = "trace", skip_all, fields(doc_id = %ctx.doc.doc_id))]
pub async fn persist(
    machine: IngestionMachine<(), Embedded>,
    ctx: &mut PipelineContext<'_>,
    db: &SurrealDbClient,
    graph: &GraphStore,
    events: Option<&EventBus>,
) -> Result<(IngestionMachine<(), Persisted>, usize, usize), GraphRagError> {
    let namespace = ctx.doc.namespace.clone();
    let doc_id = ctx.doc.doc_id.clone();

    let (nodes, edges) = build_artifacts(ctx, &namespace, &doc_id);

    let outcome = graph.bulk_upsert(nodes, edges).await?;
    let added_node_ids: Vec<(String, String)> = outcome
        .nodes
        .into_iter()
        .filter(|n| n.created)
        .map(|n| (n.id, n.label))
        .collect();
    let added_edge_ids: Vec<String> = outcome.edges.into_iter().filter(|e| e.created).map(|e| e.id).collect();

    let log = IngestLog {
        id: IngestLog::id_for(&namespace, &doc_id),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        namespace: namespace.clone(),
        doc_id: doc_id.clone(),
        content_hash: ctx.content_hash.clone(),
        first_seen: Utc::now(),
        last_indexed_at: Some(Utc::now()),
        status: IngestStatus::Indexed,
    };
    let _: Option<IngestLog> = db
        .client
        .upsert(("ingest_log", log.id.as_str()))
        .content(log)
        .await?;

    if let Some(bus) = events {
        for (node_id, label) in &added_node_ids {
            bus.publish(GraphEvent::NodeAdded {
                namespace: namespace.clone(),
                node_id: node_id.clone(),
                label: label.clone(),
                at: Utc::now(),
            });
        }
        if !added_edge_ids.is_empty() {
            bus.publish(GraphEvent::EdgesAdded {
                namespace: namespace.clone(),
                edge_ids: added_edge_ids.clone(),
                at: Utc::now(),
            });
        }
    }

    debug!(
        doc_id = %doc_id,
        nodes_added = added_node_ids.len(),
        edges_added = added_edge_ids.len(),
        "ingestion persistence flushed to graph store"
    );

    let next = machine
        .persist()
        .map_err(|(_, guard)| map_guard_error("persist", &guard))?;
    Ok((next, added_node_ids.len(), added_edge_ids.len()))
}

fn build_artifacts(ctx: &PipelineContext<'_>, namespace: &str, doc_id: &str) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let now = Utc::now();

    let mut section_for_chunk: HashMap<u32, String> = HashMap::new();
    for section in &ctx.sections {
        let mut properties = Map::new();
        properties.insert("depth".to_string(), json!(section.depth));
        properties.insert("chunk_index_start".to_string(), json!(section.chunk_index_start));
        properties.insert("chunk_index_end".to_string(), json!(section.chunk_index_end));
        properties.insert("source_ids".to_string(), json!([doc_id]));
        nodes.push(Node {
            id: Node::section_id(namespace, doc_id, &section.path),
            created_at: now,
            updated_at: now,
            label: NodeLabel::Section,
            name: section.title.clone(),
            namespace: namespace.to_string(),
            embedding: None,
            properties,
        });
        for idx in section.chunk_index_start..=section.chunk_index_end {
            section_for_chunk.insert(idx, section.path.clone());
        }
    }

    for (i, chunk) in ctx.chunks.iter().enumerate() {
        let section_path = section_for_chunk
            .get(&chunk.chunk_index)
            .cloned()
            .unwrap_or_else(|| chunk.section_path.clone());
        let chunk_id = Node::chunk_id(namespace, doc_id, chunk.chunk_index);
        let preview: String = chunk.text.chars().take(80).collect();
        let mut properties = Map::new();
        properties.insert("text".to_string(), json!(chunk.text));
        properties.insert("chunk_index".to_string(), json!(chunk.chunk_index));
        properties.insert("section_path".to_string(), json!(section_path));
        properties.insert("source_ids".to_string(), json!([doc_id]));
        let embedding = ctx
            .chunk_embeddings
            .get(i)
            .filter(|v| !v.is_empty())
            .cloned();
        nodes.push(Node {
            id: chunk_id.clone(),
            created_at: now,
            updated_at: now,
            label: NodeLabel::Chunk,
            name: preview,
            namespace: namespace.to_string(),
            embedding,
            properties,
        });

        let section_id = Node::section_id(namespace, doc_id, &section_path);
        edges.push(Edge::new(section_id, chunk_id, CONTAINS, 1.0));
    }

    let cap = ctx.pipeline_config.mentioned_in_cap();
    for entity in ctx.entities.values() {
        let entity_id = Node::entity_id(namespace, &entity.name);
        let mut properties = Map::new();
        properties.insert("confidence".to_string(), json!(entity.confidence));
        properties.insert("source_ids".to_string(), json!([doc_id]));
        let embedding = ctx
            .entity_embeddings
            .get(&entity.name.to_lowercase())
            .filter(|v| !v.is_empty())
            .cloned();
        nodes.push(Node {
            id: entity_id.clone(),
            created_at: now,
            updated_at: now,
            label: entity.label,
            name: entity.name.clone(),
            namespace: namespace.to_string(),
            embedding,
            properties,
        });

        if let Some(first_chunk) = entity.mention_chunks.first() {
            let section_path = section_for_chunk
                .get(first_chunk)
                .cloned()
                .unwrap_or_else(|| "root".to_string());
            let section_id = Node::section_id(namespace, doc_id, &section_path);
            edges.push(Edge::new(section_id, entity_id.clone(), HAS_ENTITY, entity.confidence));
        }

        for chunk_index in entity.mention_chunks.iter().take(cap) {
            let chunk_id = Node::chunk_id(namespace, doc_id, *chunk_index);
            edges.push(Edge::new(entity_id.clone(), chunk_id, MENTIONED_IN, entity.confidence));
        }
    }

    for ((source, target, relation), confidence) in &ctx.relations {
        let source_id = Node::entity_id(namespace, source);
        let target_id = Node::entity_id(namespace, target);
        edges.push(Edge::new(source_id, target_id, relation.clone(), *confidence));
    }

    (nodes, edges)
}
