use common::error::GraphRagError;
use common::storage::db::GraphStore;
use common::storage::types::node::Node;
use tracing::instrument;

use crate::config::RetrievalTuning;
use crate::scoring::{query_terms, term_overlap};
use crate::RetrieveFilters;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub node: Node,
    pub sim: f32,
    pub term_overlap: f32,
}

fn node_text(node: &Node) -> String {
    node.properties
        .get("text")
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| node.name.clone(), ToString::to_string)
}

/// Pages through `namespace`'s nodes up to `cap`, preferring chunks and
/// high-importance entities when the store holds more than `cap` nodes
/// (spec.md §4.6 step 1).
async fn sample_nodes(
    graph: &GraphStore,
    namespace: &str,
    filters: &RetrieveFilters,
    cap: usize,
) -> Result<Vec<Node>, GraphRagError> {
    let mut fetched = Vec::new();
    let mut cursor: Option<String> = None;
    let page_size = 200.min(cap.max(1));

    loop {
        let (page, next_cursor, _store) = graph
            .iterate_nodes(namespace, cursor.as_deref(), page_size)
            .await?;
        if page.is_empty() {
            break;
        }
        fetched.extend(page);
        cursor = next_cursor;
        if cursor.is_none() || fetched.len() >= cap * 2 {
            break;
        }
    }

    if let Some(labels) = &filters.labels {
        fetched.retain(|node| labels.contains(&node.label));
    }

    fetched.sort_by(|a, b| {
        let a_is_chunk = a.label == common::storage::types::node::NodeLabel::Chunk;
        let b_is_chunk = b.label == common::storage::types::node::NodeLabel::Chunk;
        b_is_chunk
            .cmp(&a_is_chunk)
            .then_with(|| b.importance().partial_cmp(&a.importance()).unwrap_or(std::cmp::Ordering::Equal))
    });
    fetched.truncate(cap);
    Ok(fetched)
}

/// Candidate generation (spec.md §4.6 step 1): cosine similarity over a
/// bounded sample when embeddings exist, else a name-contains fallback,
/// always unioned with a lexical term-frequency pass.
#[instrument(skip_all, fields(namespace))]
pub async fn generate_candidates(
    graph: &GraphStore,
    namespace: &str,
    question: &str,
    query_embedding: Option<&[f32]>,
    filters: &RetrieveFilters,
    tuning: &RetrievalTuning,
) -> Result<Vec<Candidate>, GraphRagError> {
    let sample = sample_nodes(graph, namespace, filters, tuning.candidate_sample_cap).await?;
    let terms = query_terms(question);
    let question_lower = question.to_lowercase();

    let embeddings_exist = query_embedding.is_some() && sample.iter().any(|n| n.embedding.as_ref().is_some_and(|e| !e.is_empty()));

    let candidates = sample
        .into_iter()
        .filter_map(|node| {
            let sim = if embeddings_exist {
                match (&node.embedding, query_embedding) {
                    (Some(embedding), Some(query)) if !embedding.is_empty() => {
                        crate::scoring::cosine_similarity(embedding, query)
                    }
                    _ => 0.0,
                }
            } else if node_text(&node).to_lowercase().contains(&question_lower) {
                1.0
            } else {
                0.0
            };

            let overlap = term_overlap(&terms, &node_text(&node));

            if sim <= 0.0 && overlap <= 0.0 {
                return None;
            }

            Some(Candidate { node, sim, term_overlap: overlap })
        })
        .collect();

    Ok(candidates)
}
