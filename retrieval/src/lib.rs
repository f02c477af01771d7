#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

//! The C6 retrieval engine: candidate generation, structural rerank,
//! adjacency expansion and tie-breaking over the graph store (spec.md
//! §4.6), plus the C7 answer synthesizer (§4.7).

pub mod answer;
pub mod candidates;
pub mod config;
pub mod expansion;
pub mod scoring;

use std::collections::HashMap;
use std::sync::Arc;

use common::error::GraphRagError;
use common::storage::db::GraphStore;
use common::storage::types::node::{Node, NodeLabel};
use common::utils::config::RetrievalWeightsConfig;
use common::utils::embedding::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

pub use config::RetrievalTuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Auto,
    Global,
    Local,
    Drift,
    Structured,
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RetrievalMode::Auto => "auto",
            RetrievalMode::Global => "global",
            RetrievalMode::Local => "local",
            RetrievalMode::Drift => "drift",
            RetrievalMode::Structured => "structured",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrieveFilters {
    pub labels: Option<Vec<NodeLabel>>,
    pub relations: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub question: String,
    pub namespace: String,
    pub mode: RetrievalMode,
    pub top_k: usize,
    pub filters: RetrieveFilters,
}

#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub node_id: String,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningStep {
    pub step: String,
    pub candidate_ids: Vec<String>,
    pub score_breakdown: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResponse {
    pub mode_used: RetrievalMode,
    pub nodes: Vec<Node>,
    pub passages: Vec<Passage>,
    pub reasoning_chain: Vec<ReasoningStep>,
    pub cost_tokens: Option<u32>,
}

/// Top-level C6 entry point. `auto` tries `local` first and only pays for
/// a second `global` pass when the best local score misses the
/// configured threshold (spec.md §4.6).
#[instrument(skip_all, fields(namespace = %request.namespace, mode = %request.mode))]
pub async fn query(
    graph: &GraphStore,
    embedding_provider: Option<&Arc<dyn EmbeddingProvider>>,
    weights: &RetrievalWeightsConfig,
    tuning: &RetrievalTuning,
    request: RetrieveRequest,
) -> Result<RetrieveResponse, GraphRagError> {
    match request.mode {
        RetrievalMode::Auto => {
            let local = run_pipeline(
                graph,
                embedding_provider,
                weights.local,
                tuning,
                &request,
                RetrievalMode::Local,
            )
            .await?;

            let best_local_score = local
                .passages
                .first()
                .map_or(0.0, |passage| passage.score);

            if best_local_score >= weights.auto_threshold {
                info!(best_local_score, "auto mode satisfied by local pass");
                return Ok(local);
            }

            info!(best_local_score, threshold = weights.auto_threshold, "auto mode escalating to global pass");
            let global = run_pipeline(
                graph,
                embedding_provider,
                weights.global,
                tuning,
                &request,
                RetrievalMode::Global,
            )
            .await?;

            Ok(merge_auto(local, global, request.top_k))
        }
        RetrievalMode::Local => {
            run_pipeline(graph, embedding_provider, weights.local, tuning, &request, RetrievalMode::Local).await
        }
        RetrievalMode::Global => {
            run_pipeline(graph, embedding_provider, weights.global, tuning, &request, RetrievalMode::Global).await
        }
        RetrievalMode::Drift => {
            run_pipeline(graph, embedding_provider, weights.drift, tuning, &request, RetrievalMode::Drift).await
        }
        RetrievalMode::Structured => {
            run_pipeline(graph, embedding_provider, weights.local, tuning, &request, RetrievalMode::Structured).await
        }
    }
}

async fn run_pipeline(
    graph: &GraphStore,
    embedding_provider: Option<&Arc<dyn EmbeddingProvider>>,
    mode_weights: common::utils::config::ModeWeights,
    tuning: &RetrievalTuning,
    request: &RetrieveRequest,
    mode_used: RetrievalMode,
) -> Result<RetrieveResponse, GraphRagError> {
    let mut reasoning_chain = Vec::new();

    let query_embedding = match embedding_provider {
        Some(provider) => {
            let vectors = provider.embed(std::slice::from_ref(&request.question)).await?;
            vectors.into_iter().next().filter(|v| !v.is_empty())
        }
        None => None,
    };

    let generated = candidates::generate_candidates(
        graph,
        &request.namespace,
        &request.question,
        query_embedding.as_deref(),
        &request.filters,
        tuning,
    )
    .await?;
    reasoning_chain.push(ReasoningStep {
        step: "candidate_generation".to_string(),
        candidate_ids: generated.iter().map(|c| c.node.id.clone()).collect(),
        score_breakdown: json!({ "count": generated.len() }),
    });

    let mut scored: HashMap<String, scoring::ScoredCandidate> = generated
        .into_iter()
        .map(|candidate| (candidate.node.id.clone(), scoring::structural_rerank(candidate, mode_weights)))
        .collect();
    reasoning_chain.push(ReasoningStep {
        step: "structural_rerank".to_string(),
        candidate_ids: scored.keys().cloned().collect(),
        score_breakdown: json!({
            "weights": { "sim": mode_weights.sim, "deg": mode_weights.deg, "cent": mode_weights.cent, "lex": mode_weights.lex }
        }),
    });

    let seeds: Vec<scoring::ScoredCandidate> = {
        let mut values: Vec<_> = scored.values().cloned().collect();
        scoring::sort_scored(&mut values);
        values.into_iter().take(tuning.expansion_seed_count).collect()
    };

    let expanded = expansion::expand_adjacency(graph, &seeds, tuning).await?;
    let expanded_ids: Vec<String> = expanded.iter().map(|c| c.node.id.clone()).collect();
    for candidate in expanded {
        scored
            .entry(candidate.node.id.clone())
            .and_modify(|existing| {
                if candidate.score > existing.score {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }
    reasoning_chain.push(ReasoningStep {
        step: "adjacency_expansion".to_string(),
        candidate_ids: expanded_ids,
        score_breakdown: json!({ "decay": tuning.expansion_decay }),
    });

    let mut ranked: Vec<scoring::ScoredCandidate> = scored.into_values().collect();
    scoring::sort_scored(&mut ranked);
    ranked.truncate(request.top_k);
    reasoning_chain.push(ReasoningStep {
        step: "truncation".to_string(),
        candidate_ids: ranked.iter().map(|c| c.node.id.clone()).collect(),
        score_breakdown: json!({ "top_k": request.top_k }),
    });

    let passages = ranked
        .iter()
        .map(|candidate| Passage {
            node_id: candidate.node.id.clone(),
            text: candidate
                .node
                .properties
                .get("text")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(&candidate.node.name)
                .to_string(),
            score: candidate.score,
        })
        .collect();
    let nodes = ranked.into_iter().map(|c| c.node).collect();

    Ok(RetrieveResponse {
        mode_used,
        nodes,
        passages,
        reasoning_chain,
        cost_tokens: None,
    })
}

fn merge_auto(local: RetrieveResponse, global: RetrieveResponse, top_k: usize) -> RetrieveResponse {
    let mut by_id: HashMap<String, (Node, f32)> = HashMap::new();
    for (node, passage) in local.nodes.into_iter().zip(local.passages.iter()) {
        by_id.insert(node.id.clone(), (node, passage.score));
    }
    for (node, passage) in global.nodes.into_iter().zip(global.passages.iter()) {
        by_id
            .entry(node.id.clone())
            .and_modify(|(existing_node, score)| {
                if passage.score > *score {
                    *existing_node = node.clone();
                    *score = passage.score;
                }
            })
            .or_insert((node, passage.score));
    }

    let mut merged: Vec<(Node, f32)> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.importance().partial_cmp(&b.0.importance()).unwrap_or(std::cmp::Ordering::Equal).reverse())
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    merged.truncate(top_k);

    let passages = merged
        .iter()
        .map(|(node, score)| Passage {
            node_id: node.id.clone(),
            text: node
                .properties
                .get("text")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(&node.name)
                .to_string(),
            score: *score,
        })
        .collect();
    let nodes = merged.into_iter().map(|(node, _)| node).collect();

    let mut reasoning_chain = local.reasoning_chain;
    reasoning_chain.extend(global.reasoning_chain);
    reasoning_chain.push(ReasoningStep {
        step: "auto_merge".to_string(),
        candidate_ids: Vec::new(),
        score_breakdown: json!({ "merged_from": ["local", "global"] }),
    });

    RetrieveResponse {
        mode_used: RetrievalMode::Auto,
        nodes,
        passages,
        reasoning_chain,
        cost_tokens: None,
    }
}
