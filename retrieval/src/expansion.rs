use common::error::GraphRagError;
use common::storage::db::GraphStore;
use common::storage::types::edge::EXPANSION_RELATIONS;
use tracing::instrument;

use crate::config::RetrievalTuning;
use crate::scoring::ScoredCandidate;

/// Adjacency expansion (spec.md §4.6 step 3): for each seed, pull depth-1
/// neighbors reached via an expansion relation and carry the seed's score
/// forward, decayed.
#[instrument(skip_all)]
pub async fn expand_adjacency(
    graph: &GraphStore,
    seeds: &[ScoredCandidate],
    tuning: &RetrievalTuning,
) -> Result<Vec<ScoredCandidate>, GraphRagError> {
    let mut expanded = Vec::new();

    for seed in seeds {
        let neighbors = graph.neighbors(&seed.node.id, tuning.expansion_depth).await?;
        let reachable: std::collections::HashSet<&str> = neighbors
            .edges
            .iter()
            .filter(|edge| EXPANSION_RELATIONS.contains(&edge.relation.as_str()))
            .flat_map(|edge| [edge.source_id.as_str(), edge.target_id.as_str()])
            .collect();

        for node in neighbors.nodes {
            if node.id == seed.node.id || !reachable.contains(node.id.as_str()) {
                continue;
            }
            expanded.push(ScoredCandidate {
                node,
                score: seed.score * tuning.expansion_decay,
            });
        }
    }

    Ok(expanded)
}
