use serde::{Deserialize, Serialize};

use crate::stored_object;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterSummary {
    pub label: String,
    pub summary: String,
    /// `hash(cluster_id, top_terms)`, used to skip re-summarization when
    /// neither has changed since the cached summary was produced (§4.8).
    pub cache_key: String,
}

stored_object!(Cluster, "cluster", {
    namespace: String,
    cluster_id: String,
    level: u32,
    node_ids: Vec<String>,
    size: usize,
    top_terms: Vec<String>,
    centroid: Option<Vec<f32>>,
    summary: Option<ClusterSummary>
});

impl Cluster {
    pub fn id_for(namespace: &str, cluster_id: &str) -> String {
        format!("{namespace}:{cluster_id}")
    }
}
