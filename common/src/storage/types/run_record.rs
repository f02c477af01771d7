use serde::{Deserialize, Serialize};

use crate::stored_object;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
    ImportFailed,
    Noop,
    Locked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct RunCounters {
    pub stale_docs: u32,
    pub indexed_docs: u32,
    pub nodes_new: u32,
    pub edges_new: u32,
    pub percent_reused_nodes: f32,
    pub percent_reused_edges: f32,
}

stored_object!(RunRecord, "run_record", {
    namespace: String,
    run_id: String,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    status: RunStatus,
    counters: RunCounters,
    artifact_dir: String
});

impl RunRecord {
    pub fn new(namespace: &str, run_id: &str, artifact_dir: String) -> Self {
        let now = chrono::Utc::now();
        RunRecord {
            id: format!("{namespace}:{run_id}"),
            created_at: now,
            updated_at: now,
            namespace: namespace.to_string(),
            run_id: run_id.to_string(),
            started_at: now,
            finished_at: None,
            status: RunStatus::Running,
            counters: RunCounters::default(),
            artifact_dir,
        }
    }
}
