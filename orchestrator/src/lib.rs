#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod delta;
pub mod lock;
pub mod retention;
pub mod rundir;
pub mod snapshot;

use std::sync::Arc;

use analytics::{needs_recompute, recompute};
use chrono::Utc;
use common::error::GraphRagError;
use common::storage::db::{GraphStore, SurrealDbClient};
use common::storage::store::StorageManager;
use common::storage::types::run_record::{RunCounters, RunRecord, RunStatus};
use common::utils::config::AppConfig;
use ingestion::IngestionPipeline;
use tracing::{info, warn};

use crate::lock::RunLock;

/// What caused this run to be considered (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Manual,
    Timer,
    Threshold,
}

pub struct Orchestrator {
    db: Arc<SurrealDbClient>,
    graph: Arc<GraphStore>,
    pipeline: Arc<IngestionPipeline>,
    storage: Arc<StorageManager>,
    config: Arc<AppConfig>,
}

impl Orchestrator {
    pub fn new(
        db: Arc<SurrealDbClient>,
        graph: Arc<GraphStore>,
        pipeline: Arc<IngestionPipeline>,
        storage: Arc<StorageManager>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { db, graph, pipeline, storage, config }
    }

    /// Drives one batch run for `namespace` (spec.md §4.9): lock, select
    /// the delta, run ingestion for it, snapshot/diff, write run-directory
    /// artifacts and markers, promote `latest`, and prune old runs.
    #[tracing::instrument(skip(self), fields(namespace, trigger = ?trigger))]
    pub async fn run_once(&self, namespace: &str, trigger: RunTrigger, force: bool) -> Result<RunRecord, GraphRagError> {
        let data_dir = std::path::PathBuf::from(&self.config.data_dir);
        let Some(run_lock) = RunLock::acquire(&data_dir, force).await? else {
            info!(namespace, ?trigger, "run lock contended, skipping");
            return Ok(locked_record(namespace));
        };

        let outcome = self.run_locked(namespace, trigger).await;
        run_lock.release().await;
        outcome
    }

    async fn run_locked(&self, namespace: &str, trigger: RunTrigger) -> Result<RunRecord, GraphRagError> {
        let stale_docs = delta::stale_doc_ids(&self.db, namespace).await?;
        if stale_docs.is_empty() {
            info!(namespace, ?trigger, "no stale documents, run is a noop");
            return Ok(noop_record(namespace));
        }

        let run_id = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let mut record = RunRecord::new(namespace, &run_id, rundir::run_prefix(namespace, &run_id));
        record.status = RunStatus::Running;
        self.db.store_item(record.clone()).await?;
        rundir::write_marker(&self.storage, namespace, &run_id, RunStatus::Running).await?;

        let baseline = snapshot::latest_snapshot(&self.db, namespace).await?;
        let baseline_modularity = baseline.as_ref().map_or(0.0, |s| s.aggregates.modularity);
        let before = snapshot::build_snapshot(&self.graph, &self.db, namespace, baseline_modularity).await?;

        let tasks = delta::tasks_for_stale_docs(&self.db, namespace, &stale_docs).await?;
        let mut indexed_docs = 0u32;
        let mut failed_docs = 0u32;
        for task in tasks {
            let task_id = task.id.clone();
            match self.pipeline.process_task(&self.db, &self.graph, task).await {
                Ok(_outcome) => indexed_docs += 1,
                Err(err) => {
                    failed_docs += 1;
                    warn!(namespace, %task_id, error = %err, "ingestion task failed during batch run");
                }
            }
        }

        if indexed_docs == 0 {
            rundir::clear_marker(&self.storage, namespace, &run_id, RunStatus::Running).await?;
            record.status = RunStatus::ImportFailed;
            record.finished_at = Some(Utc::now());
            record.counters.stale_docs = stale_docs.len() as u32;
            record.counters.indexed_docs = 0;
            self.db.store_item(record.clone()).await?;
            rundir::write_marker(&self.storage, namespace, &run_id, RunStatus::ImportFailed).await?;
            return Ok(record);
        }

        let after = snapshot::build_snapshot(&self.graph, &self.db, namespace, baseline_modularity).await?;

        let unchanged_nodes = after.node_ids.intersection(&before.node_ids).count();
        let unchanged_edges = after.edge_ids.intersection(&before.edge_ids).count();
        let percent_reused_nodes = ratio(unchanged_nodes, after.node_ids.len());
        let percent_reused_edges = ratio(unchanged_edges, after.edge_ids.len());

        rundir::write_artifact(&self.storage, namespace, &run_id, "entities.json", &after.node_ids).await?;
        rundir::write_artifact(&self.storage, namespace, &run_id, "relationships.json", &after.edge_ids).await?;
        rundir::write_artifact(&self.storage, namespace, &run_id, "communities.json", &after.community_ids).await?;

        self.db.store_item(after.clone()).await?;

        let status = if failed_docs == 0 { RunStatus::Success } else { RunStatus::Partial };

        rundir::clear_marker(&self.storage, namespace, &run_id, RunStatus::Running).await?;
        record.status = status;
        record.finished_at = Some(Utc::now());
        record.counters = RunCounters {
            stale_docs: stale_docs.len() as u32,
            indexed_docs,
            nodes_new: (after.node_ids.len().saturating_sub(before.node_ids.len())) as u32,
            edges_new: (after.edge_ids.len().saturating_sub(before.edge_ids.len())) as u32,
            percent_reused_nodes,
            percent_reused_edges,
        };
        self.db.store_item(record.clone()).await?;
        rundir::write_marker(&self.storage, namespace, &run_id, status).await?;

        if matches!(status, RunStatus::Success | RunStatus::Partial) {
            rundir::promote_latest(&self.storage, namespace, &run_id).await?;
        }

        if needs_recompute(record.counters.nodes_new as usize, after.node_ids.len(), &self.config.analytics) {
            match recompute(&self.graph, &self.db, namespace, &self.config.analytics, None).await {
                Ok(report) => info!(namespace, run_id, ?report, "analytics recomputed after batch run"),
                Err(err) => warn!(namespace, run_id, error = %err, "analytics recompute failed after batch run"),
            }
        }

        let pruned = retention::prune_old_runs(&self.storage, namespace, self.config.retention_k).await?;
        if !pruned.is_empty() {
            info!(namespace, pruned = pruned.len(), "pruned old run directories");
        }

        info!(
            namespace,
            run_id,
            ?status,
            indexed_docs,
            failed_docs,
            "batch run finished"
        );

        Ok(record)
    }
}

fn ratio(part: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        part as f32 / total as f32
    }
}

fn noop_record(namespace: &str) -> RunRecord {
    let mut record = RunRecord::new(namespace, "noop", String::new());
    record.status = RunStatus::Noop;
    record.finished_at = Some(Utc::now());
    record
}

fn locked_record(namespace: &str) -> RunRecord {
    let mut record = RunRecord::new(namespace, "locked", String::new());
    record.status = RunStatus::Locked;
    record.finished_at = Some(Utc::now());
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::db::GraphStore;
    use common::storage::store::testing::TestStorageManager;
    use common::storage::types::ingestion_task::IngestionDocument;
    use common::storage::types::ingestion_task::IngestionTask;
    use common::utils::embedding::NullEmbeddingProvider;
    use ingestion::pipeline::DefaultPipelineServices;
    use ingestion::IngestionPipeline;
    use uuid::Uuid;

    async fn test_orchestrator() -> (Orchestrator, Arc<SurrealDbClient>) {
        let db = Arc::new(SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string()).await.unwrap());
        let graph = Arc::new(GraphStore::from_embedded((*db).clone()));
        let services = Arc::new(DefaultPipelineServices::new(None, "gpt-4o-mini", Arc::new(NullEmbeddingProvider)));
        let pipeline = Arc::new(IngestionPipeline::new(services));
        let test_storage = TestStorageManager::new_memory().await.unwrap();
        let storage = Arc::new(test_storage.clone_storage());
        let data_dir = std::env::temp_dir().join(format!("graphrag_orchestrator_test_{}", Uuid::new_v4()));
        let config = Arc::new(AppConfig {
            data_dir: data_dir.to_string_lossy().to_string(),
            ..AppConfig::default()
        });
        (Orchestrator::new(db.clone(), graph, pipeline, storage, config), db)
    }

    #[tokio::test]
    async fn run_with_no_stale_docs_is_a_noop() {
        let (orchestrator, _db) = test_orchestrator().await;
        let record = orchestrator.run_once("public", RunTrigger::Manual, false).await.unwrap();
        assert_eq!(record.status, RunStatus::Noop);
    }

    #[tokio::test]
    async fn run_indexes_stale_docs_and_marks_success() {
        let (orchestrator, db) = test_orchestrator().await;
        let doc = IngestionDocument {
            doc_id: "doc-1".to_string(),
            namespace: "public".to_string(),
            text: "Ada Lovelace worked with Charles Babbage.".to_string(),
            metadata: serde_json::Map::new(),
            force_heuristic: true,
            disable_embeddings: true,
        };
        IngestionTask::create_and_add_to_db(doc, &db).await.unwrap();

        let record = orchestrator.run_once("public", RunTrigger::Manual, false).await.unwrap();
        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.counters.indexed_docs, 1);
        assert!(record.counters.nodes_new > 0);
    }
}
