#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunker;
pub mod extractor;
pub mod pipeline;

use std::sync::Arc;

use common::storage::{
    db::GraphStore,
    db::SurrealDbClient,
    types::ingestion_task::{IngestionTask, IngestionTaskStatus},
};
pub use pipeline::{IngestOutcome, IngestionConfig, IngestionPipeline, IngestionTuning};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Polls for unfinished tasks and drives each through the pipeline
/// (spec.md §4.5, §5 worker model). Tasks are claimed optimistically by
/// flipping their status to `InProgress` before processing; a crash
/// mid-task leaves it `InProgress` and it is picked back up on the next
/// poll since `get_unfinished_tasks` doesn't distinguish a fresh attempt
/// from a resumed one.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    graph: Arc<GraphStore>,
    pipeline: Arc<IngestionPipeline>,
    poll_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match IngestionTask::get_unfinished_tasks(&db).await {
            Ok(tasks) if tasks.is_empty() => {
                sleep(poll_interval).await;
            }
            Ok(tasks) => {
                for task in tasks {
                    let task_id = task.id.clone();
                    info!(%task_id, "claimed ingestion task");
                    if let Err(err) = pipeline.process_task(&db, &graph, task).await {
                        error!(%task_id, error = %err, "ingestion task failed");
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to list unfinished ingestion tasks, backing off");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Marks a task `InProgress` before the pipeline touches it, bumping the
/// attempt counter for the retry-budget check in `get_unfinished_tasks`.
pub(crate) async fn mark_in_progress(
    db: &SurrealDbClient,
    task: &IngestionTask,
) -> Result<u32, common::error::GraphRagError> {
    let attempts = match &task.status {
        IngestionTaskStatus::InProgress { attempts, .. } => attempts.saturating_add(1),
        _ => 1,
    };
    IngestionTask::update_status(
        &task.id,
        IngestionTaskStatus::InProgress {
            attempts,
            last_attempt: chrono::Utc::now(),
        },
        db,
    )
    .await?;
    Ok(attempts)
}
