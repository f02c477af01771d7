mod config;
mod context;
mod services;
mod stages;
mod state;

pub use config::{IngestionConfig, IngestionTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::sync::Arc;
use std::time::Duration;

use common::error::GraphRagError;
use common::events::EventBus;
use common::storage::db::{GraphStore, SurrealDbClient};
use common::storage::types::ingest_log::{IngestLog, IngestStatus};
use common::storage::types::ingestion_task::{IngestionTask, IngestionTaskStatus, MAX_ATTEMPTS};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use self::context::PipelineContext;
use self::state::ready;

/// Synchronous ingestion result (spec.md §6 `POST /ingest` response).
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestOutcome {
    pub status: String,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub chunks: usize,
    pub extraction_mode: String,
}

#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    pipeline_config: IngestionConfig,
    services: Arc<dyn PipelineServices>,
    events: Option<Arc<EventBus>>,
}

impl IngestionPipeline {
    pub fn new(services: Arc<dyn PipelineServices>) -> Self {
        Self::new_with_config(services, IngestionConfig::default())
    }

    pub fn new_with_config(services: Arc<dyn PipelineServices>, pipeline_config: IngestionConfig) -> Self {
        Self::with_services(services, pipeline_config, None)
    }

    pub fn with_services(
        services: Arc<dyn PipelineServices>,
        pipeline_config: IngestionConfig,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            pipeline_config,
            services,
            events,
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let tuning = &self.pipeline_config.tuning;
        let capped_attempt = attempt
            .saturating_sub(1)
            .min(tuning.retry_backoff_cap_exponent);
        let multiplier = 2_u64.pow(capped_attempt);
        let delay = tuning.retry_base_delay_secs.saturating_mul(multiplier);
        Duration::from_secs(delay.min(tuning.retry_max_delay_secs))
    }

    /// Drives one queued task through the pipeline (spec.md §4.5). Returns
    /// `Ok(())` whether the document was freshly indexed or skipped as a
    /// `NOOP` against an unchanged content hash; only genuine stage
    /// failures return `Err`.
    #[tracing::instrument(skip_all, fields(task_id = %task.id, doc_id = %task.content.doc_id))]
    pub async fn process_task(
        &self,
        db: &SurrealDbClient,
        graph: &GraphStore,
        task: IngestionTask,
    ) -> Result<IngestOutcome, GraphRagError> {
        let attempts = crate::mark_in_progress(db, &task).await?;

        let mut hasher = Sha256::new();
        hasher.update(task.content.text.as_bytes());
        let content_hash = format!("{:x}", hasher.finalize());

        let log_id = IngestLog::id_for(&task.content.namespace, &task.content.doc_id);
        let existing: Option<IngestLog> = db.get_item(&log_id).await?;
        if let Some(log) = &existing {
            if log.content_hash == content_hash && log.status == IngestStatus::Indexed {
                info!(task_id = %task.id, doc_id = %task.content.doc_id, "content hash unchanged, skipping as noop");
                IngestionTask::update_status(&task.id, IngestionTaskStatus::Completed, db).await?;
                return Ok(IngestOutcome {
                    status: "noop".to_string(),
                    nodes_created: 0,
                    edges_created: 0,
                    chunks: 0,
                    extraction_mode: "cached".to_string(),
                });
            }
        }

        match self.drive_pipeline(db, graph, &task).await {
            Ok(outcome) => {
                IngestionTask::update_status(&task.id, IngestionTaskStatus::Completed, db).await?;
                info!(task_id = %task.id, doc_id = %task.content.doc_id, "ingestion task succeeded");
                Ok(outcome)
            }
            Err(err) => {
                let reason = err.to_string();
                let retryable = !matches!(err, GraphRagError::Validation(_));

                if retryable && attempts < MAX_ATTEMPTS {
                    let delay = self.retry_delay(attempts);
                    IngestionTask::update_status(
                        &task.id,
                        IngestionTaskStatus::InProgress {
                            attempts,
                            last_attempt: chrono::Utc::now(),
                        },
                        db,
                    )
                    .await?;
                    warn!(
                        task_id = %task.id,
                        attempt = attempts,
                        retry_in_secs = delay.as_secs(),
                        error = %reason,
                        "ingestion task failed; eligible for retry"
                    );
                } else {
                    IngestionTask::update_status(
                        &task.id,
                        IngestionTaskStatus::Error(reason.clone()),
                        db,
                    )
                    .await?;
                    let now = chrono::Utc::now();
                    let failed_log = IngestLog {
                        id: log_id,
                        created_at: existing.as_ref().map_or(now, |l| l.created_at),
                        updated_at: now,
                        namespace: task.content.namespace.clone(),
                        doc_id: task.content.doc_id.clone(),
                        content_hash: existing.as_ref().map_or_else(String::new, |l| l.content_hash.clone()),
                        first_seen: existing.as_ref().map_or(now, |l| l.first_seen),
                        last_indexed_at: existing.and_then(|l| l.last_indexed_at),
                        status: IngestStatus::Failed,
                    };
                    let _: Option<IngestLog> = db
                        .client
                        .upsert(("ingest_log", failed_log.id.as_str()))
                        .content(failed_log)
                        .await?;
                    warn!(
                        task_id = %task.id,
                        attempt = attempts,
                        error = %reason,
                        "ingestion task failed permanently"
                    );
                }

                Err(err)
            }
        }
    }

    async fn drive_pipeline(
        &self,
        db: &SurrealDbClient,
        graph: &GraphStore,
        task: &IngestionTask,
    ) -> Result<IngestOutcome, GraphRagError> {
        let mut ctx = PipelineContext::new(
            task.id.clone(),
            task.content.clone(),
            &self.pipeline_config,
            self.services.as_ref(),
        );

        let machine = ready();

        let machine = stages::hash_content(machine, &mut ctx).map_err(|err| ctx.abort(err))?;
        let machine = stages::section(machine, &mut ctx).map_err(|err| ctx.abort(err))?;
        let machine = stages::extract(machine, &mut ctx).await.map_err(|err| ctx.abort(err))?;
        let machine = stages::embed(machine, &mut ctx, db).await.map_err(|err| ctx.abort(err))?;
        let (_machine, nodes_created, edges_created) =
            stages::persist(machine, &mut ctx, db, graph, self.events.as_deref())
                .await
                .map_err(|err| ctx.abort(err))?;

        Ok(IngestOutcome {
            status: "indexed".to_string(),
            nodes_created,
            edges_created,
            chunks: ctx.chunks.len(),
            extraction_mode: ctx.extraction_tag.map_or_else(|| "none".to_string(), |tag| tag.as_str().to_string()),
        })
    }
}
