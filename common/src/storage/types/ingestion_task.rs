use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use surrealdb::{opt::PatchOp, Notification};
use uuid::Uuid;

use crate::storage::types::ingest_log::IngestLog;
use crate::{error::GraphRagError, storage::db::SurrealDbClient, stored_object};

/// Document payload for one queued ingestion task (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionDocument {
    pub doc_id: String,
    pub namespace: String,
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub force_heuristic: bool,
    pub disable_embeddings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum IngestionTaskStatus {
    Created,
    InProgress {
        attempts: u32,
        last_attempt: DateTime<Utc>,
    },
    Completed,
    Error(String),
    Cancelled,
}

stored_object!(IngestionTask, "job", {
    content: IngestionDocument,
    status: IngestionTaskStatus
});

pub const MAX_ATTEMPTS: u32 = 3;

impl IngestionTask {
    pub fn new(content: IngestionDocument) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            status: IngestionTaskStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Queues the task and, if this document has no `ingest_log` entry yet,
    /// seeds one with `status: New` so the batch orchestrator's delta
    /// selection (`stale_docs`, spec.md §4.9) can see it before any
    /// pipeline run has touched it. Returns the stored task so a caller
    /// that wants synchronous results can hand it straight to the pipeline
    /// instead of waiting for the worker loop to poll it up.
    pub async fn create_and_add_to_db(
        content: IngestionDocument,
        db: &SurrealDbClient,
    ) -> Result<Self, GraphRagError> {
        let log_id = IngestLog::id_for(&content.namespace, &content.doc_id);
        let existing: Option<IngestLog> = db.get_item(&log_id).await?;
        if existing.is_none() {
            let log = IngestLog::new(&content.namespace, &content.doc_id, String::new());
            db.store_item(log).await?;
        }

        let job = Self::new(content);
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    pub async fn update_status(
        id: &str,
        status: IngestionTaskStatus,
        db: &SurrealDbClient,
    ) -> Result<(), GraphRagError> {
        let _job: Option<Self> = db
            .client
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/status", status))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::sql::Datetime::default(),
            ))
            .await?;

        Ok(())
    }

    pub async fn listen_for_tasks(
        db: &SurrealDbClient,
    ) -> Result<impl Stream<Item = Result<Notification<Self>, surrealdb::Error>>, surrealdb::Error>
    {
        db.listen::<Self>().await
    }

    /// Newly created tasks and in-progress tasks that haven't exhausted
    /// their retry budget (§7 `transient`: retried up to 3x).
    pub async fn get_unfinished_tasks(db: &SurrealDbClient) -> Result<Vec<Self>, GraphRagError> {
        let jobs: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
             WHERE
                status = 'Created'
                OR (
                    status.InProgress != NONE
                    AND status.InProgress.attempts < $max_attempts
                )
             ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("max_attempts", MAX_ATTEMPTS))
            .await?
            .take(0)?;

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_document(doc_id: &str) -> IngestionDocument {
        IngestionDocument {
            doc_id: doc_id.to_string(),
            namespace: "public".to_string(),
            text: "OpenAI collaborates with Microsoft.".to_string(),
            metadata: serde_json::Map::new(),
            force_heuristic: false,
            disable_embeddings: false,
        }
    }

    #[test]
    fn new_ingestion_task_starts_created() {
        let task = IngestionTask::new(test_document("d1"));
        assert!(matches!(task.status, IngestionTaskStatus::Created));
        assert!(!task.id.is_empty());
    }

    #[tokio::test]
    async fn create_and_add_to_db_persists_the_task() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        IngestionTask::create_and_add_to_db(test_document("d1"), &db)
            .await
            .expect("store task");

        let all: Vec<IngestionTask> = db.get_all_stored_items().await.expect("select all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content.doc_id, "d1");
    }

    #[tokio::test]
    async fn update_status_transitions_to_in_progress() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let task = IngestionTask::new(test_document("d1"));
        let task_id = task.id.clone();
        db.store_item(task).await.expect("store task");

        IngestionTask::update_status(
            &task_id,
            IngestionTaskStatus::InProgress {
                attempts: 1,
                last_attempt: Utc::now(),
            },
            &db,
        )
        .await
        .expect("update status");

        let updated: IngestionTask = db
            .get_item(&task_id)
            .await
            .expect("fetch task")
            .expect("task exists");
        assert!(matches!(
            updated.status,
            IngestionTaskStatus::InProgress { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn get_unfinished_tasks_excludes_completed_and_exhausted() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let created = IngestionTask::new(test_document("d1"));

        let mut in_progress = IngestionTask::new(test_document("d2"));
        in_progress.status = IngestionTaskStatus::InProgress {
            attempts: 1,
            last_attempt: Utc::now(),
        };

        let mut exhausted = IngestionTask::new(test_document("d3"));
        exhausted.status = IngestionTaskStatus::InProgress {
            attempts: MAX_ATTEMPTS,
            last_attempt: Utc::now(),
        };

        let mut completed = IngestionTask::new(test_document("d4"));
        completed.status = IngestionTaskStatus::Completed;

        db.store_item(created).await.unwrap();
        db.store_item(in_progress).await.unwrap();
        db.store_item(exhausted).await.unwrap();
        db.store_item(completed).await.unwrap();

        let unfinished = IngestionTask::get_unfinished_tasks(&db).await.unwrap();
        assert_eq!(unfinished.len(), 2);
        assert!(unfinished.iter().any(|t| t.content.doc_id == "d1"));
        assert!(unfinished.iter().any(|t| t.content.doc_id == "d2"));
    }
}
