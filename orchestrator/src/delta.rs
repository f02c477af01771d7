use common::error::GraphRagError;
use common::storage::db::SurrealDbClient;
use common::storage::types::ingestion_task::IngestionTask;

/// `stale_docs = {doc_id : IngestLog.status in {new, stale}}` (spec.md §4.9).
/// No existing query covers namespace + status on `ingest_log`, so this
/// mirrors `IngestionTask::get_unfinished_tasks`'s ad-hoc query shape.
pub async fn stale_doc_ids(db: &SurrealDbClient, namespace: &str) -> Result<Vec<String>, GraphRagError> {
    let ids: Vec<String> = db
        .client
        .query("SELECT VALUE doc_id FROM ingest_log WHERE namespace = $namespace AND (status = 'new' OR status = 'stale')")
        .bind(("namespace", namespace.to_string()))
        .await?
        .take(0)?;
    Ok(ids)
}

/// Unfinished ingestion tasks (queued or retrying) whose document belongs
/// to this namespace and is in the stale set. A run only drives these
/// through the pipeline, producing delta-only artifacts rather than a
/// full namespace re-ingest.
pub async fn tasks_for_stale_docs(
    db: &SurrealDbClient,
    namespace: &str,
    stale_docs: &[String],
) -> Result<Vec<IngestionTask>, GraphRagError> {
    let unfinished = IngestionTask::get_unfinished_tasks(db).await?;
    Ok(unfinished
        .into_iter()
        .filter(|task| task.content.namespace == namespace && stale_docs.contains(&task.content.doc_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::ingest_log::{IngestLog, IngestStatus};
    use uuid::Uuid;

    #[tokio::test]
    async fn stale_doc_ids_includes_new_and_stale_excludes_indexed() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string()).await.unwrap();

        let mut new_log = IngestLog::new("public", "doc-new", "hash1".to_string());
        new_log.status = IngestStatus::New;
        db.store_item(new_log).await.unwrap();

        let mut stale_log = IngestLog::new("public", "doc-stale", "hash2".to_string());
        stale_log.status = IngestStatus::Stale;
        db.store_item(stale_log).await.unwrap();

        let mut indexed_log = IngestLog::new("public", "doc-indexed", "hash3".to_string());
        indexed_log.status = IngestStatus::Indexed;
        db.store_item(indexed_log).await.unwrap();

        let mut ids = stale_doc_ids(&db, "public").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["doc-new".to_string(), "doc-stale".to_string()]);
    }

    #[tokio::test]
    async fn stale_doc_ids_scoped_to_namespace() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string()).await.unwrap();
        let mut log = IngestLog::new("other_ns", "doc-1", "hash".to_string());
        log.status = IngestStatus::New;
        db.store_item(log).await.unwrap();

        let ids = stale_doc_ids(&db, "public").await.unwrap();
        assert!(ids.is_empty());
    }
}
