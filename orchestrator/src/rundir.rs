use bytes::Bytes;
use common::error::GraphRagError;
use common::storage::store::StorageManager;
use common::storage::types::run_record::RunStatus;

/// Run-directory layout is a flat object prefix per run, not a real
/// directory tree, so it reads the same whether the backend is local
/// disk or an in-memory store (spec.md §4.9).
pub fn run_prefix(namespace: &str, run_id: &str) -> String {
    format!("{namespace}/runs/run-{run_id}")
}

fn marker_name(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "_RUNNING",
        RunStatus::Success => "_SUCCESS",
        RunStatus::Partial => "_PARTIAL",
        RunStatus::Failed => "_FAILED",
        RunStatus::ImportFailed => "_IMPORT_FAILED",
        RunStatus::Noop | RunStatus::Locked => "_NOOP",
    }
}

pub async fn write_marker(storage: &StorageManager, namespace: &str, run_id: &str, status: RunStatus) -> Result<(), GraphRagError> {
    let location = format!("{}/{}", run_prefix(namespace, run_id), marker_name(status));
    storage.put(&location, Bytes::new()).await.map_err(|e| GraphRagError::Fatal(e.to_string()))?;
    Ok(())
}

pub async fn clear_marker(storage: &StorageManager, namespace: &str, run_id: &str, status: RunStatus) -> Result<(), GraphRagError> {
    let location = format!("{}/{}", run_prefix(namespace, run_id), marker_name(status));
    storage.delete_prefix(&location).await.map_err(|e| GraphRagError::Fatal(e.to_string()))?;
    Ok(())
}

pub async fn write_artifact(
    storage: &StorageManager,
    namespace: &str,
    run_id: &str,
    name: &str,
    payload: &impl serde::Serialize,
) -> Result<(), GraphRagError> {
    let bytes = Bytes::from(serde_json::to_vec(payload)?);
    let location = format!("{}/{name}", run_prefix(namespace, run_id));
    storage.put(&location, bytes).await.map_err(|e| GraphRagError::Fatal(e.to_string()))?;
    Ok(())
}

/// Points `latest` at a finished run. A local backend gets a real
/// filesystem symlink (replaced atomically via rename); `object_store`
/// has no symlink primitive for a memory backend, so that case falls
/// back to a pointer object holding the run id as its body.
pub async fn promote_latest(storage: &StorageManager, namespace: &str, run_id: &str) -> Result<(), GraphRagError> {
    if let Some(base) = storage.local_base_path() {
        let namespace_dir = base.join(namespace);
        tokio::fs::create_dir_all(&namespace_dir).await?;
        let run_dir = namespace_dir.join(format!("runs/run-{run_id}"));
        let latest_link = namespace_dir.join("runs/latest");
        let tmp_link = namespace_dir.join("runs/.latest.tmp");

        #[cfg(unix)]
        {
            let _ = tokio::fs::remove_file(&tmp_link).await;
            tokio::fs::symlink(&run_dir, &tmp_link).await?;
            tokio::fs::rename(&tmp_link, &latest_link).await?;
        }
        #[cfg(not(unix))]
        {
            let _ = run_dir;
            let location = format!("{namespace}/runs/latest");
            storage
                .put(&location, Bytes::from(run_id.to_string()))
                .await
                .map_err(|e| GraphRagError::Fatal(e.to_string()))?;
        }
        Ok(())
    } else {
        let location = format!("{namespace}/runs/latest");
        storage
            .put(&location, Bytes::from(run_id.to_string()))
            .await
            .map_err(|e| GraphRagError::Fatal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::store::testing::TestStorageManager;

    #[tokio::test]
    async fn marker_lifecycle_writes_and_clears() {
        let test_storage = TestStorageManager::new_memory().await.unwrap();
        let storage = test_storage.storage();

        write_marker(storage, "public", "1", RunStatus::Running).await.unwrap();
        assert!(storage.exists(&format!("{}/_RUNNING", run_prefix("public", "1"))).await.unwrap());

        clear_marker(storage, "public", "1", RunStatus::Running).await.unwrap();
        write_marker(storage, "public", "1", RunStatus::Success).await.unwrap();
        assert!(!storage.exists(&format!("{}/_RUNNING", run_prefix("public", "1"))).await.unwrap());
        assert!(storage.exists(&format!("{}/_SUCCESS", run_prefix("public", "1"))).await.unwrap());
    }

    #[tokio::test]
    async fn promote_latest_on_memory_backend_writes_pointer_object() {
        let test_storage = TestStorageManager::new_memory().await.unwrap();
        let storage = test_storage.storage();
        promote_latest(storage, "public", "42").await.unwrap();
        let body = storage.get("public/runs/latest").await.unwrap();
        assert_eq!(body.as_ref(), b"42");
    }
}
