use std::collections::BTreeSet;

use common::error::GraphRagError;
use common::storage::store::StorageManager;

/// Prunes run directories beyond the newest `keep` (spec.md §4.9,
/// `retention_k`, default 7). Run ids are timestamp strings so a
/// lexicographic sort is also a chronological one.
pub async fn prune_old_runs(storage: &StorageManager, namespace: &str, keep: usize) -> Result<Vec<String>, GraphRagError> {
    let prefix = format!("{namespace}/runs/");
    let listed = storage.list(Some(&prefix)).await.map_err(|e| GraphRagError::Fatal(e.to_string()))?;

    let mut run_ids: BTreeSet<String> = BTreeSet::new();
    for meta in &listed {
        let path = meta.location.as_ref();
        if let Some(rest) = path.strip_prefix(&prefix) {
            if let Some(run_dir) = rest.split('/').next() {
                if let Some(run_id) = run_dir.strip_prefix("run-") {
                    run_ids.insert(run_id.to_string());
                }
            }
        }
    }

    let ordered: Vec<String> = run_ids.into_iter().collect();
    let to_prune: Vec<String> = if ordered.len() > keep {
        ordered[..ordered.len() - keep].to_vec()
    } else {
        Vec::new()
    };

    for run_id in &to_prune {
        let run_prefix = format!("{prefix}run-{run_id}");
        storage.delete_prefix(&run_prefix).await.map_err(|e| GraphRagError::Fatal(e.to_string()))?;
    }

    Ok(to_prune)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rundir::{run_prefix, write_marker};
    use common::storage::store::testing::TestStorageManager;
    use common::storage::types::run_record::RunStatus;

    #[tokio::test]
    async fn keeps_only_the_newest_k_runs() {
        let test_storage = TestStorageManager::new_memory().await.unwrap();
        let storage = test_storage.storage();

        for run_id in ["1", "2", "3", "4"] {
            write_marker(storage, "public", run_id, RunStatus::Success).await.unwrap();
        }

        let pruned = prune_old_runs(storage, "public", 2).await.unwrap();
        assert_eq!(pruned, vec!["1".to_string(), "2".to_string()]);

        assert!(!storage.exists(&format!("{}/_SUCCESS", run_prefix("public", "1"))).await.unwrap());
        assert!(storage.exists(&format!("{}/_SUCCESS", run_prefix("public", "3"))).await.unwrap());
        assert!(storage.exists(&format!("{}/_SUCCESS", run_prefix("public", "4"))).await.unwrap());
    }

    #[tokio::test]
    async fn no_pruning_when_under_the_limit() {
        let test_storage = TestStorageManager::new_memory().await.unwrap();
        let storage = test_storage.storage();
        write_marker(storage, "public", "1", RunStatus::Success).await.unwrap();

        let pruned = prune_old_runs(storage, "public", 7).await.unwrap();
        assert!(pruned.is_empty());
    }
}
