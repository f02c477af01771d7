use serde::{Deserialize, Serialize};

use crate::stored_object;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    New,
    Indexed,
    Stale,
    Failed,
}

stored_object!(IngestLog, "ingest_log", {
    namespace: String,
    doc_id: String,
    content_hash: String,
    first_seen: chrono::DateTime<chrono::Utc>,
    last_indexed_at: Option<chrono::DateTime<chrono::Utc>>,
    status: IngestStatus
});

impl IngestLog {
    pub fn id_for(namespace: &str, doc_id: &str) -> String {
        format!("{namespace}:{doc_id}")
    }

    pub fn new(namespace: &str, doc_id: &str, content_hash: String) -> Self {
        let now = chrono::Utc::now();
        IngestLog {
            id: Self::id_for(namespace, doc_id),
            created_at: now,
            updated_at: now,
            namespace: namespace.to_string(),
            doc_id: doc_id.to_string(),
            content_hash,
            first_seen: now,
            last_indexed_at: None,
            status: IngestStatus::New,
        }
    }
}
