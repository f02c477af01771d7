//! Process-shared, persisted embedding cache keyed by `sha256(text)` plus
//! the provider tag (so swapping embedding models invalidates stale hits).
//! Grounded in the content-addressed dedup idiom used for file attachments
//! elsewhere in the storage layer, generalized to embedding vectors.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::GraphRagError;
use crate::storage::db::SurrealDbClient;

const TABLE: &str = "embedding_cache";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEmbedding {
    id: String,
    provider_tag: String,
    vector: Vec<f32>,
}

pub fn cache_key(text: &str, provider_tag: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(provider_tag.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn get(
    db: &SurrealDbClient,
    text: &str,
    provider_tag: &str,
) -> Result<Option<Vec<f32>>, GraphRagError> {
    let key = cache_key(text, provider_tag);
    let record: Option<CachedEmbedding> = db.client.select((TABLE, key.as_str())).await?;
    Ok(record.map(|r| r.vector))
}

pub async fn put(
    db: &SurrealDbClient,
    text: &str,
    provider_tag: &str,
    vector: Vec<f32>,
) -> Result<(), GraphRagError> {
    if vector.is_empty() {
        return Ok(());
    }
    let key = cache_key(text, provider_tag);
    let entry = CachedEmbedding {
        id: key.clone(),
        provider_tag: provider_tag.to_string(),
        vector,
    };
    let _: Option<CachedEmbedding> = db.client.upsert((TABLE, key.as_str())).content(entry).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_and_provider_yields_same_key() {
        let a = cache_key("hello world", "openai:text-embedding-3-small");
        let b = cache_key("hello world", "openai:text-embedding-3-small");
        assert_eq!(a, b);
    }

    #[test]
    fn different_provider_tag_changes_key() {
        let a = cache_key("hello world", "openai:text-embedding-3-small");
        let b = cache_key("hello world", "fastembed:bge-small");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn cache_roundtrip() {
        let db = SurrealDbClient::memory("test", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        assert!(get(&db, "hello", "tag").await.unwrap().is_none());
        put(&db, "hello", "tag", vec![0.1, 0.2, 0.3]).await.unwrap();
        let cached = get(&db, "hello", "tag").await.unwrap();
        assert_eq!(cached, Some(vec![0.1, 0.2, 0.3]));
    }
}
