use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stored_object;

/// Closed label set from the data model (§3). LLM-classified entities
/// that don't map cleanly still land in `Entity`; the other variants are
/// reserved for the heuristic classifier's regex families and the
/// section/chunk structural nodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum NodeLabel {
    Entity,
    Technology,
    Organization,
    Role,
    Achievement,
    Section,
    Chunk,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Entity => "Entity",
            NodeLabel::Technology => "Technology",
            NodeLabel::Organization => "Organization",
            NodeLabel::Role => "Role",
            NodeLabel::Achievement => "Achievement",
            NodeLabel::Section => "Section",
            NodeLabel::Chunk => "Chunk",
        }
    }
}

stored_object!(Node, "node", {
    label: NodeLabel,
    name: String,
    namespace: String,
    embedding: Option<Vec<f32>>,
    properties: Map<String, Value>
});

impl Node {
    /// `(namespace, label, normalized_name)` identity for entity-like nodes.
    pub fn entity_id(namespace: &str, name: &str) -> String {
        format!("{namespace}:{}", name.trim().to_lowercase())
    }

    pub fn chunk_id(namespace: &str, doc_id: &str, chunk_index: u32) -> String {
        format!("{namespace}:{doc_id}:{chunk_index}")
    }

    pub fn section_id(namespace: &str, doc_id: &str, section_path: &str) -> String {
        format!("{namespace}:{doc_id}:{section_path}")
    }

    pub fn new_entity(namespace: &str, label: NodeLabel, name: &str) -> Self {
        let now = chrono::Utc::now();
        Node {
            id: Self::entity_id(namespace, name),
            created_at: now,
            updated_at: now,
            label,
            name: name.to_string(),
            namespace: namespace.to_string(),
            embedding: None,
            properties: Map::new(),
        }
    }

    pub fn degree(&self) -> f64 {
        self.properties
            .get("degree")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn importance(&self) -> f64 {
        self.properties
            .get("importance")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn pagerank_norm(&self) -> f64 {
        self.properties
            .get("pagerank_norm")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    pub fn degree_norm(&self) -> f64 {
        self.properties
            .get("degree_norm")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// Non-destructive property union used by `upsert_node` merges (§4.1):
    /// existing keys win unless the incoming value is the `source_ids`
    /// accumulator, which is appended to instead of replaced.
    pub fn merge_properties(&mut self, incoming: &Map<String, Value>) {
        for (key, value) in incoming {
            if key == "source_ids" {
                let mut existing: Vec<Value> = self
                    .properties
                    .get("source_ids")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                if let Some(incoming_ids) = value.as_array() {
                    for id in incoming_ids {
                        if !existing.contains(id) {
                            existing.push(id.clone());
                        }
                    }
                }
                self.properties
                    .insert("source_ids".to_string(), Value::Array(existing));
            } else {
                self.properties.entry(key.clone()).or_insert(value.clone());
            }
        }
    }

    /// Embeddings may only be overwritten when the incoming vector carries
    /// a strictly higher quality signal (§3 identity invariants).
    pub fn merge_embedding(&mut self, incoming: Option<Vec<f32>>) {
        match (&self.embedding, incoming) {
            (None, Some(new)) if !new.is_empty() => self.embedding = Some(new),
            (Some(existing), Some(new)) if existing.is_empty() && !new.is_empty() => {
                self.embedding = Some(new)
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_namespace_and_lowercased_name() {
        assert_eq!(Node::entity_id("public", "OpenAI"), "public:openai");
        assert_eq!(Node::entity_id("public", "  Microsoft  "), "public:microsoft");
    }

    #[test]
    fn chunk_id_is_namespace_doc_and_index() {
        assert_eq!(Node::chunk_id("public", "d1", 3), "public:d1:3");
    }

    #[test]
    fn merge_properties_unions_source_ids_without_duplicates() {
        let mut node = Node::new_entity("public", NodeLabel::Entity, "OpenAI");
        node.properties.insert(
            "source_ids".to_string(),
            Value::Array(vec![Value::String("d1".into())]),
        );
        let mut incoming = Map::new();
        incoming.insert(
            "source_ids".to_string(),
            Value::Array(vec![Value::String("d1".into()), Value::String("d2".into())]),
        );
        node.merge_properties(&incoming);
        let ids = node.properties.get("source_ids").unwrap().as_array().unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn merge_embedding_only_replaces_empty_with_non_empty() {
        let mut node = Node::new_entity("public", NodeLabel::Entity, "OpenAI");
        node.merge_embedding(Some(vec![]));
        assert_eq!(node.embedding, None);
        node.merge_embedding(Some(vec![0.1, 0.2]));
        assert_eq!(node.embedding, Some(vec![0.1, 0.2]));
        node.merge_embedding(Some(vec![9.9]));
        assert_eq!(node.embedding, Some(vec![0.1, 0.2]));
    }
}
