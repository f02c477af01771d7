use serde_json::{Map, Value};

use crate::stored_object;

stored_object!(Edge, "edge", {
    source_id: String,
    target_id: String,
    relation: String,
    confidence: f32,
    properties: Map<String, Value>
});

pub const CONTAINS: &str = "CONTAINS";
pub const HAS_ENTITY: &str = "HAS_ENTITY";
pub const MENTIONED_IN: &str = "MENTIONED_IN";
pub const CO_OCCURS: &str = "CO_OCCURS";
pub const ROLE_AT: &str = "ROLE_AT";
pub const USES_TECH: &str = "USES_TECH";

/// Adjacency expansion (§4.6 step 3) only follows these relations.
pub const EXPANSION_RELATIONS: [&str; 4] = [MENTIONED_IN, HAS_ENTITY, ROLE_AT, USES_TECH];

pub const DEFAULT_CONFIDENCE: f32 = 0.6;

impl Edge {
    /// Stable id derived from `(source_id, target_id, relation)` unless
    /// a caller-supplied id is needed (§3 Edge fields).
    pub fn derive_id(source_id: &str, target_id: &str, relation: &str) -> String {
        format!("{source_id}->{relation}->{target_id}")
    }

    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation: impl Into<String>,
        confidence: f32,
    ) -> Self {
        let source_id = source_id.into();
        let target_id = target_id.into();
        let relation = relation.into();
        let now = chrono::Utc::now();
        let id = Self::derive_id(&source_id, &target_id, &relation);
        Edge {
            id,
            created_at: now,
            updated_at: now,
            source_id,
            target_id,
            relation,
            confidence: confidence.clamp(0.0, 1.0),
            properties: Map::new(),
        }
    }

    /// Edge merge preserves max confidence (P3).
    pub fn merge_confidence(&mut self, incoming: f32) {
        self.confidence = self.confidence.max(incoming.clamp(0.0, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_is_stable_for_same_triple() {
        let a = Edge::derive_id("public:openai", "public:microsoft", CO_OCCURS);
        let b = Edge::derive_id("public:openai", "public:microsoft", CO_OCCURS);
        assert_eq!(a, b);
    }

    #[test]
    fn merge_confidence_keeps_the_maximum() {
        let mut edge = Edge::new("a", "b", CO_OCCURS, 0.4);
        edge.merge_confidence(0.8);
        assert_eq!(edge.confidence, 0.8);
        edge.merge_confidence(0.2);
        assert_eq!(edge.confidence, 0.8);
    }

    #[test]
    fn confidence_is_clamped_on_construction() {
        let edge = Edge::new("a", "b", CO_OCCURS, 5.0);
        assert_eq!(edge.confidence, 1.0);
    }
}
