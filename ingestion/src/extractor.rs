//! Entity/relation extraction from a chunk or section (C3): an LLM path
//! with structured output, and a deterministic heuristic fallback.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;
use common::error::GraphRagError;
use common::storage::types::edge::{CO_OCCURS, ROLE_AT, USES_TECH};
use common::storage::types::node::NodeLabel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub label: NodeLabel,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelation {
    pub source_name: String,
    pub target_name: String,
    pub relation: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMode {
    Llm,
    Heuristic,
    ForceHeuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTag {
    Llm,
    Heuristic,
    HeuristicFallback,
}

impl ExtractionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionTag::Llm => "llm",
            ExtractionTag::Heuristic => "heuristic",
            ExtractionTag::HeuristicFallback => "heuristic_fallback",
        }
    }
}

pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relations: Vec<ExtractedRelation>,
    pub tag: ExtractionTag,
}

#[derive(Debug, Deserialize)]
struct LlmExtraction {
    entities: Vec<LlmEntity>,
    relations: Vec<LlmRelation>,
}

#[derive(Debug, Deserialize)]
struct LlmEntity {
    name: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct LlmRelation {
    source_name: String,
    target_name: String,
    relation: String,
    confidence: f32,
}

const SYSTEM_PROMPT: &str = "You extract entities and relations from a passage of text. \
Return every entity you find with one of the labels Entity, Technology, Organization, Role, \
Achievement, Section, or Chunk, and every relation you can support between them with a \
confidence between 0 and 1.";

fn extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "label": {"type": "string"}
                    },
                    "required": ["name", "label"]
                }
            },
            "relations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source_name": {"type": "string"},
                        "target_name": {"type": "string"},
                        "relation": {"type": "string"},
                        "confidence": {"type": "number"}
                    },
                    "required": ["source_name", "target_name", "relation", "confidence"]
                }
            }
        },
        "required": ["entities", "relations"]
    })
}

fn normalize_label(raw: &str) -> NodeLabel {
    match raw.to_lowercase().as_str() {
        "technology" => NodeLabel::Technology,
        "organization" => NodeLabel::Organization,
        "role" => NodeLabel::Role,
        "achievement" => NodeLabel::Achievement,
        "section" => NodeLabel::Section,
        "chunk" => NodeLabel::Chunk,
        _ => NodeLabel::Entity,
    }
}

/// Runs LLM extraction over `text`, falling back to `extract_heuristic`
/// (tagged `heuristic_fallback`) on any provider failure (spec.md §4.3).
pub async fn extract_llm(
    client: &Client<OpenAIConfig>,
    model: &str,
    text: &str,
) -> ExtractionResult {
    match extract_llm_inner(client, model, text).await {
        Ok((entities, relations)) => ExtractionResult {
            entities,
            relations,
            tag: ExtractionTag::Llm,
        },
        Err(_) => {
            let mut fallback = extract_heuristic(text);
            fallback.tag = ExtractionTag::HeuristicFallback;
            fallback
        }
    }
}

async fn extract_llm_inner(
    client: &Client<OpenAIConfig>,
    model: &str,
    text: &str,
) -> Result<(Vec<ExtractedEntity>, Vec<ExtractedRelation>), GraphRagError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some("Entities and relations extracted from a passage".into()),
            name: "passage_extraction".into(),
            schema: Some(extraction_schema()),
            strict: Some(true),
        },
    };

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(text).into(),
        ])
        .response_format(response_format)
        .build()
        .map_err(|err| GraphRagError::ProviderFailure(err.to_string()))?;

    let response = client
        .chat()
        .create(request)
        .await
        .map_err(GraphRagError::Provider)?;

    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .ok_or_else(|| GraphRagError::ProviderFailure("no content in LLM response".into()))?;

    let parsed: LlmExtraction = serde_json::from_str(&content)?;
    Ok(validate_and_normalize(parsed))
}

fn validate_and_normalize(
    parsed: LlmExtraction,
) -> (Vec<ExtractedEntity>, Vec<ExtractedRelation>) {
    let mut seen = HashMap::new();
    let mut entities = Vec::new();
    for entity in parsed.entities {
        let name = entity.name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        let key = name.to_lowercase();
        if seen.insert(key, ()).is_some() {
            continue;
        }
        entities.push(ExtractedEntity {
            name,
            label: normalize_label(&entity.label),
            confidence: 1.0,
        });
    }

    let relations = parsed
        .relations
        .into_iter()
        .filter(|r| !r.source_name.trim().is_empty() && !r.target_name.trim().is_empty())
        .map(|r| ExtractedRelation {
            source_name: r.source_name.trim().to_string(),
            target_name: r.target_name.trim().to_string(),
            relation: r.relation,
            confidence: r.confidence.clamp(0.0, 1.0),
        })
        .collect();

    (entities, relations)
}

fn capitalized_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*){1,4})\b").expect("valid regex")
    })
}

fn technology_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\w+(\.js|DB))\b").expect("valid regex"))
}

fn organization_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][\w&.,-]*(?:\s+[A-Z][\w&.,-]*)*\s+(?:Inc|Ltd|Corp|University)\.?)\b")
            .expect("valid regex")
    })
}

fn role_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:[A-Z][a-z]+\s+)?[A-Z][a-z]+\s+(Engineer|Manager|Scientist)\b")
            .expect("valid regex")
    })
}

fn achievement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(launched|shipped|led|awarded)\b\s+([A-Za-z0-9 ]{3,60})")
            .expect("valid regex")
    })
}

/// Deterministic regex-based extraction used for `heuristic`/
/// `force_heuristic` modes and as the LLM failure fallback.
pub fn extract_heuristic(text: &str) -> ExtractionResult {
    let mut entities: HashMap<String, ExtractedEntity> = HashMap::new();

    let mut insert = |name: &str, label: NodeLabel| {
        let key = name.to_lowercase();
        entities
            .entry(key)
            .or_insert_with(|| ExtractedEntity {
                name: name.to_string(),
                label,
                confidence: 0.5,
            });
    };

    for caps in technology_suffix_re().captures_iter(text) {
        insert(&caps[1], NodeLabel::Technology);
    }
    for caps in organization_suffix_re().captures_iter(text) {
        insert(caps[1].trim(), NodeLabel::Organization);
    }
    for caps in role_re().captures_iter(text) {
        insert(caps[0].trim(), NodeLabel::Role);
    }
    for caps in achievement_re().captures_iter(text) {
        insert(caps[2].trim(), NodeLabel::Achievement);
    }
    for caps in capitalized_phrase_re().captures_iter(text) {
        let phrase = caps[1].trim();
        let word_count = phrase.split_whitespace().count();
        if (2..=5).contains(&word_count) {
            insert(phrase, NodeLabel::Entity);
        }
    }

    let entities: Vec<ExtractedEntity> = entities.into_values().collect();

    let mut relations = Vec::new();
    for role in entities.iter().filter(|e| e.label == NodeLabel::Role) {
        for org in entities.iter().filter(|e| e.label == NodeLabel::Organization) {
            relations.push(ExtractedRelation {
                source_name: role.name.clone(),
                target_name: org.name.clone(),
                relation: ROLE_AT.to_string(),
                confidence: role.confidence.min(org.confidence),
            });
        }
    }
    for subject in entities
        .iter()
        .filter(|e| matches!(e.label, NodeLabel::Role | NodeLabel::Organization))
    {
        for tech in entities.iter().filter(|e| e.label == NodeLabel::Technology) {
            relations.push(ExtractedRelation {
                source_name: subject.name.clone(),
                target_name: tech.name.clone(),
                relation: USES_TECH.to_string(),
                confidence: subject.confidence.min(tech.confidence),
            });
        }
    }

    ExtractionResult {
        entities,
        relations,
        tag: ExtractionTag::Heuristic,
    }
}

/// Re-derives `CO_OCCURS` pairs for every distinct entity pair found in
/// the same chunk (spec.md §4.3), confidence set to the lower of the two.
pub fn derive_co_occurrence(entities: &[ExtractedEntity]) -> Vec<ExtractedRelation> {
    let mut pairs = Vec::new();
    for (i, a) in entities.iter().enumerate() {
        for b in entities.iter().skip(i + 1) {
            pairs.push(ExtractedRelation {
                source_name: a.name.clone(),
                target_name: b.name.clone(),
                relation: CO_OCCURS.to_string(),
                confidence: a.confidence.min(b.confidence),
            });
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_detects_technology_by_suffix() {
        let result = extract_heuristic("We migrated the service to Node.js and MongoDB last quarter.");
        assert!(result
            .entities
            .iter()
            .any(|e| e.label == NodeLabel::Technology));
    }

    #[test]
    fn heuristic_derives_role_at_organization() {
        let result = extract_heuristic("Jane Smith worked as a Senior Engineer at Acme Inc.");
        assert!(result
            .relations
            .iter()
            .any(|r| r.relation == ROLE_AT));
    }

    #[test]
    fn co_occurrence_pairs_use_minimum_confidence() {
        let entities = vec![
            ExtractedEntity {
                name: "Acme".into(),
                label: NodeLabel::Organization,
                confidence: 0.9,
            },
            ExtractedEntity {
                name: "Kafka".into(),
                label: NodeLabel::Technology,
                confidence: 0.4,
            },
        ];
        let pairs = derive_co_occurrence(&entities);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].confidence, 0.4);
    }

    #[test]
    fn validate_and_normalize_drops_empty_names_and_dedupes() {
        let parsed = LlmExtraction {
            entities: vec![
                LlmEntity {
                    name: "  ".into(),
                    label: "Entity".into(),
                },
                LlmEntity {
                    name: "OpenAI".into(),
                    label: "Organization".into(),
                },
                LlmEntity {
                    name: "openai".into(),
                    label: "Organization".into(),
                },
            ],
            relations: vec![],
        };
        let (entities, _) = validate_and_normalize(parsed);
        assert_eq!(entities.len(), 1);
    }
}
