use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use serde::Serialize;
use tracing::warn;

use crate::Passage;

const SYSTEM_PROMPT: &str = "You answer questions using only the supplied context passages. \
Cite nothing beyond what the context supports. If the context is insufficient, say so plainly.";

#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    pub passages: Vec<Passage>,
    /// Rough token budget for the passages folded into the prompt.
    pub budget_tokens: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerResult {
    pub answer_text: String,
    pub contributing_node_ids: Vec<String>,
    pub error: Option<String>,
}

const AVG_CHARS_PER_TOKEN: usize = 4;

/// Folds passages into the prompt until `budget_tokens` (approximated at
/// `AVG_CHARS_PER_TOKEN` chars/token) is exhausted, preserving retrieval
/// order so the highest-ranked passages are favored (spec.md §4.7).
fn budget_passages(passages: &[Passage], budget_tokens: usize) -> Vec<&Passage> {
    let budget_chars = budget_tokens.saturating_mul(AVG_CHARS_PER_TOKEN);
    let mut used = 0;
    let mut kept = Vec::new();
    for passage in passages {
        used += passage.text.len();
        kept.push(passage);
        if used >= budget_chars {
            break;
        }
    }
    kept
}

fn contributing_ids(passages: &[&Passage]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    for passage in passages {
        if seen.insert(passage.node_id.clone()) {
            ids.push(passage.node_id.clone());
        }
    }
    ids
}

/// C7 answer synthesis. Never returns `Err`: an LLM failure, or the
/// absence of a configured client, degrades to retrieval-only output
/// (empty `answer_text`, populated `contributing_node_ids`).
pub async fn synthesize_answer(
    client: Option<&Client<OpenAIConfig>>,
    model: &str,
    request: AnswerRequest,
) -> AnswerResult {
    let budgeted = budget_passages(&request.passages, request.budget_tokens);
    let contributing_node_ids = contributing_ids(&budgeted);

    let Some(client) = client else {
        return AnswerResult {
            answer_text: String::new(),
            contributing_node_ids,
            error: None,
        };
    };

    let context: String = budgeted
        .iter()
        .map(|passage| format!("[{}] {}", passage.node_id, passage.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let user_message = format!(
        "Context passages:\n==================\n{context}\n\nQuestion:\n==================\n{}",
        request.question
    );

    let chat_request = match CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .build()
    {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "failed to build answer synthesis request");
            return AnswerResult {
                answer_text: String::new(),
                contributing_node_ids,
                error: Some(err.to_string()),
            };
        }
    };

    match client.chat().create(chat_request).await {
        Ok(response) => {
            let answer_text = response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .unwrap_or_default();
            AnswerResult {
                answer_text,
                contributing_node_ids,
                error: None,
            }
        }
        Err(err) => {
            warn!(error = %err, "answer synthesis call failed, degrading to retrieval-only");
            AnswerResult {
                answer_text: String::new(),
                contributing_node_ids,
                error: Some(err.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: &str, text: &str) -> Passage {
        Passage { node_id: id.to_string(), text: text.to_string(), score: 1.0 }
    }

    #[tokio::test]
    async fn no_client_returns_empty_answer_with_contributing_ids() {
        let passages = vec![passage("n1", "OpenAI collaborates with Microsoft.")];
        let result = synthesize_answer(
            None,
            "gpt-4o-mini",
            AnswerRequest { question: "Who does OpenAI work with?".into(), passages, budget_tokens: 1000 },
        )
        .await;

        assert!(result.answer_text.is_empty());
        assert_eq!(result.contributing_node_ids, vec!["n1".to_string()]);
        assert!(result.error.is_none());
    }

    #[test]
    fn budget_passages_stops_once_char_budget_exhausted() {
        let passages = vec![passage("n1", &"a".repeat(20)), passage("n2", &"b".repeat(20))];
        let kept = budget_passages(&passages, 4);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn contributing_ids_dedupes_preserving_order() {
        let passages = vec![passage("n1", "x"), passage("n2", "y"), passage("n1", "z")];
        let refs: Vec<&Passage> = passages.iter().collect();
        assert_eq!(contributing_ids(&refs), vec!["n1".to_string(), "n2".to_string()]);
    }
}
