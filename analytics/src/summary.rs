use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use sha2::{Digest, Sha256};
use tracing::warn;

use common::storage::types::cluster::ClusterSummary;

use crate::budget::DailyTokenBudget;

const SYSTEM_PROMPT: &str =
    "You label a cluster of related entities. Respond with a label of 12 words or fewer, \
a blank line, then a two-sentence summary. No markdown, no preamble.";

/// Estimated prompt+completion cost per summarization call, reserved
/// against the daily budget before the request is sent (the actual
/// response token count isn't known until after the call completes).
const ESTIMATED_TOKENS_PER_SUMMARY: u64 = 400;

pub fn cache_key(cluster_id: &str, top_terms: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cluster_id.as_bytes());
    for term in top_terms {
        hasher.update(b"|");
        hasher.update(term.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Cluster summarization (spec.md §4.8). Given `top_terms` and up to 10
/// sample entity names, asks the LLM for a short label and summary.
/// Returns `None` (not an error) when no client is configured or the
/// daily token budget is exhausted, since summaries are an optional
/// enrichment, not load-bearing for retrieval.
pub async fn summarize_cluster(
    client: Option<&Client<OpenAIConfig>>,
    model: &str,
    budget: &DailyTokenBudget,
    cluster_id: &str,
    top_terms: &[String],
    sample_entity_names: &[String],
) -> Option<ClusterSummary> {
    let client = client?;
    let key = cache_key(cluster_id, top_terms);

    if !budget.try_consume(ESTIMATED_TOKENS_PER_SUMMARY) {
        warn!(cluster_id, "cluster summary skipped, daily token budget exhausted");
        return None;
    }

    let user_message = format!(
        "Top terms: {}\nSample entities: {}",
        top_terms.join(", "),
        sample_entity_names.join(", "),
    );

    let request = match CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .build()
    {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, cluster_id, "failed to build cluster summary request");
            return None;
        }
    };

    match client.chat().create(request).await {
        Ok(response) => {
            let content = response.choices.first().and_then(|choice| choice.message.content.clone())?;
            let mut parts = content.splitn(2, "\n\n");
            let label = parts.next().unwrap_or_default().trim().to_string();
            let summary = parts.next().unwrap_or_default().trim().to_string();
            Some(ClusterSummary { label, summary, cache_key: key })
        }
        Err(err) => {
            warn!(error = %err, cluster_id, "cluster summary call failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_changes_when_top_terms_change() {
        let a = cache_key("c1", &["rust".to_string(), "async".to_string()]);
        let b = cache_key("c1", &["rust".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_is_stable_for_same_inputs() {
        let a = cache_key("c1", &["rust".to_string()]);
        let b = cache_key("c1", &["rust".to_string()]);
        assert_eq!(a, b);
    }
}
