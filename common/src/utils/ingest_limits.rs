use super::config::AppConfig;
use crate::error::GraphRagError;

/// Validates a single `/ingest` request body before it enters the pipeline.
pub fn validate_ingest_input(
    config: &AppConfig,
    doc_id: &str,
    text: &str,
) -> Result<(), GraphRagError> {
    if doc_id.trim().is_empty() {
        return Err(GraphRagError::Validation("doc_id is required".into()));
    }
    if text.is_empty() {
        return Err(GraphRagError::Validation("text is required".into()));
    }
    if text.len() > config.ingest_max_content_bytes {
        return Err(GraphRagError::Validation(format!(
            "text is too large; maximum allowed is {} bytes",
            config.ingest_max_content_bytes
        )));
    }
    Ok(())
}

/// Validates a `/ingest-batch` request body (§6: at most 100 documents).
pub fn validate_batch_size(config: &AppConfig, document_count: usize) -> Result<(), GraphRagError> {
    if document_count == 0 {
        return Err(GraphRagError::Validation(
            "documents must not be empty".into(),
        ));
    }
    if document_count > config.ingest_batch_max_docs {
        return Err(GraphRagError::Validation(format!(
            "batch of {document_count} documents exceeds the maximum of {}",
            config.ingest_batch_max_docs
        )));
    }
    Ok(())
}

pub fn validate_file_count(config: &AppConfig, file_count: usize) -> Result<(), GraphRagError> {
    if file_count > config.ingest_max_files {
        return Err(GraphRagError::Validation(format!(
            "too many files; maximum allowed is {}",
            config.ingest_max_files
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_doc_id() {
        let config = AppConfig::default();
        let result = validate_ingest_input(&config, "", "hello");
        assert!(matches!(result, Err(GraphRagError::Validation(_))));
    }

    #[test]
    fn rejects_missing_text() {
        let config = AppConfig::default();
        let result = validate_ingest_input(&config, "d1", "");
        assert!(matches!(result, Err(GraphRagError::Validation(_))));
    }

    #[test]
    fn rejects_oversized_text() {
        let config = AppConfig {
            ingest_max_content_bytes: 4,
            ..Default::default()
        };
        let result = validate_ingest_input(&config, "d1", "12345");
        assert!(matches!(result, Err(GraphRagError::Validation(_))));
    }

    #[test]
    fn accepts_valid_payload() {
        let config = AppConfig::default();
        assert!(validate_ingest_input(&config, "d1", "hello").is_ok());
    }

    #[test]
    fn rejects_batches_over_the_cap() {
        let config = AppConfig::default();
        assert!(validate_batch_size(&config, 101).is_err());
        assert!(validate_batch_size(&config, 100).is_ok());
        assert!(validate_batch_size(&config, 0).is_err());
    }
}
