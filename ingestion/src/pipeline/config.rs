use crate::chunker::{CHUNK_MAX_CHARS, CHUNK_MIN_CHARS};

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,
    pub retry_backoff_cap_exponent: u32,
    pub graph_store_attempts: usize,
    pub graph_initial_backoff_ms: u64,
    pub graph_max_backoff_ms: u64,
    pub chunk_min_chars: usize,
    pub chunk_max_chars: usize,
    pub mentioned_in_cap_embedded: usize,
    pub mentioned_in_cap_graph: usize,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            retry_base_delay_secs: 30,
            retry_max_delay_secs: 15 * 60,
            retry_backoff_cap_exponent: 5,
            graph_store_attempts: 3,
            graph_initial_backoff_ms: 50,
            graph_max_backoff_ms: 800,
            chunk_min_chars: CHUNK_MIN_CHARS,
            chunk_max_chars: CHUNK_MAX_CHARS,
            mentioned_in_cap_embedded: 10,
            mentioned_in_cap_graph: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
    /// Set when the graph backend (not just the embedded fallback) is
    /// configured; tightens the `MENTIONED_IN` cap (spec.md §4.3).
    pub graph_backend_configured: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            tuning: IngestionTuning::default(),
            graph_backend_configured: false,
        }
    }
}

impl IngestionConfig {
    pub fn mentioned_in_cap(&self) -> usize {
        if self.graph_backend_configured {
            self.tuning.mentioned_in_cap_graph
        } else {
            self.tuning.mentioned_in_cap_embedded
        }
    }
}
