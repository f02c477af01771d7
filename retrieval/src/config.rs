/// Tunables for the C6 ranking pipeline that aren't part of the
/// per-mode weight tuples (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct RetrievalTuning {
    /// Bounded in-memory candidate sample per namespace.
    pub candidate_sample_cap: usize,
    /// Top-N seeds carried into adjacency expansion.
    pub expansion_seed_count: usize,
    /// Expansion depth from each seed (spec.md caps this at 1).
    pub expansion_depth: u8,
    /// Score multiplier applied to expanded neighbors.
    pub expansion_decay: f32,
}

impl Default for RetrievalTuning {
    fn default() -> Self {
        Self {
            candidate_sample_cap: 1000,
            expansion_seed_count: 20,
            expansion_depth: 1,
            expansion_decay: 0.5,
        }
    }
}
