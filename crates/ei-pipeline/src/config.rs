//! Pure configuration values consumed by every pipeline operation. Parsing
//! these from the environment is `ei-cli`'s job (`EMAIL_INTEL_`-prefixed
//! vars) — this crate never reads the process environment itself.

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub similarity_threshold: f64,
    pub labeler_version: String,
    pub vector_version: String,
    /// Below this unlabelled-backlog size, per-message labeling (C7) is used
    /// instead of clustering (C6).
    pub per_message_threshold: i64,
    pub retention_default_days: i32,
    /// Preferred provider-side label name for archived messages, tried in
    /// order; {"Archive", "Archived"} are commonly provider-reserved.
    pub archive_label_candidates: Vec<String>,
    pub max_unlabelled_per_run: i64,
    /// Pacing delay between successive outbox rows, to stay polite to the
    /// provider API.
    pub outbox_row_delay_ms: u64,
    /// Backoff before the single inline retry after a transient outbox push
    /// failure. Distinct from `outbox_row_delay_ms`: a transient failure
    /// should back off longer than routine inter-row pacing.
    pub transient_retry_delay_ms: u64,
    pub vector_neighbor_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            labeler_version: "v1".to_string(),
            vector_version: "v1".to_string(),
            per_message_threshold: 20,
            retention_default_days: ei_core::retention::FALLBACK_RETENTION_DAYS,
            archive_label_candidates: vec!["Email Archive".to_string(), "Archived Mail".to_string()],
            max_unlabelled_per_run: 500,
            outbox_row_delay_ms: 50,
            transient_retry_delay_ms: 250,
            vector_neighbor_k: 20,
        }
    }
}
