use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure taxonomy for the pipeline (see spec §7).
///
/// `retryable()` drives whether an outbox row or job worker retries inline
/// or records the error and moves on; it is not itself a retry loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Provider/model RPC failed with a 429 or 5xx, or the connection reset.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Provider/model RPC failed with a 4xx other than 429 (bad request, not
    /// found, forbidden). Retrying without changing the request is pointless.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The model's response did not satisfy the wire contract (wrong number
    /// of lines, no parseable JSON object, an enum value outside the closed
    /// set) after the single stricter-prompt retry allowed by spec §4.2/§4.6.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A row violates a constraint introduced after it was written (e.g. a
    /// legacy `event_type` outside today's closed set). Callers must
    /// normalize in place rather than propagate this as a failure.
    #[error("schema drift: {0}")]
    SchemaDrift(String),

    /// Missing required configuration or an embedding dimension mismatch —
    /// not recoverable within the current process.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Permanent(_) | Self::ContractViolation(_) | Self::SchemaDrift(_) => 422,
            Self::Transient(_) => 503,
            Self::Fatal(_) => 500,
            Self::Internal(_) => 500,
        }
    }
}
