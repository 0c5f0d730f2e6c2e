//! Email Intelligence core — pure domain types, port traits, and the
//! deterministic math the pipeline depends on (normalization, fingerprints,
//! cluster ids, retention). No `sqlx`, no HTTP clients: the ports in
//! `ports` are the only boundary downstream crates depend on.

pub mod analysis;
pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod ports;
pub mod retention;
pub mod taxonomy;
pub mod types;

pub use error::{PipelineError, Result};
