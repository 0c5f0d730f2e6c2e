//! The point-in-time snapshot broadcast over SSE and returned by job-control
//! read endpoints (spec §4.7).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::JobKind;

const MAX_ERROR_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCounters {
    pub processed: u64,
    pub inserted: u64,
    pub skipped_existing: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSample {
    pub message_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub kind: JobKind,
    pub state: JobState,
    pub phase: String,
    pub counters: JobCounters,
    pub message: Option<String>,
    pub error_samples: Vec<ErrorSample>,
    /// Seconds until estimated completion; `None` until at least one item
    /// has been processed (rate is undefined at zero elapsed work).
    pub eta_seconds: Option<f64>,
    pub total_estimate: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn new(id: String, kind: JobKind, now: DateTime<Utc>) -> Self {
        JobStatus {
            id,
            kind,
            state: JobState::Queued,
            phase: "queued".to_string(),
            counters: JobCounters::default(),
            message: None,
            error_samples: Vec::new(),
            eta_seconds: None,
            total_estimate: None,
            started_at: now,
            updated_at: now,
        }
    }
}

/// Bounded ring (≤ `MAX_ERROR_SAMPLES`) that drops the oldest sample on
/// overflow — a job that fails on every row must not grow memory unbounded.
#[derive(Debug, Default)]
pub struct ErrorSampleRing {
    samples: VecDeque<ErrorSample>,
}

impl ErrorSampleRing {
    pub fn push(&mut self, sample: ErrorSample) {
        if self.samples.len() >= MAX_ERROR_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn to_vec(&self) -> Vec<ErrorSample> {
        self.samples.iter().cloned().collect()
    }
}

/// `remaining / rate` where `rate = processed / elapsed`. Returns `None`
/// when no work has been processed yet (rate is undefined at zero elapsed).
pub fn estimate_eta_seconds(processed: u64, total: Option<u64>, elapsed: std::time::Duration) -> Option<f64> {
    let total = total?;
    if processed == 0 || elapsed.as_secs_f64() <= 0.0 {
        return None;
    }
    let rate = processed as f64 / elapsed.as_secs_f64();
    if rate <= 0.0 {
        return None;
    }
    let remaining = total.saturating_sub(processed) as f64;
    Some(remaining / rate)
}
