//! Job registry: tracks in-flight and recently-finished jobs, spawns their
//! worker tasks, and hands out status snapshots + SSE subscriptions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::broadcaster::{JobBroadcaster, JobEventReceiver};
use crate::id;
use crate::kind::JobKind;
use crate::status::{estimate_eta_seconds, ErrorSample, ErrorSampleRing, JobState, JobStatus};

/// Recently-finished jobs are kept around this long after completion so a
/// client that was mid-subscribe doesn't see the job vanish.
const RECENT_HISTORY_CAP: usize = 200;

pub struct JobHandle {
    id: String,
    kind: JobKind,
    started: Instant,
    inner: std::sync::Mutex<JobStatus>,
    errors: std::sync::Mutex<ErrorSampleRing>,
    broadcaster: JobBroadcaster,
}

impl JobHandle {
    fn new(id: String, kind: JobKind) -> Self {
        let now = Utc::now();
        JobHandle {
            id: id.clone(),
            kind,
            started: Instant::now(),
            inner: std::sync::Mutex::new(JobStatus::new(id, kind, now)),
            errors: std::sync::Mutex::new(ErrorSampleRing::default()),
            broadcaster: JobBroadcaster::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Seeds the new subscription with the job's current snapshot so a
    /// client that subscribes mid-run or after completion still sees a
    /// status immediately, and marks it closed up front if the job has
    /// already reached a terminal state (rather than relying on a past
    /// `close()` call, which only reaches subscribers that existed at the
    /// time it ran).
    pub fn subscribe(&self) -> JobEventReceiver {
        let snapshot = self.snapshot();
        let already_closed = matches!(snapshot.state, JobState::Succeeded | JobState::Failed);
        self.broadcaster.subscribe(snapshot, already_closed)
    }

    pub fn snapshot(&self) -> JobStatus {
        self.inner.lock().unwrap().clone()
    }

    pub fn set_total_estimate(&self, total: u64) {
        self.mutate(|s| s.total_estimate = Some(total));
    }

    pub fn set_phase(&self, phase: &str) {
        self.mutate(|s| {
            s.state = JobState::Running;
            s.phase = phase.to_string();
        });
    }

    pub fn inc_processed(&self, n: u64) {
        self.mutate(|s| s.counters.processed += n);
    }

    pub fn inc_inserted(&self, n: u64) {
        self.mutate(|s| s.counters.inserted += n);
    }

    pub fn inc_skipped_existing(&self, n: u64) {
        self.mutate(|s| s.counters.skipped_existing += n);
    }

    pub fn record_error(&self, message_id: Option<String>, error: impl Into<String>) {
        let sample = ErrorSample { message_id, error: error.into() };
        self.errors.lock().unwrap().push(sample);
        self.mutate(|s| s.counters.failed += 1);
    }

    pub fn finish_succeeded(&self, message: Option<String>) {
        self.mutate(|s| {
            s.state = JobState::Succeeded;
            s.phase = "done".to_string();
            s.message = message;
        });
        self.broadcaster.close();
    }

    pub fn finish_failed(&self, message: impl Into<String>) {
        self.mutate(|s| {
            s.state = JobState::Failed;
            s.phase = "done".to_string();
            s.message = Some(message.into());
        });
        self.broadcaster.close();
    }

    fn mutate(&self, f: impl FnOnce(&mut JobStatus)) {
        let mut status = {
            let mut guard = self.inner.lock().unwrap();
            f(&mut guard);
            guard.updated_at = Utc::now();
            guard.error_samples = self.errors.lock().unwrap().to_vec();
            guard.eta_seconds =
                estimate_eta_seconds(guard.counters.processed, guard.total_estimate, self.started.elapsed());
            guard.clone()
        };
        status.kind = self.kind;
        self.broadcaster.publish(status);
    }
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobHandle>>>,
    history_order: std::sync::Mutex<std::collections::VecDeque<String>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry::default()
    }

    /// Registers a new job and spawns `work` against its handle. `work`
    /// owns the handle and reports progress through it; the registry marks
    /// the job failed if `work` returns an error or finished if `work`
    /// itself calls `finish_succeeded`/`finish_failed` explicitly.
    pub async fn spawn<F, Fut>(&self, kind: JobKind, work: F) -> String
    where
        F: FnOnce(Arc<JobHandle>) -> Fut + Send + 'static,
        Fut: Future<Output = ei_core::Result<()>> + Send + 'static,
    {
        let job_id = id::generate(kind, Utc::now());
        let handle = Arc::new(JobHandle::new(job_id.clone(), kind));

        self.jobs.write().await.insert(job_id.clone(), handle.clone());
        self.push_history(job_id.clone()).await;

        let spawned_handle = handle.clone();
        tokio::spawn(async move {
            let result = work(spawned_handle.clone()).await;
            if let Err(err) = result {
                if spawned_handle.snapshot().state != JobState::Succeeded {
                    spawned_handle.finish_failed(err.to_string());
                }
            } else if spawned_handle.snapshot().state == JobState::Running
                || spawned_handle.snapshot().state == JobState::Queued
            {
                spawned_handle.finish_succeeded(None);
            }
        });

        job_id
    }

    pub async fn get(&self, job_id: &str) -> Option<Arc<JobHandle>> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn list_recent(&self, limit: usize) -> Vec<JobStatus> {
        let order = self.history_order.lock().unwrap().clone();
        let jobs = self.jobs.read().await;
        order.iter().rev().take(limit).filter_map(|id| jobs.get(id)).map(|h| h.snapshot()).collect()
    }

    async fn push_history(&self, job_id: String) {
        let evicted_ids: Vec<String> = {
            let mut order = self.history_order.lock().unwrap();
            order.push_back(job_id);
            let mut evicted_ids = Vec::new();
            while order.len() > RECENT_HISTORY_CAP {
                if let Some(evicted_id) = order.pop_front() {
                    evicted_ids.push(evicted_id);
                }
            }
            evicted_ids
        };
        if !evicted_ids.is_empty() {
            let mut jobs = self.jobs.write().await;
            for evicted_id in evicted_ids {
                jobs.remove(&evicted_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_job_reaches_succeeded_and_broadcasts_progress() {
        let registry = JobRegistry::new();
        let job_id = registry
            .spawn(JobKind::Ingest, |handle| async move {
                handle.set_phase("paging");
                handle.inc_processed(3);
                handle.inc_inserted(3);
                Ok(())
            })
            .await;

        // Give the spawned task a chance to run to completion.
        for _ in 0..50 {
            if registry.get(&job_id).await.unwrap().snapshot().state == JobState::Succeeded {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let status = registry.get(&job_id).await.unwrap().snapshot();
        assert_eq!(status.state, JobState::Succeeded);
        assert_eq!(status.counters.processed, 3);
        assert_eq!(status.counters.inserted, 3);
    }

    #[tokio::test]
    async fn spawned_job_records_error_and_marks_failed_on_err() {
        let registry = JobRegistry::new();
        let job_id = registry
            .spawn(JobKind::TrashSync, |handle| async move {
                handle.record_error(Some("m1".to_string()), "boom");
                Err(ei_core::PipelineError::Fatal("boom".to_string()))
            })
            .await;

        for _ in 0..50 {
            if registry.get(&job_id).await.unwrap().snapshot().state == JobState::Failed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let status = registry.get(&job_id).await.unwrap().snapshot();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error_samples.len(), 1);
    }

    #[tokio::test]
    async fn subscriber_sees_terminal_update() {
        let registry = JobRegistry::new();
        let job_id = registry
            .spawn(JobKind::Ingest, |handle| async move {
                handle.set_phase("paging");
                Ok(())
            })
            .await;

        let handle = registry.get(&job_id).await.unwrap();
        let mut receiver = handle.subscribe();
        let mut last = None;
        while let Some(status) = receiver.recv().await {
            last = Some(status);
        }
        assert_eq!(last.unwrap().state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn subscribing_after_job_already_finished_still_yields_terminal_status() {
        let registry = JobRegistry::new();
        let job_id = registry
            .spawn(JobKind::Ingest, |handle| async move {
                handle.set_phase("paging");
                Ok(())
            })
            .await;

        let handle = registry.get(&job_id).await.unwrap();
        for _ in 0..50 {
            if handle.snapshot().state == JobState::Succeeded {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(handle.snapshot().state, JobState::Succeeded);

        // Subscribing only now, well after the job reached a terminal
        // state, must not hang waiting on a `close()` that already ran.
        let mut receiver = handle.subscribe();
        let first = receiver.recv().await.unwrap();
        assert_eq!(first.state, JobState::Succeeded);
        assert!(receiver.recv().await.is_none());
    }
}
