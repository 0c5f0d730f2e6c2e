//! Bounded per-subscriber SSE broadcaster (spec §5). Deliberately not
//! `tokio::sync::broadcast`: that primitive has no per-subscriber bound and
//! a slow subscriber would apply backpressure to the publishing worker,
//! which must never block on SSE delivery. Each subscriber gets its own
//! capacity-25 ring that drops the oldest queued snapshot on overflow.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::status::JobStatus;

const SUBSCRIBER_CAPACITY: usize = 25;

struct Subscriber {
    buffer: Mutex<VecDeque<JobStatus>>,
    notify: Notify,
    closed: Mutex<bool>,
}

pub struct JobBroadcaster {
    subscribers: Mutex<Vec<std::sync::Arc<Subscriber>>>,
}

impl Default for JobBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBroadcaster {
    pub fn new() -> Self {
        JobBroadcaster { subscribers: Mutex::new(Vec::new()) }
    }

    /// Registers a new subscriber seeded with `initial` so a client that
    /// subscribes after the job has already progressed (or already
    /// finished) still sees a snapshot instead of only future deltas.
    /// `already_closed` must reflect the job's terminal state *at the
    /// moment of subscribing* — a `close()` call that already ran before
    /// this subscriber existed would otherwise never reach it.
    pub fn subscribe(&self, initial: JobStatus, already_closed: bool) -> JobEventReceiver {
        let mut buffer = VecDeque::new();
        buffer.push_back(initial);
        let subscriber = std::sync::Arc::new(Subscriber {
            buffer: Mutex::new(buffer),
            notify: Notify::new(),
            closed: Mutex::new(already_closed),
        });
        self.subscribers.lock().unwrap().push(subscriber.clone());
        JobEventReceiver { subscriber }
    }

    pub fn publish(&self, status: JobStatus) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            let mut buffer = subscriber.buffer.lock().unwrap();
            if buffer.len() >= SUBSCRIBER_CAPACITY {
                buffer.pop_front();
            }
            buffer.push_back(status.clone());
            drop(buffer);
            subscriber.notify.notify_one();
        }
    }

    /// Marks every outstanding subscriber closed so `recv` stops waiting
    /// once its buffer drains — called after the job reaches a terminal
    /// state and its final snapshot has been published.
    pub fn close(&self) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            *subscriber.closed.lock().unwrap() = true;
            subscriber.notify.notify_one();
        }
    }
}

pub struct JobEventReceiver {
    subscriber: std::sync::Arc<Subscriber>,
}

impl JobEventReceiver {
    pub async fn recv(&mut self) -> Option<JobStatus> {
        loop {
            if let Some(status) = self.subscriber.buffer.lock().unwrap().pop_front() {
                return Some(status);
            }
            if *self.subscriber.closed.lock().unwrap() {
                return None;
            }
            self.subscriber.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::JobKind;
    use chrono::Utc;

    fn sample(id: &str) -> JobStatus {
        JobStatus::new(id.to_string(), JobKind::Ingest, Utc::now())
    }

    #[tokio::test]
    async fn subscriber_receives_published_snapshots_in_order() {
        let broadcaster = JobBroadcaster::new();
        let mut receiver = broadcaster.subscribe(sample("job-0"), false);

        broadcaster.publish(sample("job-1"));
        broadcaster.publish(sample("job-2"));

        assert_eq!(receiver.recv().await.unwrap().id, "job-0");
        assert_eq!(receiver.recv().await.unwrap().id, "job-1");
        assert_eq!(receiver.recv().await.unwrap().id, "job-2");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_not_newest() {
        let broadcaster = JobBroadcaster::new();
        let mut receiver = broadcaster.subscribe(sample("seed"), false);
        receiver.recv().await;

        for i in 0..30 {
            broadcaster.publish(sample(&format!("job-{i}")));
        }

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.id, "job-5");
    }

    #[tokio::test]
    async fn recv_returns_none_after_close_and_drain() {
        let broadcaster = JobBroadcaster::new();
        let mut receiver = broadcaster.subscribe(sample("seed"), false);
        receiver.recv().await;

        broadcaster.publish(sample("job-1"));
        broadcaster.close();

        assert_eq!(receiver.recv().await.unwrap().id, "job-1");
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribing_after_close_yields_seed_then_closes_immediately() {
        let broadcaster = JobBroadcaster::new();
        broadcaster.publish(sample("job-1"));
        broadcaster.close();

        let mut receiver = broadcaster.subscribe(sample("final"), true);
        assert_eq!(receiver.recv().await.unwrap().id, "final");
        assert!(receiver.recv().await.is_none());
    }
}
