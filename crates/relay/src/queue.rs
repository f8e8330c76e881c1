//! FIFO relay queue with a single consumer.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use {
    crosstalk_channels::RelayPayload,
    tokio::sync::{Notify, watch},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use crosstalk_metrics::{counter, gauge, relay as relay_metrics};

use crate::{Error, Result};

/// One message's fan-out work. Immutable once queued.
#[derive(Debug)]
pub struct RelayJob {
    pub id: u64,
    pub payload: Arc<RelayPayload>,
    pub origin_group_id: String,
    pub enqueued_at: Instant,
}

/// Ordered job buffer between producers and the dispatcher.
///
/// `enqueue` never waits on delivery. Jobs are counted as outstanding from
/// enqueue until the dispatcher settles (or drops) them, which is what
/// [`wait_idle`](Self::wait_idle) observes.
pub struct RelayQueue {
    jobs: Mutex<VecDeque<RelayJob>>,
    wake: Notify,
    closed: AtomicBool,
    next_id: AtomicU64,
    outstanding: watch::Sender<usize>,
}

impl Default for RelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            outstanding: watch::Sender::new(0),
        }
    }

    /// Append a job to the tail and wake the dispatcher. Returns the job id.
    pub fn enqueue(&self, payload: RelayPayload, origin_group_id: &str) -> Result<u64> {
        if self.is_closed() {
            return Err(Error::QueueClosed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let depth = {
            let mut jobs = self.lock();
            jobs.push_back(RelayJob {
                id,
                payload: Arc::new(payload),
                origin_group_id: origin_group_id.to_string(),
                enqueued_at: Instant::now(),
            });
            jobs.len()
        };
        self.outstanding.send_modify(|n| *n += 1);
        self.wake.notify_one();

        #[cfg(feature = "metrics")]
        {
            counter!(relay_metrics::JOBS_ENQUEUED_TOTAL).increment(1);
            gauge!(relay_metrics::QUEUE_DEPTH).set(depth as f64);
        }
        debug!(job_id = id, origin = origin_group_id, depth, "relay job enqueued");
        Ok(id)
    }

    /// Pop the head job without waiting.
    pub fn pop(&self) -> Option<RelayJob> {
        let job = self.lock().pop_front();
        #[cfg(feature = "metrics")]
        if job.is_some() {
            gauge!(relay_metrics::QUEUE_DEPTH).set(self.depth() as f64);
        }
        job
    }

    /// Wait for the next job. Returns `None` once closed and empty.
    pub async fn next(&self) -> Option<RelayJob> {
        loop {
            if let Some(job) = self.pop() {
                return Some(job);
            }
            if self.is_closed() {
                return None;
            }
            self.wake.notified().await;
        }
    }

    /// Jobs waiting to be dispatched. The job in flight is not counted.
    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    /// Stop accepting jobs. Queued jobs stay until drained or dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark one popped job as fully handled.
    pub fn settle(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Remove and settle every queued job. Returns how many were dropped.
    pub fn drop_remaining(&self) -> usize {
        let dropped: Vec<RelayJob> = self.lock().drain(..).collect();
        let count = dropped.len();
        if count > 0 {
            self.outstanding
                .send_modify(|n| *n = n.saturating_sub(count));
        }
        count
    }

    /// Forget every outstanding job, e.g. after the worker was aborted.
    pub fn settle_all(&self) {
        self.outstanding.send_replace(0);
    }

    /// Jobs enqueued but not yet settled, including the one in flight.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once every enqueued job has settled.
    pub async fn wait_idle(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RelayJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crosstalk_channels::InboundMessage, std::time::Duration};

    fn payload(text: &str) -> RelayPayload {
        RelayPayload::from_inbound(&InboundMessage::default(), text)
    }

    #[test]
    fn depth_grows_by_exactly_n() {
        let queue = RelayQueue::new();
        for i in 0..5 {
            queue.enqueue(payload(&format!("m{i}")), "g1").unwrap();
        }
        assert_eq!(queue.depth(), 5);
        assert_eq!(queue.outstanding(), 5);
    }

    #[test]
    fn pops_in_fifo_order() {
        let queue = RelayQueue::new();
        let a = queue.enqueue(payload("a"), "g1").unwrap();
        let b = queue.enqueue(payload("b"), "g2").unwrap();
        assert!(a < b);
        let first = queue.pop().unwrap();
        assert_eq!(first.id, a);
        assert_eq!(first.payload.content, "a");
        assert_eq!(queue.pop().unwrap().origin_group_id, "g2");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn closed_queue_refuses_jobs() {
        let queue = RelayQueue::new();
        queue.close();
        assert!(matches!(
            queue.enqueue(payload("x"), "g1"),
            Err(Error::QueueClosed)
        ));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn next_wakes_on_enqueue() {
        let queue = Arc::new(RelayQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await.map(|j| j.payload.content.clone()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(payload("late"), "g1").unwrap();
        assert_eq!(consumer.await.unwrap().as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn next_returns_none_when_closed_and_empty() {
        let queue = RelayQueue::new();
        queue.enqueue(payload("a"), "g1").unwrap();
        queue.close();
        assert!(queue.next().await.is_some());
        assert!(queue.next().await.is_none());
    }

    #[tokio::test]
    async fn wait_idle_tracks_settled_jobs() {
        let queue = Arc::new(RelayQueue::new());
        queue.enqueue(payload("a"), "g1").unwrap();
        queue.enqueue(payload("b"), "g1").unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.wait_idle().await })
        };
        queue.pop().unwrap();
        queue.settle();
        assert!(!waiter.is_finished());
        assert_eq!(queue.drop_remaining(), 1);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.outstanding(), 0);
    }
}
