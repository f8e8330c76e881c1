//! The single relay worker: drains the queue one job at a time and fans
//! each job out to every live destination except its origin.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    crosstalk_channels::{DeliveryError, EndpointHandle},
    tokio::task::{JoinHandle, JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use crosstalk_metrics::{counter, histogram, labels, relay as relay_metrics};

use crate::{
    queue::{RelayJob, RelayQueue},
    registry::DestinationRegistry,
};

/// Pause between two jobs to stay under downstream rate limits.
pub const INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Whether the worker is currently draining jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Running,
}

/// What happened to one job's fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: u64,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub invalidated: Vec<String>,
}

struct DeliveryOutcome {
    group_id: String,
    endpoint_id: String,
    result: Result<(), DeliveryError>,
}

pub struct Dispatcher {
    queue: Arc<RelayQueue>,
    registry: Arc<DestinationRegistry>,
    batch_delay: Duration,
    started: AtomicBool,
    running: AtomicBool,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(queue: Arc<RelayQueue>, registry: Arc<DestinationRegistry>) -> Arc<Self> {
        Self::with_batch_delay(queue, registry, INTER_BATCH_DELAY)
    }

    pub fn with_batch_delay(
        queue: Arc<RelayQueue>,
        registry: Arc<DestinationRegistry>,
        batch_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            registry,
            batch_delay,
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        })
    }

    /// Spawn the worker. Only the first call starts one; later calls return `false`.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let dispatcher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            dispatcher.run().await;
        });
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        info!("relay dispatcher started");
        true
    }

    pub fn state(&self) -> DispatcherState {
        if self.running.load(Ordering::SeqCst) {
            DispatcherState::Running
        } else {
            DispatcherState::Idle
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            let job = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                job = self.queue.next() => job,
            };
            let Some(job) = job else { break };

            self.running.store(true, Ordering::SeqCst);
            let report = self.dispatch(&job).await;
            if self.queue.depth() == 0 {
                self.running.store(false, Ordering::SeqCst);
            }
            self.queue.settle();
            debug!(
                job_id = report.job_id,
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                "relay job settled"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.batch_delay) => {},
            }
        }

        self.running.store(false, Ordering::SeqCst);
        let dropped = self.queue.drop_remaining();
        if dropped > 0 {
            warn!(dropped, "relay dispatcher stopped with queued jobs");
        }
        info!("relay dispatcher stopped");
    }

    /// Fan one job out and wait until every attempt settled.
    ///
    /// The destination set is refreshed from the store first, so admin
    /// changes made by other processes apply from the next job on.
    /// Attempts run concurrently and never cancel each other. Endpoints that
    /// report themselves gone are invalidated as their attempts complete.
    pub async fn dispatch(&self, job: &RelayJob) -> JobReport {
        self.registry.reconcile_pending().await;
        if let Err(e) = self.registry.sync_with_store().await {
            warn!(
                job_id = job.id,
                error = %e,
                "store unavailable, dispatching to cached destinations"
            );
        }

        let targets: Vec<(String, EndpointHandle)> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|(group_id, _)| *group_id != job.origin_group_id)
            .collect();

        let mut report = JobReport {
            job_id: job.id,
            attempted: targets.len(),
            ..JobReport::default()
        };

        let mut deliveries = JoinSet::new();
        for (group_id, handle) in targets {
            let payload = Arc::clone(&job.payload);
            deliveries.spawn(async move {
                let result = handle.deliver(&payload).await;
                DeliveryOutcome {
                    group_id,
                    endpoint_id: handle.id().to_string(),
                    result,
                }
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.failed += 1;
                    warn!(job_id = job.id, error = %e, "delivery task aborted");
                    continue;
                },
            };
            match outcome.result {
                Ok(()) => {
                    report.delivered += 1;
                    #[cfg(feature = "metrics")]
                    counter!(relay_metrics::DELIVERIES_TOTAL).increment(1);
                },
                Err(e) => {
                    report.failed += 1;
                    #[cfg(feature = "metrics")]
                    {
                        let kind = if e.is_endpoint_gone() {
                            "gone"
                        } else {
                            "transient"
                        };
                        counter!(relay_metrics::DELIVERY_ERRORS_TOTAL, labels::KIND => kind)
                            .increment(1);
                    }
                    if e.is_endpoint_gone() {
                        warn!(
                            job_id = job.id,
                            group_id = %outcome.group_id,
                            error = %e,
                            "delivery endpoint gone"
                        );
                        if self
                            .registry
                            .invalidate_endpoint(&outcome.group_id, &outcome.endpoint_id)
                            .await
                        {
                            report.invalidated.push(outcome.group_id);
                        }
                    } else {
                        warn!(
                            job_id = job.id,
                            group_id = %outcome.group_id,
                            error = %e,
                            "delivery failed, dropping for this job"
                        );
                    }
                },
            }
        }

        #[cfg(feature = "metrics")]
        {
            counter!(relay_metrics::JOBS_DRAINED_TOTAL).increment(1);
            histogram!(relay_metrics::JOB_LATENCY_SECONDS)
                .record(job.enqueued_at.elapsed().as_secs_f64());
        }
        report
    }

    /// Stop the worker: finish the job in flight, drop the rest.
    ///
    /// The queue must already be closed to new jobs. Aborts the worker if it
    /// has not stopped within `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut handle) = handle else {
            self.queue.drop_remaining();
            return;
        };
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "relay dispatcher did not stop in time, aborting"
            );
            handle.abort();
            self.running.store(false, Ordering::SeqCst);
            self.queue.drop_remaining();
            // The aborted job never settles on its own.
            self.queue.settle_all();
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{FakeFailure, FakeProvider, InMemoryRelayStore},
        crosstalk_channels::{InboundMessage, RelayPayload},
    };

    struct Fixture {
        queue: Arc<RelayQueue>,
        registry: Arc<DestinationRegistry>,
        provider: Arc<FakeProvider>,
        dispatcher: Arc<Dispatcher>,
    }

    async fn fixture(groups: &[&str]) -> Fixture {
        let store = Arc::new(InMemoryRelayStore::new());
        let provider = Arc::new(FakeProvider::new());
        let registry = Arc::new(DestinationRegistry::new(store, provider.clone()));
        for g in groups {
            registry.enable(g, &format!("{g}-relay")).await.unwrap();
        }
        let queue = Arc::new(RelayQueue::new());
        let dispatcher =
            Dispatcher::with_batch_delay(queue.clone(), registry.clone(), Duration::from_millis(1));
        Fixture {
            queue,
            registry,
            provider,
            dispatcher,
        }
    }

    fn payload(text: &str) -> RelayPayload {
        RelayPayload::from_inbound(&InboundMessage::default(), text)
    }

    #[tokio::test]
    async fn skips_origin() {
        let f = fixture(&["g1", "g2", "g3"]).await;
        f.queue.enqueue(payload("hi"), "g1").unwrap();
        let job = f.queue.pop().unwrap();

        let report = f.dispatcher.dispatch(&job).await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert!(f.provider.deliveries_to("g1").is_empty());
        assert_eq!(f.provider.deliveries_to("g2").len(), 1);
        assert_eq!(f.provider.deliveries_to("g3").len(), 1);
    }

    #[tokio::test]
    async fn failure_is_isolated_per_destination() {
        let f = fixture(&["g1", "g2", "g3", "g4"]).await;
        f.provider
            .endpoint_for("g2")
            .unwrap()
            .fail_with(Some(FakeFailure::Transient));
        f.provider
            .endpoint_for("g3")
            .unwrap()
            .fail_with(Some(FakeFailure::RateLimited));
        f.queue.enqueue(payload("hi"), "g1").unwrap();
        let job = f.queue.pop().unwrap();

        let report = f.dispatcher.dispatch(&job).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert!(report.invalidated.is_empty());
        assert_eq!(f.registry.live_endpoint_count(), 4);
    }

    #[tokio::test]
    async fn gone_endpoint_is_invalidated() {
        let f = fixture(&["g1", "g2"]).await;
        f.provider
            .endpoint_for("g2")
            .unwrap()
            .fail_with(Some(FakeFailure::Unauthorized));
        f.queue.enqueue(payload("hi"), "g1").unwrap();
        let job = f.queue.pop().unwrap();

        let report = f.dispatcher.dispatch(&job).await;
        assert_eq!(report.invalidated, vec!["g2".to_string()]);
        let snapshot: Vec<_> = f.registry.snapshot().into_iter().map(|(g, _)| g).collect();
        assert_eq!(snapshot, vec!["g1"]);
    }

    #[tokio::test]
    async fn start_is_single_shot() {
        let f = fixture(&[]).await;
        assert!(f.dispatcher.start());
        assert!(!f.dispatcher.start());
        f.queue.close();
        f.dispatcher.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn worker_drains_and_returns_to_idle() {
        let f = fixture(&["g1", "g2"]).await;
        f.dispatcher.start();
        for i in 0..3 {
            f.queue.enqueue(payload(&format!("m{i}")), "g1").unwrap();
        }
        tokio::time::timeout(Duration::from_secs(5), f.queue.wait_idle())
            .await
            .unwrap();

        let contents: Vec<_> = f
            .provider
            .deliveries_to("g2")
            .into_iter()
            .map(|d| d.content)
            .collect();
        assert_eq!(contents, vec!["m0", "m1", "m2"]);
        assert_eq!(f.dispatcher.state(), DispatcherState::Idle);

        f.queue.close();
        f.dispatcher.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn shutdown_drops_queued_jobs() {
        let f = fixture(&["g1", "g2"]).await;
        f.provider
            .endpoint_for("g2")
            .unwrap()
            .set_delay(Duration::from_millis(100));
        f.dispatcher.start();
        for i in 0..5 {
            f.queue.enqueue(payload(&format!("m{i}")), "g1").unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        f.queue.close();
        f.dispatcher.shutdown(Duration::from_secs(2)).await;

        assert_eq!(f.queue.outstanding(), 0);
        assert_eq!(f.queue.depth(), 0);
        assert!(f.provider.deliveries_to("g2").len() < 5);
    }
}
