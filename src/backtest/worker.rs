use crate::backtest::{BacktestJob, BacktestOrchestrator, BacktestResult, CancelToken};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use thiserror::Error;
use tracing::{error, info};

/// Job bus failure, eg/ a result publish that could not be delivered.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("job bus failure: {0}")]
pub struct BusError(pub String);

/// One at-least-once delivery of a [`BacktestJob`]. The tag identifies the
/// delivery (not the job) for acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDelivery {
    pub job: BacktestJob,
    pub delivery_tag: u64,
}

/// Backtest job bus contract, implemented by message-broker adapters.
///
/// Delivery is at-least-once: a worker acknowledges a delivery once the job's
/// result has been published, and negative-acknowledges it to request
/// redelivery otherwise.
#[async_trait]
pub trait JobBus: Send + Sync {
    /// Next delivery, or `None` once the bus is closed.
    async fn recv(&self) -> Option<JobDelivery>;

    /// Publish a job's result.
    async fn publish_result(&self, result: &BacktestResult) -> Result<(), BusError>;

    /// Acknowledge a processed delivery.
    async fn ack(&self, delivery: &JobDelivery);

    /// Negative-acknowledge a delivery, requesting redelivery.
    async fn nack(&self, delivery: &JobDelivery);
}

/// Worker consuming [`BacktestJob`]s from a [`JobBus`] and running each
/// through a [`BacktestOrchestrator`].
///
/// The orchestrator folds every processing failure into an unsuccessful
/// result, so the worker always has something to publish; only a failed
/// publish leaves a job unacknowledged.
pub struct BacktestWorker {
    bus: Arc<dyn JobBus>,
    orchestrator: BacktestOrchestrator,
    cancel: CancelToken,
}

impl BacktestWorker {
    pub fn new(bus: Arc<dyn JobBus>, orchestrator: BacktestOrchestrator) -> Self {
        Self {
            bus,
            orchestrator,
            cancel: CancelToken::new(),
        }
    }

    /// Handle shared with the in-flight job; cancelling stops the worker after
    /// the current delivery.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Consume deliveries until the bus closes or the worker is cancelled.
    pub async fn run(&self) {
        while let Some(delivery) = self.bus.recv().await {
            if self.cancel.is_cancelled() {
                self.bus.nack(&delivery).await;
                break;
            }

            let job_id = delivery.job.job_id;
            let result = self.orchestrator.run(&delivery.job, &self.cancel).await;

            match self.bus.publish_result(&result).await {
                Ok(()) => {
                    info!(%job_id, success = result.success, "published backtest result");
                    self.bus.ack(&delivery).await;
                }
                Err(err) => {
                    error!(%job_id, %err, "result publish failed, requesting redelivery");
                    self.bus.nack(&delivery).await;
                }
            }
        }

        info!("job bus closed, worker stopped");
    }
}

/// [`JobBus`] over in-memory queues. Backs tests & single-process
/// deployments; a nack re-enqueues the delivery at the back of the queue.
#[derive(Debug, Default)]
pub struct InMemoryJobBus {
    queue: parking_lot::Mutex<VecDeque<JobDelivery>>,
    results: parking_lot::Mutex<Vec<BacktestResult>>,
    acked: parking_lot::Mutex<Vec<u64>>,
    nacked: parking_lot::Mutex<Vec<u64>>,
    /// Number of upcoming publishes to fail, for redelivery tests.
    publish_failures: AtomicUsize,
}

impl InMemoryJobBus {
    pub fn new(jobs: impl IntoIterator<Item = BacktestJob>) -> Self {
        let queue = jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| JobDelivery {
                job,
                delivery_tag: index as u64,
            })
            .collect();

        Self {
            queue: parking_lot::Mutex::new(queue),
            ..Self::default()
        }
    }

    /// Make the next `count` publishes fail.
    pub fn fail_next_publishes(&self, count: usize) {
        self.publish_failures.store(count, Ordering::Relaxed);
    }

    pub fn results(&self) -> Vec<BacktestResult> {
        self.results.lock().clone()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().clone()
    }

    pub fn nacked(&self) -> Vec<u64> {
        self.nacked.lock().clone()
    }
}

#[async_trait]
impl JobBus for InMemoryJobBus {
    async fn recv(&self) -> Option<JobDelivery> {
        self.queue.lock().pop_front()
    }

    async fn publish_result(&self, result: &BacktestResult) -> Result<(), BusError> {
        let failures = self.publish_failures.load(Ordering::Relaxed);
        if failures > 0 {
            self.publish_failures.store(failures - 1, Ordering::Relaxed);
            return Err(BusError("simulated publish failure".to_string()));
        }

        self.results.lock().push(result.clone());
        Ok(())
    }

    async fn ack(&self, delivery: &JobDelivery) {
        self.acked.lock().push(delivery.delivery_tag);
    }

    async fn nack(&self, delivery: &JobDelivery) {
        self.nacked.lock().push(delivery.delivery_tag);
        self.queue.lock().push_back(delivery.clone());
    }
}
