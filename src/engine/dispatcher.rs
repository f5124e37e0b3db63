//! Dispatcher: drains the queue once, one worker task per message.

use std::sync::Arc;

use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::failure::{TaskLabel, WorkerFailure};
use super::pool::WorkerPool;
use super::worker::{Worker, discard_if_stale};
use crate::config::DrainConfig;
use crate::queue::MessageQueue;
use crate::retry::RetryConfig;
use crate::telemetry::metrics;

/// Summary of one drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub run_id: Uuid,
    /// Messages received from the queue.
    pub received: usize,
    /// Messages handed to a worker.
    pub dispatched: usize,
    /// Messages dropped because their payload did not decode.
    pub undecodable: usize,
    /// Failed receive calls.
    pub receive_errors: usize,
    /// Failures delivered through the failure channel. Reports dropped on a
    /// full channel are not here.
    pub failures: Vec<WorkerFailure>,
}

impl DrainReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            received: 0,
            dispatched: 0,
            undecodable: 0,
            receive_errors: 0,
            failures: Vec::new(),
        }
    }
}

pub struct Dispatcher {
    queue: Arc<dyn MessageQueue>,
    worker: Worker,
    config: DrainConfig,
}

impl Dispatcher {
    pub fn new(worker: Worker, config: DrainConfig) -> Self {
        Self {
            queue: Arc::clone(worker.queue()),
            worker,
            config,
        }
    }

    /// Receive until the queue returns an empty batch, then wait for every
    /// spawned worker and collect their failures.
    ///
    /// Individual message failures never fail the run.
    pub async fn run(&self) -> DrainReport {
        let mut report = DrainReport::new();
        let span = info_span!("drain", run_id = %report.run_id);

        async {
            info!(
                concurrency = self.config.concurrency,
                failure_buffer = self.config.failure_buffer,
                "drain started"
            );

            let (pool, mut failures) =
                WorkerPool::new(self.config.concurrency, self.config.failure_buffer);

            self.receive_loop(&pool, &mut report).await;

            let monitor = pool.close();
            while let Some(failure) = failures.recv().await {
                error!(
                    message_id = %failure.message_id,
                    event_id = failure.event_id,
                    stage = %failure.stage,
                    subject = failure.subject.as_deref().unwrap_or("-"),
                    error = %failure.error,
                    "worker failed"
                );
                report.failures.push(failure);
            }
            if let Err(e) = monitor.await {
                warn!(error = %e, "pool monitor did not finish cleanly");
            }

            info!(
                received = report.received,
                dispatched = report.dispatched,
                undecodable = report.undecodable,
                receive_errors = report.receive_errors,
                failures = report.failures.len(),
                "drain finished"
            );
        }
        .instrument(span)
        .await;

        report
    }

    async fn receive_loop(&self, pool: &WorkerPool, report: &mut DrainReport) {
        let mut backoff = RetryConfig::from(&self.config.receive_backoff).backoff();

        loop {
            let batch = match self.queue.receive().await {
                Ok(batch) => {
                    backoff.reset();
                    batch
                }
                Err(e) => {
                    report.receive_errors += 1;
                    match backoff.next_delay() {
                        Some(delay) => {
                            warn!(
                                error = %e,
                                consecutive = backoff.failures(),
                                delay_ms = delay.as_millis() as u64,
                                "failed to receive from queue, backing off"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        None => {
                            error!(
                                error = %e,
                                consecutive = backoff.failures() + 1,
                                "queue receive keeps failing, stopping drain"
                            );
                            break;
                        }
                    }
                }
            };

            if batch.is_empty() {
                break;
            }
            report.received += batch.len();

            for message in batch {
                let event = match message.decode_event() {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(message_id = %message.id, error = %e, "skipping undecodable message");
                        metrics::messages_undecodable().add(1, &[]);
                        report.undecodable += 1;
                        discard_if_stale(
                            self.queue.as_ref(),
                            &message,
                            self.worker.options().discard_after,
                        )
                        .await;
                        continue;
                    }
                };

                let label = TaskLabel {
                    message_id: message.id.clone(),
                    event_id: event.id,
                };
                let worker = self.worker.clone();
                pool.spawn(label, async move {
                    worker.process(message, event).await.map(|_| ())
                })
                .await;
                metrics::messages_dispatched().add(1, &[]);
                report.dispatched += 1;
            }
        }
    }
}
