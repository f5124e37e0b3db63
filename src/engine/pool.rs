//! Bounded worker pool.
//!
//! A fixed number of execution slots, a tracker that knows when every
//! spawned task has finished, and a failure sink that never blocks the
//! reporting task. Closing the pool starts a monitor that closes the failure
//! channel once the last task is done, so draining the receiver terminates.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt as _;
use opentelemetry::KeyValue;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::failure::{TaskLabel, WorkerFailure};
use crate::telemetry::metrics;

/// Sending half of the failure channel. Reports are dropped when it is full.
#[derive(Clone)]
pub struct FailureSink {
    tx: mpsc::Sender<WorkerFailure>,
}

impl FailureSink {
    /// Report without waiting. Returns whether the report was accepted.
    pub fn report(&self, failure: WorkerFailure) -> bool {
        metrics::worker_failures().add(1, &[KeyValue::new("stage", failure.stage.as_str())]);
        match self.tx.try_send(failure) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                debug!(
                    message_id = %dropped.message_id,
                    stage = %dropped.stage,
                    "failure channel full, dropping report"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Create a failure channel with the given capacity.
pub fn failure_channel(buffer: usize) -> (FailureSink, mpsc::Receiver<WorkerFailure>) {
    let (tx, rx) = mpsc::channel(buffer);
    (FailureSink { tx }, rx)
}

pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
    tracker: TaskTracker,
    sink: FailureSink,
}

impl WorkerPool {
    /// A pool of `capacity` slots and a failure channel of `failure_buffer`.
    pub fn new(capacity: usize, failure_buffer: usize) -> (Self, mpsc::Receiver<WorkerFailure>) {
        let (sink, rx) = failure_channel(failure_buffer);
        let pool = Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            tracker: TaskTracker::new(),
            sink,
        };
        (pool, rx)
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Spawned tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for a free slot, then run `task` on its own tokio task.
    ///
    /// The slot is released when the task ends however it ends. An `Err`
    /// or a panic becomes exactly one report on the failure sink.
    pub async fn spawn<F>(&self, label: TaskLabel, task: F)
    where
        F: Future<Output = Result<(), WorkerFailure>> + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.slots).acquire_owned().await else {
            warn!(message_id = %label.message_id, "worker pool closed, task not spawned");
            return;
        };
        let sink = self.sink.clone();

        self.tracker.spawn(async move {
            let _permit = permit;
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => {
                    sink.report(failure);
                }
                Err(payload) => {
                    sink.report(WorkerFailure::panicked(&label, payload.as_ref()));
                }
            }
        });
    }

    /// Stop accepting work. The returned monitor completes, and the failure
    /// channel closes, once every spawned task has finished.
    pub fn close(self) -> JoinHandle<()> {
        let WorkerPool { tracker, sink, .. } = self;
        tracker.close();
        tokio::spawn(async move {
            tracker.wait().await;
            drop(sink);
        })
    }
}
