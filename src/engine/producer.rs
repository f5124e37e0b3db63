//! Producer: publishes a day's official events onto the queue.
//!
//! Sends are retried with exponential backoff. Duplicates across runs are
//! expected; the consumer side is idempotent.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::queue::{MessageQueue, encode_event};
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::upstream::EventSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    pub fetched: usize,
    pub sent: usize,
}

pub struct Producer {
    queue: Arc<dyn MessageQueue>,
    events: Arc<dyn EventSource>,
    retry: RetryConfig,
}

impl Producer {
    pub fn new(queue: Arc<dyn MessageQueue>, events: Arc<dyn EventSource>) -> Self {
        Self {
            queue,
            events,
            retry: RetryConfig::SEND,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the events held on `date` and send each one.
    ///
    /// Stops at the first event whose send exhausts its retries.
    pub async fn enqueue_date(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<EnqueueReport> {
        let events = self.events.official_events(date).await.map_err(|e| {
            error!(%date, error = %e, "failed to fetch official events");
            e
        })?;

        let mut report = EnqueueReport {
            fetched: events.len(),
            sent: 0,
        };

        for event in &events {
            let content = encode_event(event)?;
            retry_with_backoff(self.retry, cancel, "queue.send", || self.queue.send(&content))
                .await
                .map_err(|e| {
                    error!(event_id = event.id, error = %e, "failed to send event to queue");
                    e
                })?;
            report.sent += 1;
        }

        info!(%date, fetched = report.fetched, sent = report.sent, "events enqueued");
        Ok(report)
    }

    /// Enqueue `today()` every `every` until cancelled. Failed rounds are
    /// logged and retried on the next tick.
    pub async fn run_periodically<F>(
        &self,
        every: Duration,
        cancel: CancellationToken,
        today: F,
    ) -> Result<()>
    where
        F: Fn() -> NaiveDate,
    {
        loop {
            match self.enqueue_date(today(), &cancel).await {
                Ok(_) => {}
                Err(Error::Cancelled) => return Ok(()),
                Err(e) => error!(error = %e, "enqueue round failed"),
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(every) => {}
            }
        }
    }
}
