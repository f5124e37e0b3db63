//! Per-message pipeline: classify, fetch results, resolve schedule, store
//! deck images, persist results, acknowledge.
//!
//! Stages run strictly in order. The first failing stage aborts the message
//! and leaves it on the queue for redelivery; rows already written stay.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt as _;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info, warn};

use super::failure::{Stage, TaskLabel, WorkerFailure};
use crate::db::ResultRepository;
use crate::model::{EventEnvelope, PersistedResult};
use crate::queue::{MessageQueue, QueueMessage};
use crate::store::{self, DeckImage, ObjectStore};
use crate::telemetry::message::{record_stage, start_message_span};
use crate::telemetry::metrics;
use crate::upstream::{DeckImageSource, ResultSource};

/// External services a worker talks to. All are shared across tasks.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn MessageQueue>,
    pub results: Arc<dyn ResultSource>,
    pub deck_images: Arc<dyn DeckImageSource>,
    pub store: Arc<dyn ObjectStore>,
    pub repository: Arc<dyn ResultRepository>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    /// Extend the message's visibility before the per-result loop.
    pub extend_visibility: bool,
    /// Delete unacknowledged messages older than this.
    pub discard_after: Option<Duration>,
}

/// How a message was handled when no stage failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// All results recorded and the message deleted.
    Acknowledged {
        inserted: usize,
        duplicates: usize,
        images_uploaded: usize,
    },
    /// The lookup returned nothing; the message is left on the queue.
    NoResults,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Acknowledged { .. } => "acknowledged",
            Outcome::NoResults => "no_results",
        }
    }
}

#[derive(Clone)]
pub struct Worker {
    deps: Collaborators,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(deps: Collaborators, options: WorkerOptions) -> Self {
        Self { deps, options }
    }

    pub fn queue(&self) -> &Arc<dyn MessageQueue> {
        &self.deps.queue
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Run the pipeline for one decoded message.
    pub async fn process(
        &self,
        message: QueueMessage,
        event: EventEnvelope,
    ) -> Result<Outcome, WorkerFailure> {
        let span = start_message_span(&message.id, event.id);
        let start = Instant::now();
        let label = TaskLabel {
            message_id: message.id.clone(),
            event_id: event.id,
        };

        // Panics end the message unacknowledged too and go through the
        // discard check.
        let result = AssertUnwindSafe(self.pipeline(&label, &message, &event, &span))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|payload| Err(WorkerFailure::panicked(&label, payload.as_ref())));

        let outcome_label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "failed",
        };
        metrics::message_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("outcome", outcome_label)],
        );

        if !matches!(result, Ok(Outcome::Acknowledged { .. })) {
            discard_if_stale(
                self.deps.queue.as_ref(),
                &message,
                self.options.discard_after,
            )
            .instrument(span)
            .await;
        }
        result
    }

    async fn pipeline(
        &self,
        label: &TaskLabel,
        message: &QueueMessage,
        event: &EventEnvelope,
        span: &tracing::Span,
    ) -> Result<Outcome, WorkerFailure> {
        let league_type = event.league_type();

        record_stage(span, Stage::FetchResults.as_str());
        let results = self
            .deps
            .results
            .event_results(event.id)
            .await
            .map_err(|e| WorkerFailure::new(label, Stage::FetchResults, e))?;

        if results.is_empty() {
            info!(event_id = event.id, "no results found for event, skipping");
            return Ok(Outcome::NoResults);
        }

        record_stage(span, Stage::ResolveSchedule.as_str());
        let schedule = self
            .deps
            .repository
            .schedule_for_date(event.date)
            .await
            .map_err(|e| {
                WorkerFailure::new(label, Stage::ResolveSchedule, e)
                    .with_subject(event.date.to_rfc3339())
            })?;

        if self.options.extend_visibility {
            if let Err(e) = self.deps.queue.extend_timeout(&message.id).await {
                warn!(message_id = %message.id, error = %e, "could not extend visibility timeout");
            }
        }

        let mut inserted = 0;
        let mut duplicates = 0;
        let mut images_uploaded = 0;

        for row in &results {
            if let Some(deck_code) = row.deck_code() {
                record_stage(span, Stage::DeckImage.as_str());
                let image = store::ensure_deck_image(
                    self.deps.store.as_ref(),
                    self.deps.deck_images.as_ref(),
                    deck_code,
                )
                .await
                .map_err(|e| WorkerFailure::new(label, Stage::DeckImage, e).with_subject(deck_code))?;
                if image == DeckImage::Uploaded {
                    images_uploaded += 1;
                }
            }

            record_stage(span, Stage::Persist.as_str());
            let record = PersistedResult::new(&schedule, event, league_type, row).map_err(|e| {
                WorkerFailure::new(label, Stage::Persist, e).with_subject(&row.player_id)
            })?;
            match self.deps.repository.insert_result(&record).await {
                Ok(()) => inserted += 1,
                Err(e) if e.is_conflict() => {
                    debug!(player_id = %record.player_id, "result already recorded");
                    duplicates += 1;
                }
                Err(e) => {
                    return Err(
                        WorkerFailure::new(label, Stage::Persist, e).with_subject(&row.player_id)
                    );
                }
            }
        }

        record_stage(span, Stage::Acknowledge.as_str());
        self.deps
            .queue
            .delete(&message.id)
            .await
            .map_err(|e| WorkerFailure::new(label, Stage::Acknowledge, e))?;

        info!(
            event_id = event.id,
            schedule_id = %schedule.id,
            league_type = %league_type,
            inserted,
            duplicates,
            images_uploaded,
            "event results recorded"
        );

        Ok(Outcome::Acknowledged {
            inserted,
            duplicates,
            images_uploaded,
        })
    }
}

/// Delete `message` if it has outlived `discard_after`. Returns whether it
/// was deleted. With no threshold this never deletes.
pub async fn discard_if_stale(
    queue: &dyn MessageQueue,
    message: &QueueMessage,
    discard_after: Option<Duration>,
) -> bool {
    let Some(limit) = discard_after else {
        return false;
    };
    let age = message
        .age(chrono::Utc::now())
        .to_std()
        .unwrap_or_default();
    if age <= limit {
        return false;
    }

    match queue.delete(&message.id).await {
        Ok(()) => {
            warn!(
                message_id = %message.id,
                age_secs = age.as_secs(),
                content = %message.content,
                "discarded message past redelivery limit"
            );
            true
        }
        Err(e) => {
            warn!(message_id = %message.id, error = %e, "could not discard stale message");
            false
        }
    }
}
