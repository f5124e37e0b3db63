//! Message processing span helpers.

use tracing::Span;

/// Start a span covering one message's pipeline.
///
/// `message.stage` is declared empty and updated by [`record_stage`].
pub fn start_message_span(message_id: &str, event_id: u64) -> Span {
    tracing::info_span!(
        "message.process",
        "message.id" = message_id,
        "event.id" = event_id,
        "message.stage" = tracing::field::Empty,
    )
}

/// Record entry into a pipeline stage on the span.
pub fn record_stage(span: &Span, stage: &str) {
    span.record("message.stage", stage);
    span.in_scope(|| {
        tracing::debug!(stage, "stage_entered");
    });
}
