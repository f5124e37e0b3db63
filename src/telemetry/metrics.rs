//! Metric instrument factories for cityleague-import.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"cityleague-import"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("cityleague-import")
}

/// Counter: queue calls.
/// Labels: `queue`, `operation`, `result` ("ok" | "error").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("cityleague.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: messages handed to a worker.
pub fn messages_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("cityleague.messages.dispatched")
        .with_description("Messages spawned as worker tasks")
        .build()
}

/// Counter: messages whose payload could not be decoded.
pub fn messages_undecodable() -> Counter<u64> {
    meter()
        .u64_counter("cityleague.messages.undecodable")
        .with_description("Messages dropped because of bad base64 or JSON")
        .build()
}

/// Counter: result inserts.
/// Labels: `result` ("inserted" | "duplicate").
pub fn results_persisted() -> Counter<u64> {
    meter()
        .u64_counter("cityleague.results.persisted")
        .with_description("Result rows written or skipped as duplicates")
        .build()
}

/// Counter: deck image checks.
/// Labels: `result` ("present" | "uploaded").
pub fn deck_images() -> Counter<u64> {
    meter()
        .u64_counter("cityleague.deck_images")
        .with_description("Deck images found in the store or uploaded")
        .build()
}

/// Counter: failures reported by worker tasks.
/// Labels: `stage`.
pub fn worker_failures() -> Counter<u64> {
    meter()
        .u64_counter("cityleague.worker.failures")
        .with_description("Worker failures by pipeline stage")
        .build()
}

/// Histogram: per-message processing time in milliseconds.
/// Labels: `outcome`.
pub fn message_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("cityleague.message.duration_ms")
        .with_description("Message processing duration in milliseconds")
        .with_unit("ms")
        .build()
}
