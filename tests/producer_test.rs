//! Integration tests for publishing events onto the queue.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::NaiveDate;
use cityleague_import::engine::Producer;
use cityleague_import::error::Error;
use cityleague_import::retry::RetryConfig;
use common::*;
use tokio_util::sync::CancellationToken;

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::new(
        max_retries,
        Duration::from_millis(1),
        Duration::from_millis(4),
        2.0,
    )
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 8).unwrap()
}

#[tokio::test]
async fn enqueues_each_event_in_consumer_format() {
    let queue = Arc::new(FakeQueue::default());
    let events = Arc::new(FakeEvents {
        events: vec![event(1), event_with_league(2, "シニア")],
        ..FakeEvents::default()
    });
    let producer = Producer::new(queue.clone(), events.clone()).with_retry(fast_retry(0));

    let report = producer
        .enqueue_date(day(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.sent, 2);
    assert_eq!(events.requested.lock().unwrap().as_slice(), [day()]);

    let decoded: Vec<_> = queue
        .sent()
        .into_iter()
        .map(|content| message("x", content).decode_event().unwrap())
        .collect();
    assert_eq!(decoded, vec![event(1), event_with_league(2, "シニア")]);
}

#[tokio::test]
async fn transient_send_failures_are_retried() {
    let queue = Arc::new(FakeQueue::default().failing_sends(2));
    let events = Arc::new(FakeEvents {
        events: vec![event(1)],
        ..FakeEvents::default()
    });
    let producer = Producer::new(queue.clone(), events).with_retry(fast_retry(5));

    let report = producer
        .enqueue_date(day(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(queue.send_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_return_last_error() {
    let queue = Arc::new(FakeQueue::default().failing_sends(usize::MAX));
    let events = Arc::new(FakeEvents {
        events: vec![event(1), event(2)],
        ..FakeEvents::default()
    });
    let producer = Producer::new(queue.clone(), events).with_retry(fast_retry(2));

    let err = producer
        .enqueue_date(day(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Queue(_)));
    assert_eq!(queue.send_calls.load(Ordering::SeqCst), 3);
    assert!(queue.sent().is_empty());
}

#[tokio::test]
async fn cancellation_stops_retrying() {
    let queue = Arc::new(FakeQueue::default().failing_sends(usize::MAX));
    let events = Arc::new(FakeEvents {
        events: vec![event(1)],
        ..FakeEvents::default()
    });
    let producer = Producer::new(queue, events).with_retry(RetryConfig::new(
        10,
        Duration::from_secs(60),
        Duration::from_secs(60),
        2.0,
    ));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), producer.enqueue_date(day(), &cancel))
        .await
        .expect("cancellation must interrupt the backoff sleep")
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn periodic_run_enqueues_until_cancelled() {
    let queue = Arc::new(FakeQueue::default());
    let events = Arc::new(FakeEvents {
        events: vec![event(1)],
        ..FakeEvents::default()
    });
    let producer = Producer::new(queue.clone(), events.clone()).with_retry(fast_retry(0));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        trigger.cancel();
    });

    producer
        .run_periodically(Duration::from_millis(10), cancel, day)
        .await
        .unwrap();

    let rounds = events.requested.lock().unwrap().len();
    assert!(rounds >= 2, "expected several rounds, got {rounds}");
    assert_eq!(queue.sent().len(), rounds);
}
