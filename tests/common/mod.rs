//! In-memory fakes for every external seam, shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use cityleague_import::config::DrainConfig;
use cityleague_import::db::ResultRepository;
use cityleague_import::engine::{Collaborators, Dispatcher, Worker, WorkerOptions};
use cityleague_import::error::{Error, Result};
use cityleague_import::model::{EventEnvelope, PersistedResult, ResultRow, ScheduleRef};
use cityleague_import::queue::{MessageQueue, QueueMessage, encode_event};
use cityleague_import::store::ObjectStore;
use cityleague_import::upstream::{DeckImageSource, EventSource, ResultSource};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn event_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 8, 0, 0, 0).unwrap()
}

pub fn event(id: u64) -> EventEnvelope {
    event_with_league(id, "マスター")
}

pub fn event_with_league(id: u64, league_title: &str) -> EventEnvelope {
    EventEnvelope {
        id,
        title: format!("City League #{id}"),
        address: String::new(),
        venue: String::new(),
        date: event_date(),
        started_at: None,
        ended_at: None,
        type_name: "シティリーグ".to_string(),
        league_title: league_title.to_string(),
        regulation_title: "スタンダード".to_string(),
        csp_flg: true,
        capacity: 32,
        shop_id: 1,
        shop_name: "Card Shop".to_string(),
    }
}

pub fn row(player_id: &str, rank: u32, deck_id: &str) -> ResultRow {
    ResultRow {
        player_id: player_id.to_string(),
        name: format!("Player {player_id}"),
        rank,
        point: 100 - rank,
        deck_id: deck_id.to_string(),
    }
}

pub fn schedule() -> ScheduleRef {
    ScheduleRef {
        id: "2025-s1".to_string(),
        from_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        to_date: Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap(),
    }
}

pub fn message(id: &str, content: String) -> QueueMessage {
    let now = Utc::now();
    QueueMessage {
        id: id.to_string(),
        content,
        created_at: now,
        updated_at: now,
        expires_at: now + chrono::Duration::days(4),
        acquired_at: now,
        visibility_timeout_at: now + chrono::Duration::seconds(30),
    }
}

pub fn event_message(id: &str, event: &EventEnvelope) -> QueueMessage {
    message(id, encode_event(event).unwrap())
}

/// `message` first accepted by the queue `age` ago.
pub fn aged(mut message: QueueMessage, age: chrono::Duration) -> QueueMessage {
    message.created_at = Utc::now() - age;
    message
}

/// A small PNG, standing in for an upstream deck raster.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(4, 4, |x, y| image::Rgb([x as u8 * 60, y as u8 * 60, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Hands out one pending message per receive; an empty batch once drained.
#[derive(Default)]
pub struct FakeQueue {
    pending: Mutex<VecDeque<QueueMessage>>,
    pub sent: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub extended: Mutex<Vec<String>>,
    fail_delete: Mutex<HashSet<String>>,
    receive_failures: AtomicUsize,
    send_failures: AtomicUsize,
    pub receive_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
}

impl FakeQueue {
    pub fn with_messages(messages: impl IntoIterator<Item = QueueMessage>) -> Self {
        let queue = Self::default();
        queue.pending.lock().unwrap().extend(messages);
        queue
    }

    /// The next `n` receives fail.
    pub fn failing_receives(self, n: usize) -> Self {
        self.receive_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` sends fail.
    pub fn failing_sends(self, n: usize) -> Self {
        self.send_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_delete(self, message_id: &str) -> Self {
        self.fail_delete
            .lock()
            .unwrap()
            .insert(message_id.to_string());
        self
    }

    pub fn deleted(&self) -> Vec<String> {
        let mut ids = self.deleted.lock().unwrap().clone();
        ids.sort();
        ids
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl MessageQueue for FakeQueue {
    async fn send(&self, content: &str) -> Result<QueueMessage> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.send_failures) {
            return Err(Error::Queue("send rejected".to_string()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(content.to_string());
        Ok(message(&format!("sent-{}", sent.len()), content.to_string()))
    }

    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.receive_failures) {
            return Err(Error::Status {
                url: "fake://queue".to_string(),
                status: 503,
            });
        }
        Ok(self.pending.lock().unwrap().pop_front().into_iter().collect())
    }

    async fn extend_timeout(&self, message_id: &str) -> Result<()> {
        self.extended.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn delete(&self, message_id: &str) -> Result<()> {
        if self.fail_delete.lock().unwrap().contains(message_id) {
            return Err(Error::Status {
                url: format!("fake://queue/{message_id}"),
                status: 500,
            });
        }
        self.deleted.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

/// Serves canned results per event and tracks how many lookups overlap.
#[derive(Default)]
pub struct FakeResults {
    results: HashMap<u64, Vec<ResultRow>>,
    failing: HashSet<u64>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeResults {
    pub fn with(mut self, event_id: u64, rows: Vec<ResultRow>) -> Self {
        self.results.insert(event_id, rows);
        self
    }

    pub fn failing(mut self, event_id: u64) -> Self {
        self.failing.insert(event_id);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ResultSource for FakeResults {
    async fn event_results(&self, event_id: u64) -> Result<Vec<ResultRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&event_id) {
            return Err(Error::Status {
                url: format!("fake://results/{event_id}"),
                status: 503,
            });
        }
        Ok(self.results.get(&event_id).cloned().unwrap_or_default())
    }
}

/// Serves a PNG for every deck code unless given another body.
#[derive(Default)]
pub struct FakeDeckImages {
    body: Option<Vec<u8>>,
    pub calls: AtomicUsize,
}

impl FakeDeckImages {
    pub fn serving(body: &[u8]) -> Self {
        Self {
            body: Some(body.to_vec()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl DeckImageSource for FakeDeckImages {
    async fn deck_image(&self, _deck_code: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone().unwrap_or_else(png_bytes))
    }
}

#[derive(Default)]
pub struct FakeEvents {
    pub events: Vec<EventEnvelope>,
    pub requested: Mutex<Vec<NaiveDate>>,
}

#[async_trait]
impl EventSource for FakeEvents {
    async fn official_events(&self, date: NaiveDate) -> Result<Vec<EventEnvelope>> {
        self.requested.lock().unwrap().push(date);
        Ok(self.events.clone())
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// Conditional-put store: a second put of the same key is a conflict.
#[derive(Default)]
pub struct FakeStore {
    pub objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub puts: AtomicUsize,
}

impl FakeStore {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn put_public(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(key) {
            return Err(Error::Conflict(key.to_string()));
        }
        objects.insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Enforces result identity the way the unique constraint does.
pub struct FakeRepository {
    schedule: Option<ScheduleRef>,
    panic_on_event: Option<i64>,
    pub rows: Mutex<HashMap<(String, i64, String), PersistedResult>>,
    pub inserts: AtomicUsize,
    pub schedule_lookups: AtomicUsize,
}

impl Default for FakeRepository {
    fn default() -> Self {
        Self {
            schedule: Some(schedule()),
            panic_on_event: None,
            rows: Mutex::new(HashMap::new()),
            inserts: AtomicUsize::new(0),
            schedule_lookups: AtomicUsize::new(0),
        }
    }
}

impl FakeRepository {
    pub fn without_schedule() -> Self {
        Self {
            schedule: None,
            ..Self::default()
        }
    }

    pub fn panicking_on(event_id: i64) -> Self {
        Self {
            panic_on_event: Some(event_id),
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ResultRepository for FakeRepository {
    async fn schedule_for_date(&self, date: DateTime<Utc>) -> Result<ScheduleRef> {
        self.schedule_lookups.fetch_add(1, Ordering::SeqCst);
        self.schedule
            .clone()
            .filter(|s| s.contains(date))
            .ok_or_else(|| Error::NotFound(format!("cityleague schedule for {date}")))
    }

    async fn insert_result(&self, result: &PersistedResult) -> Result<()> {
        if self.panic_on_event == Some(result.event_id) {
            panic!("repository exploded on event {}", result.event_id);
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let (schedule_id, event_id, player_id) = result.identity();
        let key = (schedule_id.to_string(), event_id, player_id.to_string());
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&key) {
            return Err(Error::Conflict(format!("{key:?}")));
        }
        rows.insert(key, result.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub queue: Arc<FakeQueue>,
    pub results: Arc<FakeResults>,
    pub deck_images: Arc<FakeDeckImages>,
    pub store: Arc<FakeStore>,
    pub repository: Arc<FakeRepository>,
}

impl Harness {
    pub fn new(queue: FakeQueue, results: FakeResults, repository: FakeRepository) -> Self {
        Self {
            queue: Arc::new(queue),
            results: Arc::new(results),
            deck_images: Arc::new(FakeDeckImages::default()),
            store: Arc::new(FakeStore::default()),
            repository: Arc::new(repository),
        }
    }

    pub fn with_deck_images(mut self, deck_images: FakeDeckImages) -> Self {
        self.deck_images = Arc::new(deck_images);
        self
    }

    pub fn worker(&self, options: WorkerOptions) -> Worker {
        Worker::new(
            Collaborators {
                queue: self.queue.clone(),
                results: self.results.clone(),
                deck_images: self.deck_images.clone(),
                store: self.store.clone(),
                repository: self.repository.clone(),
            },
            options,
        )
    }

    pub fn dispatcher(&self, config: DrainConfig) -> Dispatcher {
        let options = WorkerOptions {
            extend_visibility: config.extend_visibility,
            discard_after: config.discard_after(),
        };
        Dispatcher::new(self.worker(options), config)
    }
}

/// Drain settings with fast receive backoff for tests.
pub fn drain_config(concurrency: usize, failure_buffer: usize) -> DrainConfig {
    let mut config = DrainConfig::default();
    config.concurrency = concurrency;
    config.failure_buffer = failure_buffer;
    config.receive_backoff.initial_ms = 1;
    config.receive_backoff.max_ms = 4;
    config
}
