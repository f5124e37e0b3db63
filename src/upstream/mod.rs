//! Upstream HTTP lookups: event results, official events and deck rasters.
//!
//! Every call is a single retryless request on the injected client.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{EventEnvelope, ResultRow};

/// Build the one HTTP client shared by every component for a run.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cityleague-import/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::from)
}

/// Results lookup keyed by event id.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Participant results for an event. An unknown event yields no rows.
    async fn event_results(&self, event_id: u64) -> Result<Vec<ResultRow>>;
}

/// Official events published for a day.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn official_events(&self, date: NaiveDate) -> Result<Vec<EventEnvelope>>;
}

/// Source raster for a deck code.
#[async_trait]
pub trait DeckImageSource: Send + Sync {
    async fn deck_image(&self, deck_code: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Deserialize)]
struct EventResultDetailSearch {
    #[allow(dead_code)]
    #[serde(default)]
    code: u32,
    #[allow(dead_code)]
    #[serde(default)]
    count: u32,
    #[serde(default)]
    results: Option<Vec<ResultRow>>,
}

#[derive(Debug, Deserialize)]
struct OfficialEventsResponse {
    #[serde(default)]
    official_events: Option<Vec<EventEnvelope>>,
}

/// Base URLs for the upstream services.
#[derive(Debug, Clone)]
pub struct UpstreamUrls {
    pub results: String,
    pub deck_images: String,
    pub events: String,
}

/// Client for every upstream lookup.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    urls: UpstreamUrls,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, urls: UpstreamUrls) -> Self {
        Self { http, urls }
    }

    fn results_url(&self, event_id: u64) -> String {
        format!(
            "{}/event_result_detail_search?event_holding_id={event_id}",
            self.urls.results.trim_end_matches('/')
        )
    }

    fn deck_image_url(&self, deck_code: &str) -> String {
        format!(
            "{}/deck/deckView.php/deckID/{deck_code}.png",
            self.urls.deck_images.trim_end_matches('/')
        )
    }

    fn events_url(&self, date: NaiveDate) -> String {
        let day = date.format("%Y-%m-%d");
        format!(
            "{}/api/v1beta/official_events?type_id=2&league_type=0&start_date={day}&end_date={day}",
            self.urls.events.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ResultSource for UpstreamClient {
    async fn event_results(&self, event_id: u64) -> Result<Vec<ResultRow>> {
        let url = self.results_url(event_id);
        let res = self.http.get(&url).send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            debug!(event_id, "results lookup returned 404, treating as empty");
            return Ok(Vec::new());
        }
        let res = res.error_for_status()?;
        let body: EventResultDetailSearch = res.json().await?;
        Ok(body.results.unwrap_or_default())
    }
}

#[async_trait]
impl EventSource for UpstreamClient {
    async fn official_events(&self, date: NaiveDate) -> Result<Vec<EventEnvelope>> {
        let url = self.events_url(date);
        let res = self.http.get(&url).send().await?.error_for_status()?;
        let body: OfficialEventsResponse = res.json().await?;
        Ok(body.official_events.unwrap_or_default())
    }
}

#[async_trait]
impl DeckImageSource for UpstreamClient {
    async fn deck_image(&self, deck_code: &str) -> Result<Vec<u8>> {
        let url = self.deck_image_url(deck_code);
        let res = self.http.get(&url).send().await?.error_for_status()?;
        Ok(res.bytes().await?.to_vec())
    }
}
