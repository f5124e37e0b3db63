//! Message queue seam.
//!
//! The queue is an at-least-once transport: a received message stays hidden
//! for its visibility window and reappears unless it is deleted.

pub mod simplemq;

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::EventEnvelope;

pub use simplemq::SimpleMqClient;

/// A message pulled from the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    /// Base64 of the JSON-encoded payload.
    pub content: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub acquired_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub visibility_timeout_at: DateTime<Utc>,
}

impl QueueMessage {
    /// Decode the payload into an event. Fails on bad base64 or bad JSON.
    pub fn decode_event(&self) -> Result<EventEnvelope> {
        let bytes = BASE64_STANDARD
            .decode(self.content.trim())
            .map_err(|e| Error::Decode(format!("invalid base64 in message {}: {e}", self.id)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::Decode(format!("invalid JSON in message {}: {e}", self.id)))
    }

    /// Time since the queue first accepted this message.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Encode an event the way the consumer expects to find it on the queue.
pub fn encode_event(event: &EventEnvelope) -> Result<String> {
    let json = serde_json::to_vec(event)?;
    Ok(BASE64_STANDARD.encode(json))
}

/// Queue operations used by the producer and the dispatcher.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue a base64 payload.
    async fn send(&self, content: &str) -> Result<QueueMessage>;

    /// Receive the next batch. An empty batch means the queue is drained.
    async fn receive(&self) -> Result<Vec<QueueMessage>>;

    /// Restart the visibility window of a received message.
    async fn extend_timeout(&self, message_id: &str) -> Result<()>;

    /// Remove a message permanently.
    async fn delete(&self, message_id: &str) -> Result<()>;
}
