//! HTTP queue client.
//!
//! Talks to a SimpleMQ-style REST API:
//! `{base}/v1/queues/{queue}/messages[/{id}]` with POST (send), GET
//! (receive), PUT (extend visibility) and DELETE (delete).

use async_trait::async_trait;
use opentelemetry::KeyValue;
use reqwest::{Method, StatusCode};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MessageQueue, QueueMessage};
use crate::config::secrets::bearer;
use crate::error::{Error, Result};
use crate::telemetry::metrics;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[allow(dead_code)]
    #[serde(default)]
    result: String,
    message: QueueMessage,
}

#[derive(Debug, Deserialize)]
struct ReceiveMessageResponse {
    #[allow(dead_code)]
    #[serde(default)]
    result: String,
    #[serde(default)]
    messages: Vec<QueueMessage>,
}

/// Queue client bound to one named queue.
pub struct SimpleMqClient {
    http: reqwest::Client,
    base_url: String,
    queue_name: String,
    token: SecretString,
}

impl SimpleMqClient {
    /// `http` is shared with the other upstream clients for the run.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        queue_name: impl Into<String>,
        token: SecretString,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            queue_name: queue_name.into(),
            token,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/queues/{}/messages", self.base_url, self.queue_name)
    }

    fn message_url(&self, message_id: &str) -> String {
        format!("{}/{message_id}", self.messages_url())
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::AUTHORIZATION, bearer(&self.token))
    }

    fn record(&self, operation: &'static str, ok: bool) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue_name.clone()),
                KeyValue::new("operation", operation),
                KeyValue::new("result", if ok { "ok" } else { "error" }),
            ],
        );
    }

    async fn send_inner(&self, content: &str) -> Result<QueueMessage> {
        let url = self.messages_url();
        let res = self
            .request(Method::POST, &url)
            .json(&SendMessageRequest { content })
            .send()
            .await?;
        if res.status() != StatusCode::OK {
            return Err(status_error(url, res.status()));
        }
        let body: SendMessageResponse = res.json().await?;
        Ok(body.message)
    }

    async fn receive_inner(&self) -> Result<Vec<QueueMessage>> {
        let url = self.messages_url();
        let res = self.request(Method::GET, &url).send().await?;
        if res.status() != StatusCode::OK {
            return Err(status_error(url, res.status()));
        }
        let body: ReceiveMessageResponse = res.json().await?;
        Ok(body.messages)
    }

    async fn extend_inner(&self, message_id: &str) -> Result<()> {
        let url = self.message_url(message_id);
        let res = self.request(Method::PUT, &url).send().await?;
        match res.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("queue message {message_id}"))),
            status => Err(status_error(url, status)),
        }
    }

    async fn delete_inner(&self, message_id: &str) -> Result<()> {
        let url = self.message_url(message_id);
        let res = self.request(Method::DELETE, &url).send().await?;
        if res.status() != StatusCode::OK {
            return Err(status_error(url, res.status()));
        }
        Ok(())
    }
}

fn status_error(url: String, status: StatusCode) -> Error {
    Error::Status {
        url,
        status: status.as_u16(),
    }
}

#[async_trait]
impl MessageQueue for SimpleMqClient {
    async fn send(&self, content: &str) -> Result<QueueMessage> {
        let result = self.send_inner(content).await;
        self.record("send", result.is_ok());
        if let Ok(ref msg) = result {
            debug!(queue = %self.queue_name, message_id = %msg.id, "message sent");
        }
        result
    }

    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        let result = self.receive_inner().await;
        let operation = match &result {
            Ok(batch) if batch.is_empty() => "receive_empty",
            _ => "receive",
        };
        self.record(operation, result.is_ok());
        result
    }

    async fn extend_timeout(&self, message_id: &str) -> Result<()> {
        let result = self.extend_inner(message_id).await;
        self.record("extend_timeout", result.is_ok());
        result
    }

    async fn delete(&self, message_id: &str) -> Result<()> {
        let result = self.delete_inner(message_id).await;
        self.record("delete", result.is_ok());
        if result.is_ok() {
            debug!(queue = %self.queue_name, message_id, "message deleted");
        }
        result
    }
}
