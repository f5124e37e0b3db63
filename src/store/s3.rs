//! S3-compatible object store.
//!
//! Credentials come from the AWS default provider chain; the endpoint points
//! at any S3-compatible service.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;

use super::ObjectStore;
use crate::error::{Error, Result};

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Connect with a custom endpoint and optional region.
    pub async fn with_endpoint(
        bucket: impl Into<String>,
        endpoint: &str,
        region: Option<&str>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.into(),
        }
    }

    /// Create with an explicit client.
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(Error::Store(format!(
                        "head s3://{}/{key} failed: {service_error}",
                        self.bucket
                    )))
                }
            }
        }
    }

    async fn put_public(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(content_type)
            .if_none_match("*")
            .body(ByteStream::from(body))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let status = e.raw_response().map(|r| r.status().as_u16());
                if status == Some(412) {
                    Err(Error::Conflict(format!("s3://{}/{key}", self.bucket)))
                } else {
                    Err(Error::Store(format!(
                        "put s3://{}/{key} failed: {e}",
                        self.bucket
                    )))
                }
            }
        }
    }
}
