//! Object store seam and the deck image asset convention.

pub mod s3;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::imaging;
use crate::telemetry::metrics;
use crate::upstream::DeckImageSource;

pub use s3::S3Store;

/// Blob storage used for converted deck images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(false)` only on a definitive "no such key"; any other failure is
    /// an error.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Store a publicly readable object. Returns `Error::Conflict` when the
    /// key was created concurrently.
    async fn put_public(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// Object key for a deck code's converted image.
pub fn deck_image_key(deck_code: &str) -> String {
    format!("images/decks/{deck_code}.jpg")
}

/// What `ensure_deck_image` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckImage {
    AlreadyStored,
    Uploaded,
}

impl DeckImage {
    fn as_str(self) -> &'static str {
        match self {
            DeckImage::AlreadyStored => "present",
            DeckImage::Uploaded => "uploaded",
        }
    }
}

/// Make sure the converted image for `deck_code` is in the store.
///
/// Checks existence first; only when the key is definitely absent does it
/// fetch the source raster, convert it, and upload it.
pub async fn ensure_deck_image(
    store: &dyn ObjectStore,
    source: &dyn DeckImageSource,
    deck_code: &str,
) -> Result<DeckImage> {
    let key = deck_image_key(deck_code);

    let outcome = if store.exists(&key).await? {
        debug!(deck_code, key = %key, "deck image already stored");
        DeckImage::AlreadyStored
    } else {
        let raster = source.deck_image(deck_code).await?;
        let jpeg = imaging::to_jpeg_blocking(raster).await?;
        let size = jpeg.len();
        match store.put_public(&key, jpeg, imaging::JPEG_CONTENT_TYPE).await {
            Ok(()) => {
                info!(deck_code, key = %key, size, "deck image uploaded");
                DeckImage::Uploaded
            }
            Err(Error::Conflict(_)) => {
                debug!(deck_code, key = %key, "deck image stored concurrently");
                DeckImage::AlreadyStored
            }
            Err(e) => return Err(e),
        }
    };

    metrics::deck_images().add(1, &[KeyValue::new("result", outcome.as_str())]);
    Ok(outcome)
}
