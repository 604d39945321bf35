use std::sync::Arc;
use tracing::{info, warn};

use super::upload::{ImageField, ImageUpload, UploadSink};
use crate::database_ops::gog::SCREENSHOT_FORMAT_TOKEN;
use crate::database_ops::records::GameRef;
use crate::error::PopulateError;
use crate::util::http::Fetcher;

const IMAGE_EXTENSION: &str = "jpg";

/// Fetches remote images and forwards the bytes to an [`UploadSink`].
#[derive(Clone)]
pub struct ImageRelay {
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn UploadSink>,
}

impl ImageRelay {
    pub fn new(fetcher: Arc<dyn Fetcher>, sink: Arc<dyn UploadSink>) -> Self {
        Self { fetcher, sink }
    }

    /// Relay one image. Failures are logged and reported as `false`; nothing is retried.
    pub async fn relay_image(&self, url: &str, game: &GameRef, field: ImageField) -> bool {
        match self.try_relay(url, game, field).await {
            Ok(()) => true,
            Err(e) => {
                warn!(slug = %game.slug, game_id = game.id, %field, url, error = %e, "image relay failed");
                false
            }
        }
    }

    async fn try_relay(
        &self,
        url: &str,
        game: &GameRef,
        field: ImageField,
    ) -> Result<(), PopulateError> {
        let source_url = source_url(url, field);
        let bytes = self.fetcher.get_bytes(&source_url).await?;
        let filename = format!("{}.{IMAGE_EXTENSION}", game.slug);

        info!(game_id = game.id, bytes = bytes.len(), "uploading {field} image: {filename}");
        self.sink
            .upload(ImageUpload {
                ref_id: game.id,
                field,
                filename,
                bytes,
            })
            .await
    }
}

/// Gallery URLs carry a size placeholder that has to go before fetching.
pub fn source_url(url: &str, field: ImageField) -> String {
    match field {
        ImageField::Gallery => url.replace(SCREENSHOT_FORMAT_TOKEN, ""),
        ImageField::Cover => url.to_string(),
    }
}
