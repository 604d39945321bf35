use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::fmt;
use tokio::sync::Mutex;

use crate::error::PopulateError;

/// Entity reference every upload is attached to.
pub const UPLOAD_REF: &str = "game";
const UPLOAD_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageField {
    Cover,
    Gallery,
}

impl ImageField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageField::Cover => "cover",
            ImageField::Gallery => "gallery",
        }
    }
}

impl fmt::Display for ImageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One blob bound for the upload sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub ref_id: i64,
    pub field: ImageField,
    pub filename: String,
    pub bytes: Bytes,
}

#[async_trait]
pub trait UploadSink: Send + Sync {
    async fn upload(&self, upload: ImageUpload) -> Result<(), PopulateError>;
}

/// Multipart upload to the CMS `/upload` endpoint.
#[derive(Clone)]
pub struct HttpUploadSink {
    client: Client,
    endpoint: String,
}

impl HttpUploadSink {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    fn form(upload: ImageUpload) -> reqwest::Result<Form> {
        let file = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.filename)
            .mime_str(UPLOAD_MIME)?;
        Ok(Form::new()
            .text("refId", upload.ref_id.to_string())
            .text("ref", UPLOAD_REF)
            .text("field", upload.field.as_str())
            .part("files", file))
    }
}

#[async_trait]
impl UploadSink for HttpUploadSink {
    async fn upload(&self, upload: ImageUpload) -> Result<(), PopulateError> {
        let form = Self::form(upload).map_err(|e| PopulateError::network(&self.endpoint, e))?;
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PopulateError::network(&self.endpoint, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PopulateError::status(&self.endpoint, status.as_u16(), &body));
        }
        Ok(())
    }
}

/// Keeps uploads in memory; used for dry runs and tests.
#[derive(Default)]
pub struct MemoryUploadSink {
    uploads: Mutex<Vec<ImageUpload>>,
}

impl MemoryUploadSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn uploads(&self) -> Vec<ImageUpload> {
        self.uploads.lock().await.clone()
    }
}

#[async_trait]
impl UploadSink for MemoryUploadSink {
    async fn upload(&self, upload: ImageUpload) -> Result<(), PopulateError> {
        self.uploads.lock().await.push(upload);
        Ok(())
    }
}
