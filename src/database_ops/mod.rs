pub mod cms_store;
pub mod db;
pub mod ensure_taxonomy;
pub mod gog;
pub mod ingest_games;
pub mod media;
pub mod memory_store;
pub mod pg_store;
pub mod records;
pub mod store;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::sync::Arc;
use tracing::info;

use crate::config::{PopulateConfig, StoreBackend};
use crate::util::env as env_util;
use cms_store::CmsStore;
use db::Db;
use media::upload::{HttpUploadSink, MemoryUploadSink, UploadSink};
use memory_store::MemoryStore;
use pg_store::PgStore;
use store::RecordStore;

/// Where a run writes records and image blobs.
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn RecordStore>,
    pub sink: Arc<dyn UploadSink>,
}

impl Backend {
    pub fn memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            sink: Arc::new(MemoryUploadSink::new()),
        }
    }
}

/// Open the configured backend. Images always go to the CMS upload endpoint unless the run is
/// in memory. The postgres backend checks its tables up front and refuses to start without them.
pub async fn open_backend(
    config: &PopulateConfig,
    db_url: Option<String>,
    client: Client,
) -> Result<Backend> {
    let sink: Arc<dyn UploadSink> = Arc::new(HttpUploadSink::new(client.clone(), &config.upload_url()));
    let backend = match config.store_backend {
        StoreBackend::Memory => Backend::memory(),
        StoreBackend::Cms => Backend {
            store: Arc::new(CmsStore::new(client, &config.cms_url)),
            sink,
        },
        StoreBackend::Postgres => {
            let url = match db_url {
                Some(url) => url,
                None => env_util::db_url()?,
            };
            let db = Db::connect(&url, config.db_max_connections)
                .await
                .context("connecting to postgres")?;
            let store = PgStore::new(db);
            let missing = store.missing_tables().await?;
            if !missing.is_empty() {
                bail!("database is missing tables: {}", missing.join(", "));
            }
            Backend {
                store: Arc::new(store),
                sink,
            }
        }
    };
    info!(backend = backend.store.backend(), "record store ready");
    Ok(backend)
}
