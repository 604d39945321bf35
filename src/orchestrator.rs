//! Population run: catalog fetch, then taxonomy get-or-create, then game ingestion.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::PopulateConfig;
use crate::database_ops::ensure_taxonomy::{TaxonomyEnsurer, TaxonomySummary};
use crate::database_ops::gog::catalog::{CatalogClient, CatalogParams};
use crate::database_ops::gog::details::DetailEnricher;
use crate::database_ops::gog::RawProduct;
use crate::database_ops::ingest_games::{GameIngestor, IngestOptions, ProductOutcome};
use crate::database_ops::media::relay::ImageRelay;
use crate::database_ops::media::upload::UploadSink;
use crate::database_ops::store::RecordStore;
use crate::error::PopulateError;
use crate::util::http::Fetcher;

/// Result of one run. `fatal` is set when the run stopped before ingesting anything.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub products_fetched: usize,
    pub taxonomy: TaxonomySummary,
    pub games: Vec<ProductOutcome>,
    pub fatal: Option<String>,
}

impl RunReport {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            products_fetched: 0,
            taxonomy: TaxonomySummary::default(),
            games: Vec::new(),
            fatal: None,
        }
    }

    pub fn created(&self) -> usize {
        self.games.iter().filter(|o| o.is_created()).count()
    }

    pub fn skipped(&self) -> usize {
        self.games.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.games.iter().filter(|o| o.is_failed()).count()
    }

    /// Anything failed, fatally or per item.
    pub fn has_failures(&self) -> bool {
        self.fatal.is_some() || self.failed() > 0 || !self.taxonomy.failed.is_empty()
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn log_summary(&self) {
        info!(
            products = self.products_fetched,
            taxonomy_created = self.taxonomy.created,
            taxonomy_existing = self.taxonomy.existing,
            taxonomy_merged = self.taxonomy.merged,
            taxonomy_failed = self.taxonomy.failed.len(),
            games_created = self.created(),
            games_skipped = self.skipped(),
            games_failed = self.failed(),
            elapsed_ms = self.elapsed().as_millis() as u64,
            "run complete"
        );
    }
}

pub struct Populator {
    catalog: CatalogClient,
    taxonomy: TaxonomyEnsurer,
    games: GameIngestor,
}

impl Populator {
    pub fn new(catalog: CatalogClient, taxonomy: TaxonomyEnsurer, games: GameIngestor) -> Self {
        Self {
            catalog,
            taxonomy,
            games,
        }
    }

    /// Wire every stage from `config`. `catalog_fetcher` serves the listing; `media_fetcher`
    /// serves product pages and images.
    pub fn from_config(
        config: &PopulateConfig,
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn UploadSink>,
        catalog_fetcher: Arc<dyn Fetcher>,
        media_fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, PopulateError> {
        let catalog = CatalogClient::new(catalog_fetcher, &config.catalog_api_url);
        let taxonomy = TaxonomyEnsurer::new(
            store.clone(),
            config.slug_collision,
            config.store_conflict_retries,
            config.store_concurrency,
        );
        let enricher = DetailEnricher::new(
            media_fetcher.clone(),
            &config.detail_page_base_url,
            &config.detail_selector,
        )?;
        let relay = ImageRelay::new(media_fetcher, sink);
        let games = GameIngestor::new(
            store,
            enricher,
            relay,
            IngestOptions {
                policy: config.slug_collision,
                pacing: config.pacing_delay,
                max_gallery: config.max_gallery_images,
                concurrency: config.ingest_concurrency,
            },
        );
        Ok(Self::new(catalog, taxonomy, games))
    }

    /// Fetch one catalog page and ingest it. Never returns an error: a failed catalog fetch is
    /// logged and lands in [`RunReport::fatal`], with no records written.
    pub async fn populate(&self, params: &CatalogParams) -> RunReport {
        let products = match self.catalog.fetch_catalog(params).await {
            Ok(products) => products,
            Err(e) => {
                error!(error = %e, "catalog fetch failed; nothing ingested");
                let mut report = RunReport::begin();
                report.fatal = Some(e.to_string());
                report.finished_at = Utc::now();
                return report;
            }
        };
        self.populate_products(&products).await
    }

    /// Taxonomy first, to completion, then games.
    pub async fn populate_products(&self, products: &[RawProduct]) -> RunReport {
        let mut report = RunReport::begin();
        report.products_fetched = products.len();
        if products.is_empty() {
            warn!("catalog returned no products");
        }

        report.taxonomy = self.taxonomy.ensure_taxonomy(products).await;
        report.games = self.games.ingest(products).await;
        report.finished_at = Utc::now();
        report.log_summary();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::media::upload::MemoryUploadSink;
    use crate::database_ops::memory_store::MemoryStore;
    use crate::database_ops::records::TaxonomyKind;
    use crate::util::http::testing::StaticFetcher;

    const CATALOG: &str = "https://catalog.test/v1/catalog";
    const PAGES: &str = "https://store.test/game";

    fn config() -> PopulateConfig {
        PopulateConfig {
            catalog_api_url: CATALOG.into(),
            detail_page_base_url: PAGES.into(),
            pacing_delay: Duration::ZERO,
            ..PopulateConfig::default()
        }
    }

    fn catalog_body() -> &'static str {
        r#"{
          "pages": 1,
          "products": [
            {
              "title": "Foo Bar",
              "slug": "foo-bar",
              "price": {"finalMoney": {"amount": "9.99", "currency": "USD"}},
              "releaseDate": "2020-01-01",
              "genres": [{"name": "Action", "slug": "action"}],
              "operatingSystems": ["Windows"],
              "developers": ["Acme"],
              "publishers": ["Acme"],
              "coverHorizontal": "https://img.test/cover.jpg",
              "screenshots": ["https://img.test/s1_{formatter}.jpg"]
            },
            {
              "title": "Baz",
              "slug": "baz",
              "genres": [{"name": "Action", "slug": "action"}],
              "operatingSystems": ["Windows", "Linux"],
              "developers": ["Acme"],
              "publishers": ["Other Co"]
            }
          ]
        }"#
    }

    fn populator(
        fetcher: StaticFetcher,
    ) -> (Populator, Arc<MemoryStore>, Arc<MemoryUploadSink>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemoryUploadSink::new());
        let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);
        let populator =
            Populator::from_config(&config(), store.clone(), sink.clone(), fetcher.clone(), fetcher)
                .unwrap();
        (populator, store, sink)
    }

    fn params() -> CatalogParams {
        [("limit".to_string(), "2".to_string())].into_iter().collect()
    }

    #[tokio::test]
    async fn populates_taxonomy_games_and_images() {
        let fetcher = StaticFetcher::new()
            .with(&format!("{CATALOG}?limit=2"), 200, catalog_body())
            .with(&format!("{PAGES}/foo_bar"), 200, r#"<div class="description">Fun</div>"#)
            .with("https://img.test/cover.jpg", 200, &b"c"[..])
            .with("https://img.test/s1.jpg", 200, &b"s"[..]);
        let (populator, store, sink) = populator(fetcher);

        let report = populator.populate(&params()).await;
        assert_eq!(report.fatal, None);
        assert_eq!(report.products_fetched, 2);
        assert_eq!(report.created(), 2);
        assert_eq!(report.taxonomy.created, 6);
        assert!(!report.has_failures());

        assert_eq!(store.taxonomy(TaxonomyKind::Developer).await.len(), 1);
        assert_eq!(store.taxonomy(TaxonomyKind::Publisher).await.len(), 2);
        assert_eq!(store.taxonomy(TaxonomyKind::Platform).await.len(), 2);
        assert_eq!(store.games().await.len(), 2);
        assert_eq!(sink.uploads().await.len(), 2);

        let again = populator.populate(&params()).await;
        assert_eq!(again.created(), 0);
        assert_eq!(again.skipped(), 2);
        assert_eq!(again.taxonomy.existing, 6);
        assert_eq!(store.games().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_catalog_fetch_is_fatal_and_writes_nothing() {
        let fetcher =
            StaticFetcher::new().with(&format!("{CATALOG}?limit=2"), 502, "bad gateway");
        let (populator, store, _sink) = populator(fetcher);

        let report = populator.populate(&params()).await;
        assert!(report.fatal.is_some());
        assert!(report.has_failures());
        assert_eq!(report.products_fetched, 0);
        assert!(store.games().await.is_empty());
        assert!(store.taxonomy(TaxonomyKind::Category).await.is_empty());
    }

    #[tokio::test]
    async fn report_serializes_outcomes_with_status_tags() {
        let (populator, _store, _sink) = populator(StaticFetcher::new());
        let report = populator
            .populate_products(&[RawProduct {
                title: "Solo".into(),
                slug: "solo".into(),
                ..RawProduct::default()
            }])
            .await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["games"][0]["status"], "created");
        assert_eq!(json["games"][0]["title"], "Solo");
        assert_eq!(json["products_fetched"], 1);
    }
}
