//! Game ingestion: one game per catalog product, linked to the taxonomy records created earlier,
//! enriched from the product page, with cover and gallery images relayed afterwards.
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::ensure_taxonomy::{concurrency_limit, taxonomy_refs};
use super::gog::details::DetailEnricher;
use super::gog::RawProduct;
use super::media::relay::ImageRelay;
use super::media::upload::ImageField;
use super::records::{GameRef, NewGame};
use super::store::{resolve_taxonomy_record, RecordStore, SlugCollisionPolicy};
use crate::error::{PopulateError, StoreError};
use crate::normalization::release::{normalize_release_date, parse_price};
use crate::normalization::slug::game_slug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProductOutcome {
    Created {
        title: String,
        game_id: i64,
        enriched: bool,
        images_uploaded: usize,
        images_failed: usize,
        /// Taxonomy references that had no record when the game was linked.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        unresolved: Vec<String>,
    },
    Skipped {
        title: String,
        reason: String,
    },
    Failed {
        title: String,
        error: String,
    },
}

impl ProductOutcome {
    pub fn title(&self) -> &str {
        match self {
            ProductOutcome::Created { title, .. }
            | ProductOutcome::Skipped { title, .. }
            | ProductOutcome::Failed { title, .. } => title,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, ProductOutcome::Created { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ProductOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProductOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub policy: SlugCollisionPolicy,
    /// Pause after each created game.
    pub pacing: Duration,
    pub max_gallery: usize,
    /// Products in flight at once; `0` means all of them.
    pub concurrency: usize,
}

#[derive(Clone)]
pub struct GameIngestor {
    store: Arc<dyn RecordStore>,
    enricher: DetailEnricher,
    relay: ImageRelay,
    options: IngestOptions,
}

#[derive(Debug, Default)]
struct ImageTally {
    uploaded: usize,
    failed: usize,
}

impl GameIngestor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        enricher: DetailEnricher,
        relay: ImageRelay,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            enricher,
            relay,
            options,
        }
    }

    /// Ingest every product. Outcomes come back in product order; one product failing never
    /// stops the rest.
    pub async fn ingest(&self, products: &[RawProduct]) -> Vec<ProductOutcome> {
        let limit = concurrency_limit(self.options.concurrency, products.len());
        info!(
            products = products.len(),
            concurrency = limit,
            pacing_ms = self.options.pacing.as_millis() as u64,
            "games: ingesting"
        );
        stream::iter(products)
            .map(|product| self.ingest_product(product))
            .buffered(limit)
            .collect()
            .await
    }

    pub async fn ingest_product(&self, product: &RawProduct) -> ProductOutcome {
        match self.try_ingest(product).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(title = %product.title, error = %e, "games: ingest failed");
                ProductOutcome::Failed {
                    title: product.title.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_ingest(&self, product: &RawProduct) -> Result<ProductOutcome, PopulateError> {
        if let Some(existing) = self.store.find_game(&product.title).await? {
            debug!(title = %product.title, game_id = existing.id, "games: already exists");
            return Ok(ProductOutcome::Skipped {
                title: product.title.clone(),
                reason: "already exists".into(),
            });
        }

        info!("Creating: {}...", product.title);
        let mut game = NewGame {
            name: product.title.clone(),
            slug: game_slug(&product.slug),
            price: product.final_amount().and_then(|raw| {
                let parsed = parse_price(raw);
                if parsed.is_none() {
                    warn!(title = %product.title, raw, "games: unparseable price");
                }
                parsed
            }),
            release_date: product.release_date.as_deref().and_then(|raw| {
                let parsed = normalize_release_date(raw);
                if parsed.is_none() {
                    warn!(title = %product.title, raw, "games: unparseable release date");
                }
                parsed
            }),
            ..NewGame::default()
        };

        let unresolved = self.link_taxonomy(product, &mut game).await?;

        let details = self.enricher.fetch_details(&game.slug).await;
        let enriched = details.is_some();
        if let Some(details) = details {
            game.short_description = Some(details.short_description);
            game.description = Some(details.description);
        }

        let Some(created) = self.store.insert_game(&game).await? else {
            // A conflict only counts as a skip when the winning row is actually readable.
            if let Some(existing) = self.store.find_game(&product.title).await? {
                debug!(title = %product.title, game_id = existing.id, "games: created concurrently by another writer");
                return Ok(ProductOutcome::Skipped {
                    title: product.title.clone(),
                    reason: "created concurrently".into(),
                });
            }
            return Err(StoreError::Refused {
                entity: "game".into(),
                name: product.title.clone(),
                reason: "insert reported a name conflict but no game with this name exists".into(),
            }
            .into());
        };
        info!(title = %product.title, game_id = created.id, "games: created");

        let images = self.relay_images(product, &created.game_ref()).await;

        if !self.options.pacing.is_zero() {
            sleep(self.options.pacing).await;
        }

        Ok(ProductOutcome::Created {
            title: product.title.clone(),
            game_id: created.id,
            enriched,
            images_uploaded: images.uploaded,
            images_failed: images.failed,
            unresolved,
        })
    }

    /// Fill the game's relation lists. A reference with no record is logged and dropped.
    async fn link_taxonomy(
        &self,
        product: &RawProduct,
        game: &mut NewGame,
    ) -> Result<Vec<String>, PopulateError> {
        let mut unresolved = Vec::new();
        for (kind, entry) in taxonomy_refs(product) {
            let found = resolve_taxonomy_record(
                self.store.as_ref(),
                kind,
                &entry.name,
                &entry.slug,
                self.options.policy,
            )
            .await?;
            match found {
                Some(record) => {
                    let ids = game.relations_mut(kind);
                    if !ids.contains(&record.id) {
                        ids.push(record.id);
                    }
                }
                None => {
                    warn!(title = %product.title, %kind, name = %entry.name, "games: no record to link");
                    unresolved.push(format!("{kind}:{}", entry.name));
                }
            }
        }
        Ok(unresolved)
    }

    /// Cover first, then up to `max_gallery` screenshots one at a time.
    async fn relay_images(&self, product: &RawProduct, game: &GameRef) -> ImageTally {
        let mut tally = ImageTally::default();
        let cover = product
            .cover_horizontal
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| (url, ImageField::Cover));
        let gallery = product
            .screenshots
            .iter()
            .take(self.options.max_gallery)
            .map(|url| (url.as_str(), ImageField::Gallery));

        for (url, field) in cover.into_iter().chain(gallery) {
            if self.relay.relay_image(url, game, field).await {
                tally.uploaded += 1;
            } else {
                tally.failed += 1;
            }
        }
        tally
    }
}
