//! Entity deduplication: make every developer, publisher, category and platform named by a
//! catalog page exist exactly once before any game references it.
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::gog::{Genre, RawProduct};
use super::records::{NewTaxonomy, TaxonomyKind};
use super::store::{ensure_taxonomy_record, Ensured, RecordStore, SlugCollisionPolicy};
use crate::normalization::slug::slugify;

/// Categories keep the storefront's own slug when it sent one.
pub fn category_entry(genre: &Genre) -> NewTaxonomy {
    let name = genre.name.trim().to_string();
    let slug = genre
        .slug
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| slugify(&name));
    NewTaxonomy { name, slug }
}

pub fn named_entry(name: &str) -> NewTaxonomy {
    let name = name.trim().to_string();
    let slug = slugify(&name);
    NewTaxonomy { name, slug }
}

/// Every taxonomy reference a product makes, in product order. Blank names are dropped.
pub fn taxonomy_refs(product: &RawProduct) -> Vec<(TaxonomyKind, NewTaxonomy)> {
    let mut refs = Vec::new();
    for name in &product.developers {
        refs.push((TaxonomyKind::Developer, named_entry(name)));
    }
    for name in &product.publishers {
        refs.push((TaxonomyKind::Publisher, named_entry(name)));
    }
    for genre in &product.genres {
        refs.push((TaxonomyKind::Category, category_entry(genre)));
    }
    for name in &product.operating_systems {
        refs.push((TaxonomyKind::Platform, named_entry(name)));
    }
    refs.retain(|(_, entry)| !entry.name.is_empty());
    refs
}

/// Distinct names per kind, first-seen order; the first slug seen for a name wins.
#[derive(Debug, Default)]
pub struct TaxonomyPlan {
    by_kind: IndexMap<TaxonomyKind, IndexMap<String, NewTaxonomy>>,
}

impl TaxonomyPlan {
    pub fn from_products(products: &[RawProduct]) -> Self {
        let mut plan = Self::default();
        for product in products {
            for (kind, entry) in taxonomy_refs(product) {
                plan.by_kind
                    .entry(kind)
                    .or_default()
                    .entry(entry.name.clone())
                    .or_insert(entry);
            }
        }
        plan
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self, kind: TaxonomyKind) -> Vec<&str> {
        self.by_kind
            .get(&kind)
            .map(|entries| entries.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn into_entries(self) -> impl Iterator<Item = (TaxonomyKind, NewTaxonomy)> {
        self.by_kind
            .into_iter()
            .flat_map(|(kind, entries)| entries.into_values().map(move |e| (kind, e)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub kind: TaxonomyKind,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaxonomySummary {
    pub created: usize,
    pub existing: usize,
    pub merged: usize,
    pub failed: Vec<ItemFailure>,
}

impl TaxonomySummary {
    pub fn total(&self) -> usize {
        self.created + self.existing + self.merged + self.failed.len()
    }
}

/// Fan-out width: `0` means one task per item.
pub(crate) fn concurrency_limit(configured: usize, items: usize) -> usize {
    if configured == 0 {
        items.max(1)
    } else {
        configured
    }
}

#[derive(Clone)]
pub struct TaxonomyEnsurer {
    store: Arc<dyn RecordStore>,
    policy: SlugCollisionPolicy,
    conflict_retries: u32,
    concurrency: usize,
}

impl TaxonomyEnsurer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        policy: SlugCollisionPolicy,
        conflict_retries: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            policy,
            conflict_retries,
            concurrency,
        }
    }

    /// Get-or-create every referenced taxonomy record. Returns once every item has settled;
    /// a failing item is logged and counted without stopping the others.
    pub async fn ensure_taxonomy(&self, products: &[RawProduct]) -> TaxonomySummary {
        let plan = TaxonomyPlan::from_products(products);
        if plan.is_empty() {
            info!("taxonomy: no names referenced");
            return TaxonomySummary::default();
        }
        let limit = concurrency_limit(self.concurrency, plan.len());
        info!(
            distinct = plan.len(),
            backend = self.store.backend(),
            concurrency = limit,
            "taxonomy: ensuring records"
        );

        let results: Vec<_> = stream::iter(plan.into_entries())
            .map(|(kind, entry)| async move {
                let outcome = ensure_taxonomy_record(
                    self.store.as_ref(),
                    kind,
                    &entry,
                    self.policy,
                    self.conflict_retries,
                )
                .await;
                (kind, entry.name, outcome)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut summary = TaxonomySummary::default();
        for (kind, name, outcome) in results {
            match outcome {
                Ok(Ensured::Created(_)) => summary.created += 1,
                Ok(Ensured::Existing(_)) => summary.existing += 1,
                Ok(Ensured::Merged(_)) => summary.merged += 1,
                Err(e) => {
                    warn!(%kind, name = %name, error = %e, "taxonomy: get-or-create failed");
                    summary.failed.push(ItemFailure {
                        kind,
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            created = summary.created,
            existing = summary.existing,
            merged = summary.merged,
            failed = summary.failed.len(),
            "taxonomy: done"
        );
        summary
    }
}
