//! Record store seam.
//!
//! Every backend exposes the same narrow contract: find-by-name per entity type and an atomic
//! insert-if-absent keyed on the name. Get-or-create is layered on top of those two calls in
//! [`ensure_taxonomy_record`], so the race between two concurrent "find then create" pairs is
//! settled by the store's uniqueness guarantee instead of by luck.
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::records::{GameRecord, NewGame, NewTaxonomy, TaxonomyKind, TaxonomyRecord};
use crate::error::StoreError;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend label used in logs.
    fn backend(&self) -> &'static str;

    async fn find_taxonomy(
        &self,
        kind: TaxonomyKind,
        name: &str,
    ) -> Result<Option<TaxonomyRecord>, StoreError>;

    async fn find_taxonomy_by_slug(
        &self,
        kind: TaxonomyKind,
        slug: &str,
    ) -> Result<Option<TaxonomyRecord>, StoreError>;

    /// Insert unless a record with the same name exists. `Ok(None)` means the name was taken.
    async fn insert_taxonomy(
        &self,
        kind: TaxonomyKind,
        new: &NewTaxonomy,
    ) -> Result<Option<TaxonomyRecord>, StoreError>;

    async fn find_game(&self, name: &str) -> Result<Option<GameRecord>, StoreError>;

    /// Insert unless a game with the same name exists. `Ok(None)` means the name was taken.
    async fn insert_game(&self, game: &NewGame) -> Result<Option<GameRecord>, StoreError>;
}

/// What to do when a new name derives a slug another record of the same kind already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlugCollisionPolicy {
    /// Store both records with the same slug.
    #[default]
    Allow,
    /// Reuse the record that already holds the slug.
    Merge,
    /// Fail the item.
    Error,
}

impl FromStr for SlugCollisionPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "merge" => Ok(Self::Merge),
            "error" | "reject" => Ok(Self::Error),
            other => Err(format!(
                "unknown slug collision policy '{other}' (expected allow, merge or error)"
            )),
        }
    }
}

impl fmt::Display for SlugCollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Merge => "merge",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured {
    Created(TaxonomyRecord),
    Existing(TaxonomyRecord),
    /// The name was folded into a record holding the same slug under another name.
    Merged(TaxonomyRecord),
}

impl Ensured {
    pub fn record(&self) -> &TaxonomyRecord {
        match self {
            Ensured::Created(r) | Ensured::Existing(r) | Ensured::Merged(r) => r,
        }
    }
}

/// Get-or-create a taxonomy record by name.
///
/// A lost insert race is followed by a re-read; if the winner is still not visible the insert
/// is retried, up to `max_attempts` inserts in total.
pub async fn ensure_taxonomy_record(
    store: &dyn RecordStore,
    kind: TaxonomyKind,
    new: &NewTaxonomy,
    policy: SlugCollisionPolicy,
    max_attempts: u32,
) -> Result<Ensured, StoreError> {
    if let Some(existing) = store.find_taxonomy(kind, &new.name).await? {
        return Ok(Ensured::Existing(existing));
    }

    if policy != SlugCollisionPolicy::Allow {
        if let Some(holder) = store.find_taxonomy_by_slug(kind, &new.slug).await? {
            if holder.name != new.name {
                if policy == SlugCollisionPolicy::Merge {
                    debug!(%kind, name = %new.name, merged_into = %holder.name, slug = %new.slug, "slug collision merged");
                    return Ok(Ensured::Merged(holder));
                }
                return Err(StoreError::SlugConflict {
                    kind,
                    slug: new.slug.clone(),
                    requested: new.name.clone(),
                    existing: holder.name,
                });
            }
        }
    }

    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(created) = store.insert_taxonomy(kind, new).await? {
            return Ok(Ensured::Created(created));
        }
        if let Some(existing) = store.find_taxonomy(kind, &new.name).await? {
            return Ok(Ensured::Existing(existing));
        }
        debug!(%kind, name = %new.name, attempt, "insert conflicted but no row visible; retrying");
    }

    Err(StoreError::ConflictRetriesExhausted {
        kind,
        name: new.name.clone(),
        attempts,
    })
}

/// Look a taxonomy record up for linking. Under [`SlugCollisionPolicy::Merge`] a name miss
/// falls back to the slug so merged names still resolve.
pub async fn resolve_taxonomy_record(
    store: &dyn RecordStore,
    kind: TaxonomyKind,
    name: &str,
    slug: &str,
    policy: SlugCollisionPolicy,
) -> Result<Option<TaxonomyRecord>, StoreError> {
    if let Some(found) = store.find_taxonomy(kind, name).await? {
        return Ok(Some(found));
    }
    if policy == SlugCollisionPolicy::Merge {
        return store.find_taxonomy_by_slug(kind, slug).await;
    }
    Ok(None)
}
