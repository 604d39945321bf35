use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use super::records::{GameRecord, NewGame, NewTaxonomy, TaxonomyKind, TaxonomyRecord};
use super::store::RecordStore;
use crate::error::StoreError;

/// In-process store for dry runs and tests.
///
/// Inserts are checked and applied under one lock, so insert-if-absent is atomic. Game inserts
/// refuse relation ids that do not exist, mirroring a foreign key.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    taxonomy: HashMap<TaxonomyKind, IndexMap<String, TaxonomyRecord>>,
    games: IndexMap<String, GameRecord>,
    refused_games: HashSet<String>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of `kind` in insertion order.
    pub async fn taxonomy(&self, kind: TaxonomyKind) -> Vec<TaxonomyRecord> {
        let state = self.state.lock().await;
        state
            .taxonomy
            .get(&kind)
            .map(|by_name| by_name.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Games in insertion order.
    pub async fn games(&self) -> Vec<GameRecord> {
        self.state.lock().await.games.values().cloned().collect()
    }

    /// Make every later insert of a game with this name fail.
    pub async fn refuse_game(&self, name: &str) {
        self.state.lock().await.refused_games.insert(name.to_string());
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_taxonomy(
        &self,
        kind: TaxonomyKind,
        name: &str,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .taxonomy
            .get(&kind)
            .and_then(|by_name| by_name.get(name))
            .cloned())
    }

    async fn find_taxonomy_by_slug(
        &self,
        kind: TaxonomyKind,
        slug: &str,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .taxonomy
            .get(&kind)
            .and_then(|by_name| by_name.values().find(|r| r.slug == slug))
            .cloned())
    }

    async fn insert_taxonomy(
        &self,
        kind: TaxonomyKind,
        new: &NewTaxonomy,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        let mut state = self.state.lock().await;
        if state
            .taxonomy
            .get(&kind)
            .is_some_and(|by_name| by_name.contains_key(&new.name))
        {
            return Ok(None);
        }
        let record = TaxonomyRecord {
            id: state.allocate_id(),
            name: new.name.clone(),
            slug: new.slug.clone(),
        };
        state
            .taxonomy
            .entry(kind)
            .or_default()
            .insert(new.name.clone(), record.clone());
        Ok(Some(record))
    }

    async fn find_game(&self, name: &str) -> Result<Option<GameRecord>, StoreError> {
        Ok(self.state.lock().await.games.get(name).cloned())
    }

    async fn insert_game(&self, game: &NewGame) -> Result<Option<GameRecord>, StoreError> {
        let mut state = self.state.lock().await;
        if state.refused_games.contains(&game.name) {
            return Err(StoreError::Refused {
                entity: "game".into(),
                name: game.name.clone(),
                reason: "refused by store".into(),
            });
        }
        if state.games.contains_key(&game.name) {
            return Ok(None);
        }
        for kind in TaxonomyKind::ALL {
            let known = state.taxonomy.get(&kind);
            for id in game.relations(kind) {
                let exists = known.is_some_and(|by_name| by_name.values().any(|r| r.id == *id));
                if !exists {
                    return Err(StoreError::Refused {
                        entity: "game".into(),
                        name: game.name.clone(),
                        reason: format!("{kind} id {id} does not exist"),
                    });
                }
            }
        }
        let record = GameRecord {
            id: state.allocate_id(),
            fields: game.clone(),
        };
        state.games.insert(game.name.clone(), record.clone());
        Ok(Some(record))
    }
}
