use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, instrument};

use super::db::Db;
use super::records::{GameRecord, NewGame, NewTaxonomy, TaxonomyKind, TaxonomyRecord};
use super::store::RecordStore;
use crate::error::StoreError;

const GAME_COLUMNS: &str = "id, name, slug, price, release_date, short_description, description";

/// PostgreSQL backend.
///
/// Relies on `UNIQUE (name)` on every entity table; inserts use `ON CONFLICT (name) DO NOTHING`
/// so a concurrent creator never produces a duplicate row.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Tables the backend needs that are not visible to this connection.
    pub async fn missing_tables(&self) -> Result<Vec<&'static str>, StoreError> {
        let mut required: Vec<&'static str> = vec!["games"];
        for kind in TaxonomyKind::ALL {
            required.push(kind.collection());
            required.push(kind.link_table());
        }
        let mut missing = Vec::new();
        for table in required {
            if !self.db.table_exists(table).await? {
                missing.push(table);
            }
        }
        Ok(missing)
    }

    async fn load_relations(&self, game_id: i64, fields: &mut NewGame) -> Result<(), StoreError> {
        for kind in TaxonomyKind::ALL {
            let sql = format!(
                "SELECT {col} FROM {table} WHERE game_id = $1 ORDER BY {col}",
                col = kind.link_column(),
                table = kind.link_table()
            );
            let ids: Vec<i64> = sqlx::query_scalar(&sql)
                .persistent(false)
                .bind(game_id)
                .fetch_all(&self.db.pool)
                .await?;
            *fields.relations_mut(kind) = ids;
        }
        Ok(())
    }
}

fn taxonomy_from_row(row: &PgRow) -> Result<TaxonomyRecord, StoreError> {
    Ok(TaxonomyRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
    })
}

fn game_from_row(row: &PgRow) -> Result<GameRecord, StoreError> {
    Ok(GameRecord {
        id: row.try_get("id")?,
        fields: NewGame {
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            price: row.try_get("price")?,
            release_date: row.try_get("release_date")?,
            short_description: row.try_get("short_description")?,
            description: row.try_get("description")?,
            ..NewGame::default()
        },
    })
}

#[async_trait]
impl RecordStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_taxonomy(
        &self,
        kind: TaxonomyKind,
        name: &str,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        let sql = format!(
            "SELECT id, name, slug FROM {} WHERE name = $1 LIMIT 1",
            kind.collection()
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(name)
            .fetch_optional(&self.db.pool)
            .await?;
        row.as_ref().map(taxonomy_from_row).transpose()
    }

    async fn find_taxonomy_by_slug(
        &self,
        kind: TaxonomyKind,
        slug: &str,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        let sql = format!(
            "SELECT id, name, slug FROM {} WHERE slug = $1 ORDER BY id LIMIT 1",
            kind.collection()
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(slug)
            .fetch_optional(&self.db.pool)
            .await?;
        row.as_ref().map(taxonomy_from_row).transpose()
    }

    #[instrument(skip(self, new), fields(name = %new.name))]
    async fn insert_taxonomy(
        &self,
        kind: TaxonomyKind,
        new: &NewTaxonomy,
    ) -> Result<Option<TaxonomyRecord>, StoreError> {
        let sql = format!(
            "INSERT INTO {} (name, slug) VALUES ($1, $2) \
             ON CONFLICT (name) DO NOTHING \
             RETURNING id, name, slug",
            kind.collection()
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(&new.name)
            .bind(&new.slug)
            .fetch_optional(&self.db.pool)
            .await?;
        if row.is_none() {
            debug!(%kind, "insert skipped by unique constraint");
        }
        row.as_ref().map(taxonomy_from_row).transpose()
    }

    async fn find_game(&self, name: &str) -> Result<Option<GameRecord>, StoreError> {
        let sql = format!("SELECT {GAME_COLUMNS} FROM games WHERE name = $1 LIMIT 1");
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(name)
            .fetch_optional(&self.db.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut game = game_from_row(&row)?;
        self.load_relations(game.id, &mut game.fields).await?;
        Ok(Some(game))
    }

    #[instrument(skip(self, game), fields(name = %game.name))]
    async fn insert_game(&self, game: &NewGame) -> Result<Option<GameRecord>, StoreError> {
        let mut tx = self.db.pool.begin().await?;

        let sql = format!(
            "INSERT INTO games (name, slug, price, release_date, short_description, description) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (name) DO NOTHING \
             RETURNING {GAME_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(&game.name)
            .bind(&game.slug)
            .bind(&game.price)
            .bind(game.release_date)
            .bind(&game.short_description)
            .bind(&game.description)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            // Name already taken; nothing to link.
            tx.rollback().await?;
            return Ok(None);
        };
        let mut record = game_from_row(&row)?;

        for kind in TaxonomyKind::ALL {
            let ids = game.relations(kind);
            if ids.is_empty() {
                continue;
            }
            let sql = format!(
                "INSERT INTO {table} (game_id, {col}) \
                 SELECT $1, UNNEST($2::bigint[]) \
                 ON CONFLICT DO NOTHING",
                table = kind.link_table(),
                col = kind.link_column()
            );
            sqlx::query(&sql)
                .persistent(false)
                .bind(record.id)
                .bind(ids)
                .execute(&mut *tx)
                .await?;
            *record.fields.relations_mut(kind) = ids.to_vec();
        }

        tx.commit().await?;
        Ok(Some(record))
    }
}
