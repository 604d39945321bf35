use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity types a game links to many-to-many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyKind {
    Developer,
    Publisher,
    Category,
    Platform,
}

impl TaxonomyKind {
    pub const ALL: [TaxonomyKind; 4] = [
        TaxonomyKind::Developer,
        TaxonomyKind::Publisher,
        TaxonomyKind::Category,
        TaxonomyKind::Platform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyKind::Developer => "developer",
            TaxonomyKind::Publisher => "publisher",
            TaxonomyKind::Category => "category",
            TaxonomyKind::Platform => "platform",
        }
    }

    /// Table name in the sql backend and collection path in the CMS backend.
    pub fn collection(&self) -> &'static str {
        match self {
            TaxonomyKind::Developer => "developers",
            TaxonomyKind::Publisher => "publishers",
            TaxonomyKind::Category => "categories",
            TaxonomyKind::Platform => "platforms",
        }
    }

    /// Link table joining games to this kind (`games_<collection>`).
    pub fn link_table(&self) -> &'static str {
        match self {
            TaxonomyKind::Developer => "games_developers",
            TaxonomyKind::Publisher => "games_publishers",
            TaxonomyKind::Category => "games_categories",
            TaxonomyKind::Platform => "games_platforms",
        }
    }

    /// Foreign key column inside [`Self::link_table`].
    pub fn link_column(&self) -> &'static str {
        match self {
            TaxonomyKind::Developer => "developer_id",
            TaxonomyKind::Publisher => "publisher_id",
            TaxonomyKind::Category => "category_id",
            TaxonomyKind::Platform => "platform_id",
        }
    }
}

impl fmt::Display for TaxonomyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTaxonomy {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Fields of a game about to be created. Relation lists hold taxonomy record ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewGame {
    pub name: String,
    pub slug: String,
    pub price: Option<BigDecimal>,
    pub release_date: Option<DateTime<Utc>>,
    pub categories: Vec<i64>,
    pub platforms: Vec<i64>,
    pub developers: Vec<i64>,
    pub publishers: Vec<i64>,
    pub short_description: Option<String>,
    pub description: Option<String>,
}

impl NewGame {
    pub fn relations(&self, kind: TaxonomyKind) -> &[i64] {
        match kind {
            TaxonomyKind::Developer => &self.developers,
            TaxonomyKind::Publisher => &self.publishers,
            TaxonomyKind::Category => &self.categories,
            TaxonomyKind::Platform => &self.platforms,
        }
    }

    pub fn relations_mut(&mut self, kind: TaxonomyKind) -> &mut Vec<i64> {
        match kind {
            TaxonomyKind::Developer => &mut self.developers,
            TaxonomyKind::Publisher => &mut self.publishers,
            TaxonomyKind::Category => &mut self.categories,
            TaxonomyKind::Platform => &mut self.platforms,
        }
    }
}

/// A stored game. Relations are whatever the store linked at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: i64,
    #[serde(flatten)]
    pub fields: NewGame,
}

impl GameRecord {
    pub fn slug(&self) -> &str {
        &self.fields.slug
    }

    pub fn game_ref(&self) -> GameRef {
        GameRef {
            id: self.id,
            slug: self.fields.slug.clone(),
        }
    }
}

/// The part of a game an image upload needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRef {
    pub id: i64,
    pub slug: String,
}
