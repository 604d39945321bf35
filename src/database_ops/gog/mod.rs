//! GOG storefront: catalog API payloads, catalog client, and product page scraping.
pub mod catalog;
pub mod details;

use serde::{Deserialize, Deserializer, Serialize};

/// Token the catalog embeds in screenshot URLs where an image size would go.
pub const SCREENSHOT_FORMAT_TOKEN: &str = "_{formatter}";

/// One product as returned by the catalog API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub price: Option<ProductPrice>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genres: Vec<Genre>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub operating_systems: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub developers: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub publishers: Vec<String>,
    #[serde(default)]
    pub cover_horizontal: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub screenshots: Vec<String>,
}

impl RawProduct {
    /// `price.finalMoney.amount`, when the catalog sent one.
    pub fn final_amount(&self) -> Option<&str> {
        self.price
            .as_ref()
            .and_then(|p| p.final_money.as_ref())
            .map(|m| m.amount.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPrice {
    #[serde(default)]
    pub final_money: Option<Money>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Money {
    pub amount: String,
}

/// Genres arrive as name/slug pairs and become categories as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Top-level catalog response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub products: Vec<RawProduct>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub product_count: Option<serde_json::Value>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
