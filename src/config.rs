use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::database_ops::store::SlugCollisionPolicy;
use crate::util::env::{env_opt, env_parse, log_snapshot};
use crate::util::http::RateLimitSettings;

pub const DEFAULT_CATALOG_API_URL: &str = "https://catalog.gog.com/v1/catalog";
pub const DEFAULT_DETAIL_PAGE_BASE_URL: &str = "https://www.gog.com/game";
pub const DEFAULT_DETAIL_SELECTOR: &str = ".description";
pub const DEFAULT_CMS_URL: &str = "http://localhost:1337";
pub const DEFAULT_USER_AGENT: &str = "catalog-seeder/0.1";
pub const DEFAULT_PACING_DELAY_MS: u64 = 2_000;
pub const DEFAULT_MAX_GALLERY_IMAGES: usize = 5;

/// Where records are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Cms,
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cms" | "rest" => Ok(Self::Cms),
            "postgres" | "pg" | "sql" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!(
                "unknown store backend '{other}' (expected cms, postgres or memory)"
            )),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cms => "cms",
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        })
    }
}

/// Settings for one population run.
#[derive(Debug, Clone)]
pub struct PopulateConfig {
    pub catalog_api_url: String,
    pub detail_page_base_url: String,
    pub detail_selector: String,
    /// CMS root; the record store collections and `/upload` hang off it.
    pub cms_url: String,
    pub store_backend: StoreBackend,
    pub db_max_connections: u32,
    pub http_timeout: Duration,
    pub user_agent: String,
    /// Wait after each created game before it counts as done.
    pub pacing_delay: Duration,
    pub max_gallery_images: usize,
    /// Products ingested at once; 0 means no cap.
    pub ingest_concurrency: usize,
    /// Taxonomy get-or-creates in flight at once; 0 means no cap.
    pub store_concurrency: usize,
    /// Throttle for detail page and image fetches.
    pub media_rate_limit: RateLimitSettings,
    pub slug_collision: SlugCollisionPolicy,
    pub store_conflict_retries: u32,
}

impl Default for PopulateConfig {
    fn default() -> Self {
        Self {
            catalog_api_url: DEFAULT_CATALOG_API_URL.to_string(),
            detail_page_base_url: DEFAULT_DETAIL_PAGE_BASE_URL.to_string(),
            detail_selector: DEFAULT_DETAIL_SELECTOR.to_string(),
            cms_url: DEFAULT_CMS_URL.to_string(),
            store_backend: StoreBackend::default(),
            db_max_connections: 8,
            http_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pacing_delay: Duration::from_millis(DEFAULT_PACING_DELAY_MS),
            max_gallery_images: DEFAULT_MAX_GALLERY_IMAGES,
            ingest_concurrency: 4,
            store_concurrency: 16,
            media_rate_limit: RateLimitSettings {
                max_ops_per_window: 10,
                window_secs: 1,
            },
            slug_collision: SlugCollisionPolicy::default(),
            store_conflict_retries: 3,
        }
    }
}

impl PopulateConfig {
    /// Defaults overridden by environment variables (and `.env`).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            catalog_api_url: env_opt("CATALOG_API_URL").unwrap_or(defaults.catalog_api_url),
            detail_page_base_url: env_opt("DETAIL_PAGE_BASE_URL")
                .unwrap_or(defaults.detail_page_base_url),
            detail_selector: env_opt("DETAIL_SELECTOR").unwrap_or(defaults.detail_selector),
            cms_url: env_opt("CMS_URL").unwrap_or(defaults.cms_url),
            store_backend: env_parse("STORE_BACKEND", defaults.store_backend),
            db_max_connections: env_parse("DB_MAX_CONNS", defaults.db_max_connections),
            http_timeout: Duration::from_secs(env_parse(
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )),
            user_agent: env_opt("HTTP_USER_AGENT").unwrap_or(defaults.user_agent),
            pacing_delay: Duration::from_millis(env_parse(
                "PACING_DELAY_MS",
                DEFAULT_PACING_DELAY_MS,
            )),
            max_gallery_images: env_parse("MAX_GALLERY_IMAGES", defaults.max_gallery_images),
            ingest_concurrency: env_parse("INGEST_CONCURRENCY", defaults.ingest_concurrency),
            store_concurrency: env_parse("STORE_CONCURRENCY", defaults.store_concurrency),
            media_rate_limit: RateLimitSettings::from_env(
                "MEDIA_MAX_OPS_PER_WINDOW",
                "MEDIA_WINDOW_SECS",
                defaults.media_rate_limit.max_ops_per_window,
                defaults.media_rate_limit.window_secs,
            ),
            slug_collision: env_parse("SLUG_COLLISION", defaults.slug_collision),
            store_conflict_retries: env_parse(
                "STORE_CONFLICT_RETRIES",
                defaults.store_conflict_retries,
            ),
        }
    }

    /// Multipart upload endpoint of the CMS.
    pub fn upload_url(&self) -> String {
        format!("{}/upload", self.cms_url.trim_end_matches('/'))
    }

    pub fn log_snapshot(&self) {
        log_snapshot(
            "catalog-seeder",
            &[
                ("CATALOG_API_URL", self.catalog_api_url.clone()),
                ("DETAIL_PAGE_BASE_URL", self.detail_page_base_url.clone()),
                ("DETAIL_SELECTOR", self.detail_selector.clone()),
                ("CMS_URL", self.cms_url.clone()),
                ("STORE_BACKEND", self.store_backend.to_string()),
                ("PACING_DELAY_MS", self.pacing_delay.as_millis().to_string()),
                ("MAX_GALLERY_IMAGES", self.max_gallery_images.to_string()),
                ("INGEST_CONCURRENCY", self.ingest_concurrency.to_string()),
                ("STORE_CONCURRENCY", self.store_concurrency.to_string()),
                (
                    "MEDIA_MAX_OPS_PER_WINDOW",
                    self.media_rate_limit.max_ops_per_window.to_string(),
                ),
                ("MEDIA_WINDOW_SECS", self.media_rate_limit.window_secs.to_string()),
                ("SLUG_COLLISION", self.slug_collision.to_string()),
            ],
        );
    }
}

/// Parse `key=value` catalog query parameters.
pub fn parse_query_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_url_hangs_off_cms_root() {
        let config = PopulateConfig {
            cms_url: "http://cms.local:1337/".into(),
            ..PopulateConfig::default()
        };
        assert_eq!(config.upload_url(), "http://cms.local:1337/upload");
    }

    #[test]
    fn defaults_keep_two_second_pacing_and_five_gallery_images() {
        let config = PopulateConfig::default();
        assert_eq!(config.pacing_delay, Duration::from_secs(2));
        assert_eq!(config.max_gallery_images, 5);
        assert_eq!(config.slug_collision, SlugCollisionPolicy::Allow);
    }

    #[test]
    fn store_backend_parses_aliases() {
        assert_eq!("PG".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert_eq!("rest".parse::<StoreBackend>(), Ok(StoreBackend::Cms));
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn query_params_split_on_first_equals() {
        assert_eq!(
            parse_query_param("order=desc:trending").unwrap(),
            ("order".to_string(), "desc:trending".to_string())
        );
        assert_eq!(
            parse_query_param("productType=in:game,pack").unwrap().1,
            "in:game,pack"
        );
        assert_eq!(parse_query_param("q=a=b").unwrap().1, "a=b");
        assert!(parse_query_param("limit").is_err());
        assert!(parse_query_param("=5").is_err());
    }
}
