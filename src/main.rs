use anyhow::{anyhow, Context, Result};
use catalog_seeder::config::{parse_query_param, PopulateConfig, StoreBackend};
use catalog_seeder::database_ops::gog::catalog::CatalogParams;
use catalog_seeder::database_ops::open_backend;
use catalog_seeder::database_ops::store::SlugCollisionPolicy;
use catalog_seeder::orchestrator::Populator;
use catalog_seeder::util::env as env_util;
use catalog_seeder::util::http::{build_client, ReqwestFetcher, RequestThrottle};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "catalog-seeder",
    version,
    about = "Seed the game catalog from the storefront listing"
)]
struct Cli {
    /// Catalog query parameter as key=value; repeat for more (forwarded in order)
    #[arg(short = 'p', long = "param", value_parser = parse_query_param)]
    params: Vec<(String, String)>,
    /// Record store: cms, postgres or memory (overrides STORE_BACKEND)
    #[arg(long)]
    store: Option<StoreBackend>,
    /// Write to an in-memory store and upload sink instead of the real backend
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Optional override for the database URL (postgres backend)
    #[arg(long)]
    db_url: Option<String>,
    /// Optional override for CMS_URL
    #[arg(long)]
    cms_url: Option<String>,
    /// Products ingested at once; 0 means no cap (overrides INGEST_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Pause after each created game in milliseconds (overrides PACING_DELAY_MS)
    #[arg(long)]
    pacing_ms: Option<u64>,
    /// Gallery images uploaded per game (overrides MAX_GALLERY_IMAGES)
    #[arg(long)]
    max_gallery: Option<usize>,
    /// allow, merge or error (overrides SLUG_COLLISION)
    #[arg(long)]
    slug_collision: Option<SlugCollisionPolicy>,
}

impl Cli {
    fn apply(&self, config: &mut PopulateConfig) {
        if let Some(store) = self.store {
            config.store_backend = store;
        }
        if self.dry_run {
            config.store_backend = StoreBackend::Memory;
        }
        if let Some(url) = &self.cms_url {
            config.cms_url = url.clone();
        }
        if let Some(n) = self.concurrency {
            config.ingest_concurrency = n;
        }
        if let Some(ms) = self.pacing_ms {
            config.pacing_delay = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_gallery {
            config.max_gallery_images = n;
        }
        if let Some(policy) = self.slug_collision {
            config.slug_collision = policy;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    catalog_seeder::tracing::init_tracing("info,sqlx=warn")?;

    let cli = Cli::parse();
    let mut config = PopulateConfig::from_env();
    cli.apply(&mut config);
    config.log_snapshot();

    let client = build_client(&config.user_agent, config.http_timeout)
        .map_err(|e| anyhow!("building http client: {e}"))?;
    if config.store_backend == StoreBackend::Memory && !cli.dry_run {
        warn!("memory backend selected; nothing will be persisted");
    }
    let backend = open_backend(&config, cli.db_url.clone(), client.clone()).await?;

    let catalog_fetcher = Arc::new(ReqwestFetcher::unthrottled(client.clone()));
    let media_fetcher = Arc::new(ReqwestFetcher::new(
        client,
        RequestThrottle::new(&config.media_rate_limit),
    ));
    let populator = Populator::from_config(
        &config,
        backend.store,
        backend.sink,
        catalog_fetcher,
        media_fetcher,
    )
    .context("configuring pipeline")?;

    let params: CatalogParams = cli.params.into_iter().collect();
    info!(params = params.len(), "starting population run");
    let report = populator.populate(&params).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(fatal) = &report.fatal {
        return Err(anyhow!("run aborted: {fatal}"));
    }
    Ok(())
}
