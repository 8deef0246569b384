//! dpcmap command-line interface: one subcommand per enrichment pass.
//!
//! Everything before the per-item loop is a fatal setup concern and exits
//! non-zero; once a pass is running, per-item failures are counted and the
//! process still exits zero.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dpcmap_adapters::{
    AllianceDirectory, DuckDuckGoSearch, FrontierSource, HttpPageRenderer, PageRenderer,
    ALLIANCE_SOURCE, FRONTIER_SOURCE,
};
use dpcmap_enrich::{EnrichConfig, Pipeline, RunOptions, SourceRegistry};
use dpcmap_geo::{LocationResolver, NominatimGeocoder, RateLimitedGeocoder};
use dpcmap_storage::{HttpClientConfig, HttpFetcher, PgProviderStore, ProviderStore, SnapshotStore};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "dpcmap")]
#[command(about = "DPC provider enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct PassArgs {
    /// Cap the number of items processed this run.
    #[arg(long)]
    limit: Option<usize>,
    /// Skip the first N worklist items (resume point).
    #[arg(long, default_value_t = 0)]
    start: usize,
    /// Walk the worklist and report without writing to the store.
    #[arg(long)]
    dry_run: bool,
}

impl PassArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            limit: self.limit,
            start: self.start,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import practices from the map application.
    ImportFrontier(PassArgs),
    /// Import profiles from the alliance directory.
    ImportAlliance(PassArgs),
    /// Resolve locations and coordinates for rows missing them.
    Geocode(PassArgs),
    /// Scrape membership pricing off practice websites.
    EnrichPricing(PassArgs),
    /// Find practice websites via web search.
    DiscoverWebsites(PassArgs),
    /// Print store statistics.
    Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout stays line-oriented progress output.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = EnrichConfig::from_env();

    let store = PgProviderStore::connect(&config.database_url)
        .await
        .context("connecting to the provider store")?;
    store.ping().await.context("probing the provider store")?;
    store.migrate().await.context("migrating the provider store")?;
    let store = Arc::new(store);

    let registry = SourceRegistry::load(&config.workspace_root)?;
    let pipeline = Pipeline::new(
        store,
        SnapshotStore::new(&config.snapshots_dir),
        Duration::from_millis(config.fetch_delay_ms),
        config.checkpoint_every,
    );

    match cli.command {
        Commands::ImportFrontier(args) => {
            let source = registry.enabled(FRONTIER_SOURCE)?;
            let renderer: Arc<dyn PageRenderer> = Arc::new(HttpPageRenderer::new(fetcher(&config)?));
            let feed = FrontierSource::new(renderer, fetcher(&config)?, source.base_url.clone());
            pipeline
                .import_frontier(&feed, &source.base_url, args.options())
                .await?;
        }
        Commands::ImportAlliance(args) => {
            let source = registry.enabled(ALLIANCE_SOURCE)?;
            let feed = AllianceDirectory::new(fetcher(&config)?, source.base_url.clone());
            pipeline
                .import_alliance(&feed, &source.base_url, args.options())
                .await?;
        }
        Commands::Geocode(args) => {
            let geocoder = NominatimGeocoder::new(
                &config.geocoder_url,
                &config.user_agent,
                Duration::from_secs(config.http_timeout_secs),
            )?;
            let geocoder = RateLimitedGeocoder::new(
                geocoder,
                Duration::from_millis(config.geocode_interval_ms),
            );
            let resolver = LocationResolver::new(Arc::new(geocoder));
            pipeline.geocode(&resolver, args.options()).await?;
        }
        Commands::EnrichPricing(args) => {
            let renderer = HttpPageRenderer::new(fetcher(&config)?);
            pipeline.enrich_pricing(&renderer, args.options()).await?;
        }
        Commands::DiscoverWebsites(args) => {
            let search = DuckDuckGoSearch::new(fetcher(&config)?, DuckDuckGoSearch::DEFAULT_ENDPOINT);
            pipeline.discover_websites(&search, args.options()).await?;
        }
        Commands::Report => {
            pipeline.report().await?;
        }
    }

    Ok(())
}

fn fetcher(config: &EnrichConfig) -> Result<HttpFetcher> {
    HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        ..Default::default()
    })
}
