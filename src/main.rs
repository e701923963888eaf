mod complexes;
mod config;
mod discover;
mod geo;
mod models;
mod scrapers;
mod store;
mod sync;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use discover::ComplexDiscovery;
use geo::commute::enrich_commutes;
use geo::google::{DrivingEnricher, GoogleMaps, WalkingEnricher, SHIBUYA_STATION};
use scrapers::UrBrowser;
use std::time::Duration;
use store::{NotionStore, Schema};
use sync::driver::{RunConfig, RunDriver};
use sync::throttle::Throttle;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DETAIL_INTERVAL: Duration = Duration::from_secs(1);
const WATCH_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "ur-sync", about = "Mirrors UR rental listings into Notion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl every area and converge the rooms database
    Sync,
    /// Add complexes found in the area search results to the complexes database
    Discover,
    /// Refresh rent, layout and floor area ranges of the complexes database
    Complexes,
    /// Fill walking minutes to the nearest station
    Walk,
    /// Fill morning driving minutes
    Drive {
        #[arg(long, default_value = SHIBUYA_STATION)]
        destination: String,
    },
    /// Report room vacancy of complex pages; falls back to WATCH_URLS
    Watch { urls: Vec<String> },
}

fn rooms_store(config: &Config) -> Result<NotionStore> {
    NotionStore::new(
        &config.notion_base_url,
        &config.notion_token()?,
        &config.rooms_database_id()?,
        Schema::rooms(),
    )
}

fn complexes_store(config: &Config) -> Result<NotionStore> {
    NotionStore::new(
        &config.notion_base_url,
        &config.notion_token()?,
        &config.complexes_database_id()?,
        Schema::complexes(),
    )
}

fn browser(config: &Config) -> Result<UrBrowser> {
    UrBrowser::new(config.headless, DETAIL_INTERVAL, config.page_interval)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store_throttle = Throttle::new(config.store_interval);

    match cli.command {
        Command::Sync => {
            info!("🏠 UR sync: {}", config.areas.join(", "));
            let store = rooms_store(&config)?;
            let browser = browser(&config)?;
            let page_throttle = Throttle::new(config.page_interval);
            let run_config = RunConfig {
                areas: config.areas.clone(),
                price_ceiling: config.max_price,
            };
            RunDriver::new(
                &browser,
                &browser,
                &store,
                &store_throttle,
                &page_throttle,
                &run_config,
            )
            .run()
            .await;
        }
        Command::Discover => {
            info!("🏢 UR complex discovery: {}", config.areas.join(", "));
            let store = complexes_store(&config)?;
            let browser = browser(&config)?;
            let page_throttle = Throttle::new(config.page_interval);
            ComplexDiscovery::new(&browser, &browser, &store, &store_throttle, &page_throttle)
                .run(&config.areas)
                .await;
        }
        Command::Complexes => {
            let store = complexes_store(&config)?;
            let browser = browser(&config)?;
            let pace = Throttle::new(DETAIL_INTERVAL);
            complexes::refresh_complexes(&browser, &store, &store_throttle, &pace).await;
        }
        Command::Walk => {
            let store = rooms_store(&config)?;
            let maps = GoogleMaps::new(&config.gmaps_base_url, &config.gmaps_key()?)?;
            enrich_commutes(&store, &WalkingEnricher::new(maps), &store_throttle).await;
        }
        Command::Drive { destination } => {
            let store = rooms_store(&config)?;
            let maps = GoogleMaps::new(&config.gmaps_base_url, &config.gmaps_key()?)?;
            let enricher = DrivingEnricher::new(maps, &destination)?;
            enrich_commutes(&store, &enricher, &store_throttle).await;
        }
        Command::Watch { urls } => {
            let urls = if urls.is_empty() {
                config.watch_urls.clone()
            } else {
                urls
            };
            if urls.is_empty() {
                anyhow::bail!("No watch targets: pass URLs or set WATCH_URLS");
            }
            let browser = browser(&config)?;
            let pace = Throttle::new(WATCH_INTERVAL);
            watch::watch_vacancies(&browser, &urls, &pace).await;
        }
    }

    Ok(())
}
