use anyhow::{Context, Result};
use clap::Parser;
use listing_pipeline::filters::{FileStore, FilterKey, FilterPersistence, FilterState, FilterValue};
use listing_pipeline::map::{LogSurface, MapSyncAdapter};
use listing_pipeline::models::PropertyListing;
use listing_pipeline::search::{HttpSearchClient, MemoryBackend, SearchBackend};
use listing_pipeline::{Config, FetchOutcome, ListingOrchestrator, PaginationController};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Search property listings page by page
#[derive(Parser, Debug)]
#[command(name = "listing-pipeline")]
#[command(version, about, long_about = None)]
struct Cli {
    /// sale, rent, commercial-sale or commercial-rent
    #[arg(long)]
    status: Option<String>,

    /// Minimum price
    #[arg(long)]
    price: Option<String>,

    /// Maximum price
    #[arg(long)]
    down_price: Option<String>,

    /// Area identifier, repeatable
    #[arg(long = "area-id")]
    area_ids: Vec<i64>,

    #[arg(long)]
    type_id: Option<i64>,

    #[arg(long)]
    bedrooms: Option<i64>,

    #[arg(long)]
    bathrooms: Option<i64>,

    /// Forget stored filters before applying the ones given here
    #[arg(long)]
    fresh: bool,

    /// How many pages to load
    #[arg(long, default_value_t = 1)]
    pages: u32,

    /// Overrides LISTING_LOCALE
    #[arg(long)]
    locale: Option<String>,

    /// Serve listings from a JSON file instead of the backend
    #[arg(long)]
    offline: Option<PathBuf>,

    /// Where to write the loaded listings
    #[arg(long, default_value = "listings.json")]
    output: PathBuf,
}

impl Cli {
    fn filter_edits(&self) -> Vec<(FilterKey, FilterValue)> {
        let mut edits = Vec::new();
        if let Some(status) = &self.status {
            edits.push((FilterKey::Status, FilterValue::from(status.as_str())));
        }
        if let Some(price) = &self.price {
            edits.push((FilterKey::Price, FilterValue::from(price.as_str())));
        }
        if let Some(down_price) = &self.down_price {
            edits.push((FilterKey::DownPrice, FilterValue::from(down_price.as_str())));
        }
        if !self.area_ids.is_empty() {
            edits.push((FilterKey::AreaId, FilterValue::from(self.area_ids.clone())));
        }
        for (key, value) in [
            (FilterKey::TypeId, self.type_id),
            (FilterKey::Bedrooms, self.bedrooms),
            (FilterKey::Bathrooms, self.bathrooms),
        ] {
            if let Some(value) = value {
                edits.push((key, FilterValue::from(value)));
            }
        }
        // Status decides which room/space fields survive, so it goes first
        edits.sort_by_key(|(key, _)| *key);
        edits
    }
}

async fn backend_for(cli: &Cli, config: &Config) -> Result<Arc<dyn SearchBackend>> {
    if let Some(path) = &cli.offline {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let listings: Vec<PropertyListing> =
            serde_json::from_str(&raw).context("Offline file is not a listing array")?;
        info!("Serving {} listings from {}", listings.len(), path.display());
        return Ok(Arc::new(MemoryBackend::new(listings)));
    }

    let base_url = config
        .api_base_url
        .clone()
        .context("LISTING_API_BASE_URL is not set (or pass --offline)")?;
    info!("Searching {}", base_url);
    Ok(Arc::new(HttpSearchClient::with_timeout(base_url, config.request_timeout)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("Invalid configuration")?;

    info!("🏠 Listing Pipeline");
    info!("===================");

    let backend = backend_for(&cli, &config).await?;
    let persistence = FilterPersistence::new(FileStore::new(&config.store_dir));
    if cli.fresh {
        persistence.save(&FilterState::defaults()).await;
    }

    let locale = cli.locale.clone().unwrap_or_else(|| config.locale.clone());
    let controller = PaginationController::new(backend, config.page_size, config.request_timeout);
    let map = MapSyncAdapter::with_policy(LogSurface::default(), config.coordinate_policy());

    let mut listing =
        ListingOrchestrator::mount(persistence, controller, map, &locale, config.filter_debounce).await;

    let edits = cli.filter_edits();
    if !edits.is_empty() {
        let next = edits
            .into_iter()
            .fold(listing.filters().clone(), |state, (key, value)| state.with_field(key, value));
        listing.replace_filters(next).await;
    }
    info!("Filters: {}", listing.filters().to_json()?);

    while listing.view().has_more && listing.view().current_page.unwrap_or(0) < cli.pages {
        match listing.load_next().await {
            FetchOutcome::Applied => {}
            FetchOutcome::Failed(err) => {
                warn!("Stopped paging: {}", err);
                break;
            }
            _ => break,
        }
    }

    let view = listing.view();
    if let Some(err) = &view.error {
        anyhow::bail!("Search failed: {}", err);
    }
    if view.is_empty {
        info!("No listings match these filters");
    }

    info!("\n✅ Loaded {} listings\n", view.items.len());

    for (i, property) in view.items.iter().enumerate() {
        println!("{}. {} ({})", i + 1, property.title, property.price);
        if let (Some(bed), Some(bath)) = (property.bedroom, property.bathroom) {
            println!("   {} bed, {} bath", bed, bath);
        }
        if let Some(area) = property.area_name() {
            println!("   Area: {}", area);
        }
        if let Some(sqt) = property.sqt {
            println!("   Size: {} m²", sqt);
        }
        println!("   ID: {} [{}]", property.id, property.status);
        println!();
    }

    if let Some(report) = listing.last_sync() {
        if !report.skipped.is_empty() {
            info!("{} listings have no map location", report.skipped.len());
        }
    }

    let json = serde_json::to_string_pretty(view.items.as_slice())?;
    tokio::fs::write(&cli.output, json)
        .await
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    info!("💾 Saved listings to {}", cli.output.display());

    listing.unmount();
    Ok(())
}
