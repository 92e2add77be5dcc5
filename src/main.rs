use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rental_scout::config::{Config, Credentials};
use rental_scout::models::{DeliveryOutcome, ParsedListing, RawPost};
use rental_scout::parser::{HybridParser, OpenAiExtractor, RuleParser};
use rental_scout::pipeline::{IngestionPipeline, ListingFilter, Notifier};
use rental_scout::scrapers::GroupFeedExtractor;
use rental_scout::session::{ChromeSurface, SessionManager};
use rental_scout::storage::Store;

const PLATFORM_BASE_URL: &str = "https://www.facebook.com";

/// Stand-in for the external criteria matcher: accept everything.
struct AcceptAllFilter;

#[async_trait]
impl ListingFilter for AcceptAllFilter {
    async fn matches(&self, _listing: &ParsedListing, _post: &RawPost) -> bool {
        true
    }
}

/// Stand-in for the external delivery channel: print the listing.
struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn notify(&self, listing: &ParsedListing, post: &RawPost) -> DeliveryOutcome {
        println!(
            "[{}] price {:?}-{:?}, rooms {:?}, areas {:?} ({:?}, confidence {:.2})",
            post.post_id,
            listing.price_min,
            listing.price_max,
            listing.rooms,
            listing.neighborhoods,
            listing.parse_source,
            listing.confidence,
        );
        println!("    {}", post.url);
        DeliveryOutcome::Delivered
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🏠 Rental Scout - group feed ingestion");
    info!("======================================");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = Config::load(&config_path)?;
    let credentials = Credentials::from_env()?;

    info!("Monitoring {} feed(s)", config.sources.len());
    info!(
        "Dedup window: {}h, confidence threshold: {}",
        config.time_rounding_hours, config.confidence_threshold
    );

    let store = Arc::new(Store::open(&config.database_path)?);

    let ai = match &credentials.ai_api_key {
        Some(key) => Some(Arc::new(OpenAiExtractor::new(
            key,
            &config.ai_model,
            Duration::from_secs(config.ai_timeout_secs),
            config.ai_max_attempts,
        )) as Arc<dyn rental_scout::parser::AiExtractor>),
        None => {
            warn!("no AI API key configured, running rules-only");
            None
        }
    };
    let parser = HybridParser::new(
        RuleParser::new(config.sane_price_min, config.sane_price_max),
        ai,
        config.confidence_threshold,
    );

    let surface = ChromeSurface::new(PLATFORM_BASE_URL)?;
    let session = Arc::new(Mutex::new(SessionManager::new(
        Box::new(surface),
        store.clone(),
        credentials,
    )));
    let extractor = GroupFeedExtractor::new(
        session.clone(),
        config.scroll_budget,
        config.max_posts_per_feed,
        config.min_post_chars,
    );

    let pipeline = IngestionPipeline::new(
        config,
        Box::new(extractor),
        parser,
        store,
        Box::new(AcceptAllFilter),
        Box::new(StdoutNotifier),
    );

    let summary = pipeline.run().await?;

    // Keep the session resumable for the next run.
    session.lock().await.persist().ok();

    info!(
        "✅ Run finished: {} posts, {} new, {} notified ({}s)",
        summary.posts_seen,
        summary.new_listings,
        summary.notifications_sent,
        summary.elapsed_seconds
    );

    Ok(())
}
