use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ExtractError, PipelineError};
use crate::fingerprint::Fingerprint;
use crate::models::{DeliveryOutcome, ParseSource, ParsedListing, RawPost};
use crate::parser::HybridParser;
use crate::scrapers::PostSource;
use crate::storage::Store;

/// External criteria matcher. Owned by a collaborator; the pipeline only
/// forwards every newly-seen listing, parseable or not, and reads back a
/// boolean.
#[async_trait]
pub trait ListingFilter: Send + Sync {
    async fn matches(&self, listing: &ParsedListing, post: &RawPost) -> bool;
}

/// External delivery channel. The pipeline trusts its outcome report:
/// only a confirmed delivery stamps the ledger.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, listing: &ParsedListing, post: &RawPost) -> DeliveryOutcome;
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub posts_seen: usize,
    pub new_listings: usize,
    pub unparseable: usize,
    pub matched: usize,
    pub notifications_sent: usize,
    pub elapsed_seconds: f64,
}

/// Composes session, extraction, parsing and the dedup ledger per
/// monitored source, and reports delivery outcomes back into the ledger.
pub struct IngestionPipeline {
    config: Config,
    source: Box<dyn PostSource>,
    parser: HybridParser,
    store: Arc<Store>,
    filter: Box<dyn ListingFilter>,
    notifier: Box<dyn Notifier>,
}

impl IngestionPipeline {
    pub fn new(
        config: Config,
        source: Box<dyn PostSource>,
        parser: HybridParser,
        store: Arc<Store>,
        filter: Box<dyn ListingFilter>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            source,
            parser,
            store,
            filter,
            notifier,
        }
    }

    /// One run over all configured sources, sequentially: the sources
    /// share a single authenticated session. Auth and storage failures
    /// abort the run; everything post-scoped is contained.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let started = Utc::now();
        let mut summary = RunSummary::default();

        for feed in &self.config.sources {
            debug!(
                source = self.source.source_name(),
                source_id = %feed.id,
                "collecting feed"
            );
            let posts = match self.source.collect(feed).await {
                Ok(posts) => posts,
                Err(ExtractError::Auth(e)) => return Err(e.into()),
                Err(ExtractError::Collection(msg)) => {
                    // A single feed failing to render is not a run failure.
                    warn!(source_id = %feed.id, error = %msg, "feed pass failed, skipping source");
                    continue;
                }
            };

            summary.posts_seen += posts.len();

            for post in posts {
                self.process_post(&post, &mut summary).await?;
            }
        }

        summary.elapsed_seconds = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;
        info!(
            posts_seen = summary.posts_seen,
            new_listings = summary.new_listings,
            unparseable = summary.unparseable,
            matched = summary.matched,
            notifications_sent = summary.notifications_sent,
            elapsed_seconds = summary.elapsed_seconds,
            "run complete"
        );
        Ok(summary)
    }

    async fn process_post(
        &self,
        post: &RawPost,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let fp = Fingerprint::of(post, self.config.time_rounding_hours);

        // The single gate for "is this listing new". A false here, from
        // this run or any earlier one, means the listing was already
        // handled and must not be emitted again.
        if !self.store.insert_if_new(&fp)? {
            debug!(post_id = %post.post_id, "duplicate fingerprint, skipping");
            return Ok(());
        }
        summary.new_listings += 1;

        let listing = self.parser.parse(post).await;
        if listing.parse_source == ParseSource::Unparseable {
            // Still forwarded: filtering and logging account for these.
            summary.unparseable += 1;
        }

        if !self.filter.matches(&listing, post).await {
            debug!(post_id = %post.post_id, "listing does not match criteria");
            return Ok(());
        }
        summary.matched += 1;

        match self.notifier.notify(&listing, post).await {
            DeliveryOutcome::Delivered => {
                self.store.mark_notified(&fp)?;
                summary.notifications_sent += 1;
                info!(post_id = %post.post_id, "notification delivered");
            }
            DeliveryOutcome::Failed => {
                // The fingerprint stays unstamped; the documented bias is
                // a possible duplicate over a silently lost notification.
                warn!(post_id = %post.post_id, "notification delivery failed");
            }
        }

        Ok(())
    }
}
