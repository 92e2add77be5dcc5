use crate::config::FeedSource;
use crate::error::ExtractError;
use crate::models::RawPost;
use async_trait::async_trait;

/// Common trait for feed post sources.
/// The pipeline only sees this seam, so tests can feed it scripted posts.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Run one pass over the feed and yield its posts, deduplicated by
    /// post_id within the pass. A pass is not restartable: it always
    /// begins from the top of the feed.
    async fn collect(&self, feed: &FeedSource) -> Result<Vec<RawPost>, ExtractError>;

    /// Get the name of the extraction backend.
    fn source_name(&self) -> &'static str;
}
