use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::FeedSource;
use crate::error::{AuthError, ExtractError};
use crate::models::RawPost;
use crate::scrapers::traits::PostSource;
use crate::session::{login_wall_present, SessionManager};

lazy_static! {
    static ref POST_ID: Regex = Regex::new(r"/posts/(\d+)|/permalink/(\d+)").unwrap();
}

/// Extracts rental posts from an authenticated group feed.
///
/// One pass navigates to the top of the feed, scrolls under a fixed
/// budget, and parses the captured HTML snapshots offline. The same post
/// element recurs across snapshots as the layout shifts, so the pass
/// dedups by post_id and yields only first occurrences, in feed order.
pub struct GroupFeedExtractor {
    session: Arc<Mutex<SessionManager>>,
    scroll_budget: u32,
    max_posts: usize,
    min_post_chars: usize,
}

impl GroupFeedExtractor {
    pub fn new(
        session: Arc<Mutex<SessionManager>>,
        scroll_budget: u32,
        max_posts: usize,
        min_post_chars: usize,
    ) -> Self {
        Self {
            session,
            scroll_budget,
            max_posts,
            min_post_chars,
        }
    }
}

#[async_trait]
impl PostSource for GroupFeedExtractor {
    async fn collect(&self, feed: &FeedSource) -> Result<Vec<RawPost>, ExtractError> {
        // One session, one lock: concurrent passes would share (and race)
        // the authenticated browser.
        let mut session = self.session.lock().await;
        session.acquire()?;

        info!(source_id = %feed.id, "starting feed pass");
        // A browser hiccup on one feed is a collection failure, scoped to
        // this source; only real auth failures abort the whole run.
        let snapshots = match session.collect_feed_html(&feed.url, self.scroll_budget) {
            Ok(snapshots) => snapshots,
            Err(AuthError::Browser(e)) => return Err(ExtractError::Collection(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        // A login wall in any snapshot means the session died mid-pass.
        // The pass must fail loudly; partial output would read as "feed
        // exhausted" downstream.
        if snapshots.iter().any(|html| login_wall_present(html)) {
            warn!(source_id = %feed.id, "login wall detected mid-pass");
            session.mark_expired();
            return Err(AuthError::Expired.into());
        }

        let posts = posts_from_snapshots(&snapshots, feed, self.min_post_chars, self.max_posts);
        info!(source_id = %feed.id, posts = posts.len(), "feed pass complete");
        Ok(posts)
    }

    fn source_name(&self) -> &'static str {
        "group-feed"
    }
}

/// Parse post elements out of the captured snapshots. Pure; the browser
/// never appears here, which is what makes the pass testable offline.
pub fn posts_from_snapshots(
    snapshots: &[String],
    feed: &FeedSource,
    min_post_chars: usize,
    max_posts: usize,
) -> Vec<RawPost> {
    let article_sel = Selector::parse("[role=\"article\"]").unwrap();

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut posts = Vec::new();

    for html in snapshots {
        let document = Html::parse_document(html);
        for element in document.select(&article_sel) {
            if posts.len() >= max_posts {
                return posts;
            }
            match extract_post(&element, feed, min_post_chars) {
                Some(post) => {
                    // Layout shifts re-surface the same element; only the
                    // first occurrence counts.
                    if seen_ids.insert(post.post_id.clone()) {
                        posts.push(post);
                    }
                }
                None => {
                    debug!(source_id = %feed.id, "skipping malformed post element");
                }
            }
        }
    }

    posts
}

/// Extract one post from its article element. Any structural surprise
/// makes this return None; the pass continues without it.
fn extract_post(element: &ElementRef, feed: &FeedSource, min_post_chars: usize) -> Option<RawPost> {
    let text_sel = Selector::parse("div[dir=\"auto\"]").unwrap();
    let link_sel = Selector::parse("a[href*=\"/posts/\"], a[href*=\"/permalink/\"]").unwrap();
    let author_sel = Selector::parse("a[role=\"link\"] strong, h4 a").unwrap();

    // Loading skeletons render as articles too; they carry no usable text.
    if element
        .value()
        .attr("aria-label")
        .is_some_and(|label| label.starts_with("Loading"))
    {
        return None;
    }

    // The post body is the longest text block; shorter div[dir=auto]
    // nodes are reaction counts and metadata.
    let raw_text = element
        .select(&text_sel)
        .map(|div| div.text().collect::<String>().trim().to_string())
        .max_by_key(String::len)
        .unwrap_or_default();

    if raw_text.len() < min_post_chars {
        return None;
    }

    let mut url = String::new();
    let mut post_id = String::new();
    for link in element.select(&link_sel) {
        if let Some(href) = link.value().attr("href") {
            url = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("https://www.facebook.com{href}")
            };
            if let Some(caps) = POST_ID.captures(href) {
                post_id = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
            }
            break;
        }
    }

    // Feeds sometimes hide the permalink; a content hash keeps the post
    // addressable and stable within the pass.
    if post_id.is_empty() {
        let mut hasher = Sha256::new();
        hasher.update(raw_text.as_bytes());
        post_id = hex::encode(hasher.finalize())[..16].to_string();
    }

    let author_id = element
        .select(&author_sel)
        .next()
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    Some(RawPost {
        source_id: feed.id.clone(),
        post_id,
        author_id,
        raw_text,
        // Feed DOMs only expose relative timestamps; fingerprinting falls
        // back to scraped_at.
        posted_at: None,
        url,
        scraped_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::session::{BrowserSurface, LoginOutcome};
    use crate::storage::Store;
    use tempfile::TempDir;

    fn feed() -> FeedSource {
        FeedSource {
            id: "g1".to_string(),
            url: "https://www.facebook.com/groups/1".to_string(),
        }
    }

    fn article(post_id: &str, author: &str, body: &str) -> String {
        format!(
            r#"<div role="article">
                 <h4><a href="/profile/{author}">{author}</a></h4>
                 <div dir="auto">{body}</div>
                 <div dir="auto">12 comments</div>
                 <a href="/groups/1/posts/{post_id}/">2h</a>
               </div>"#
        )
    }

    fn page(articles: &[String]) -> String {
        format!("<html><body>{}</body></html>", articles.join("\n"))
    }

    #[test]
    fn extracts_posts_in_feed_order() {
        let snapshots = vec![page(&[
            article("101", "Alice", "3 rooms in Florentin for 5000 nis, whole apartment"),
            article("102", "Bob", "Room for rent in Basel area, 3500 a month"),
        ])];

        let posts = posts_from_snapshots(&snapshots, &feed(), 20, 20);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].post_id, "101");
        assert_eq!(posts[0].author_id, "Alice");
        assert!(posts[0].raw_text.contains("Florentin"));
        assert_eq!(posts[1].post_id, "102");
        assert_eq!(posts[0].source_id, "g1");
    }

    #[test]
    fn layout_shift_repetition_yields_each_post_once() {
        let a = article("101", "Alice", "3 rooms in Florentin for 5000 nis, whole apartment");
        let b = article("102", "Bob", "Room for rent in Basel area, 3500 a month");
        // The same posts recur across scroll snapshots, shuffled.
        let snapshots = vec![
            page(&[a.clone()]),
            page(&[a.clone(), b.clone()]),
            page(&[b.clone(), a.clone()]),
        ];

        let posts = posts_from_snapshots(&snapshots, &feed(), 20, 20);
        let ids: Vec<_> = posts.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102"]);
    }

    #[test]
    fn malformed_post_is_skipped_without_aborting_the_pass() {
        let broken = r#"<div role="article"><div dir="auto">hi</div></div>"#.to_string();
        let snapshots = vec![page(&[
            article("101", "Alice", "3 rooms in Florentin for 5000 nis, whole apartment"),
            broken,
            article("103", "Carol", "2.5 rooms near Dizengoff, 6200 shekels monthly"),
        ])];

        let posts = posts_from_snapshots(&snapshots, &feed(), 20, 20);
        let ids: Vec<_> = posts.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["101", "103"]);
    }

    #[test]
    fn missing_permalink_falls_back_to_content_hash_id() {
        let no_link = r#"<div role="article">
            <div dir="auto">Lovely 2 room apartment in Shapira, 4000 nis including bills</div>
        </div>"#
            .to_string();
        let snapshots = vec![page(&[no_link])];

        let posts = posts_from_snapshots(&snapshots, &feed(), 20, 20);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post_id.len(), 16);
        assert_eq!(posts[0].author_id, "unknown");
    }

    #[test]
    fn post_cap_bounds_the_pass() {
        let articles: Vec<String> = (0..10)
            .map(|i| article(&format!("{i}"), "A", "Room for rent in Basel area, 3500 a month"))
            .collect();
        let snapshots = vec![page(&articles)];

        let posts = posts_from_snapshots(&snapshots, &feed(), 20, 4);
        assert_eq!(posts.len(), 4);
    }

    #[test]
    fn loading_placeholders_are_ignored() {
        let skeleton = r#"<div role="article" aria-label="Loading...">
            <div dir="auto">placeholder placeholder placeholder</div>
        </div>"#
            .to_string();
        let snapshots = vec![page(&[skeleton])];
        assert!(posts_from_snapshots(&snapshots, &feed(), 20, 20).is_empty());
    }

    #[test]
    fn login_wall_is_detected() {
        assert!(login_wall_present(
            r#"<form><input name="email" type="text"></form>"#
        ));
        assert!(!login_wall_present("<div role=\"article\"></div>"));
    }

    struct CrashingSurface;

    impl BrowserSurface for CrashingSurface {
        fn restore(&mut self, _blob: &str) -> anyhow::Result<bool> {
            Ok(false)
        }

        fn login(&mut self, _email: &str, _password: &str) -> anyhow::Result<LoginOutcome> {
            Ok(LoginOutcome::Success)
        }

        fn probe(&mut self) -> anyhow::Result<bool> {
            Ok(true)
        }

        fn export(&mut self) -> anyhow::Result<String> {
            Ok(String::new())
        }

        fn collect_feed_html(&mut self, _url: &str, _budget: u32) -> anyhow::Result<Vec<String>> {
            Err(anyhow::anyhow!("tab crashed while rendering"))
        }
    }

    #[tokio::test]
    async fn render_failure_is_a_collection_error_not_an_auth_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("test.db")).unwrap());
        let creds = Credentials {
            login_email: "scout@example.com".to_string(),
            login_password: "secret".to_string(),
            ai_api_key: None,
        };
        let mgr = SessionManager::new(Box::new(CrashingSurface), store, creds);
        let extractor = GroupFeedExtractor::new(Arc::new(Mutex::new(mgr)), 3, 20, 20);

        let err = extractor.collect(&feed()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Collection(_)));
    }
}
