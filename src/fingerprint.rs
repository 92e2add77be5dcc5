use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::RawPost;

lazy_static! {
    // Keep letters (Hebrew included) and digits, drop emoji and punctuation.
    static ref NON_TEXT: Regex = Regex::new(r"[^\p{L}\p{N}\s]").unwrap();
}

/// Opaque dedup key for a logical listing.
///
/// A pure function of the post: same normalized text, same author and the
/// same time bucket always produce the same value, across restarts. The
/// same text posted by a different author hashes differently on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a post, bucketing its timestamp to
    /// `rounding_hours` so same-author reposts within the window collapse.
    /// Posts without a visible timestamp fall back to the scrape time.
    pub fn of(post: &RawPost, rounding_hours: i64) -> Self {
        let ts = post.posted_at.unwrap_or(post.scraped_at);
        let bucket = ts.timestamp().div_euclid(rounding_hours.max(1) * 3600);

        let mut hasher = Sha256::new();
        hasher.update(normalize_text(&post.raw_text));
        hasher.update(b"\x1f");
        hasher.update(&post.author_id);
        hasher.update(b"\x1f");
        hasher.update(bucket.to_le_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize free text for hashing: strip emoji and punctuation, collapse
/// whitespace, lowercase. Hebrew characters pass through untouched.
pub fn normalize_text(text: &str) -> String {
    let stripped = NON_TEXT.replace_all(text, " ");
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
