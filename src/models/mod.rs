use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A post captured from a monitored feed, before any parsing.
///
/// Immutable once created. `post_id` is the platform's stable per-feed id
/// (or a content-hash pseudo id when the DOM hides the permalink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    pub source_id: String,
    pub post_id: String,
    pub author_id: String,
    pub raw_text: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub url: String,
    pub scraped_at: DateTime<Utc>,
}

/// Whether a listing offers a single room or the whole apartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingType {
    Room,
    WholeApartment,
    Unclear,
}

/// Which extraction path produced the structured fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseSource {
    Regex,
    Ai,
    Hybrid,
    Unparseable,
}

/// Structured attributes extracted from a RawPost.
///
/// Derived and recomputable; never persisted as authoritative. Ranges
/// collapse to (min, max), single prices set min == max, fractional room
/// counts are preserved as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedListing {
    pub post_id: String,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub rooms: Option<f32>,
    pub neighborhoods: BTreeSet<String>,
    pub listing_type: ListingType,
    pub confidence: f32,
    pub parse_source: ParseSource,
}

impl ParsedListing {
    pub fn empty(post_id: &str) -> Self {
        Self {
            post_id: post_id.to_string(),
            price_min: None,
            price_max: None,
            rooms: None,
            neighborhoods: BTreeSet::new(),
            listing_type: ListingType::Unclear,
            confidence: 0.0,
            parse_source: ParseSource::Unparseable,
        }
    }

    /// Fraction of the three required fields (price, rooms, neighborhood)
    /// currently populated.
    pub fn field_coverage(&self) -> f32 {
        let mut populated = 0;
        if self.price_min.is_some() {
            populated += 1;
        }
        if self.rooms.is_some() {
            populated += 1;
        }
        if !self.neighborhoods.is_empty() {
            populated += 1;
        }
        populated as f32 / 3.0
    }
}

/// Ledger entry for a fingerprint that has been seen at least once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenRecord {
    pub fingerprint: String,
    pub first_seen_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

/// Authentication state of the browsing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticating,
    Valid,
    Expired,
    Challenged,
    CredentialsInvalid,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Unauthenticated => "unauthenticated",
            SessionStatus::Authenticating => "authenticating",
            SessionStatus::Valid => "valid",
            SessionStatus::Expired => "expired",
            SessionStatus::Challenged => "challenged",
            SessionStatus::CredentialsInvalid => "credentials_invalid",
        }
    }
}

/// Outcome reported by the external notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}
