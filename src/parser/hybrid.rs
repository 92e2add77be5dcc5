use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{ListingType, ParseSource, ParsedListing, RawPost};
use crate::parser::ai::AiExtractor;
use crate::parser::rules::{RuleFields, RuleParser};

/// Rule-based extraction with an AI fallback for low-confidence posts.
///
/// Rules run first and their matches always win; the AI fills only the
/// gaps. A failed or malformed AI response degrades the listing to
/// `Unparseable` but never drops it: downstream filtering and logging
/// account for unparseable listings explicitly.
pub struct HybridParser {
    rules: RuleParser,
    ai: Option<Arc<dyn AiExtractor>>,
    confidence_threshold: f32,
}

impl HybridParser {
    pub fn new(
        rules: RuleParser,
        ai: Option<Arc<dyn AiExtractor>>,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            rules,
            ai,
            confidence_threshold,
        }
    }

    pub async fn parse(&self, post: &RawPost) -> ParsedListing {
        let rule_fields = self.rules.parse(&post.raw_text);
        let rules_contributed = contributed(&rule_fields);

        let mut listing = apply_rules(post, &rule_fields);
        listing.confidence = listing.field_coverage();
        listing.parse_source = if rules_contributed {
            ParseSource::Regex
        } else {
            ParseSource::Unparseable
        };

        if listing.confidence >= self.confidence_threshold {
            return listing;
        }

        let Some(ai) = &self.ai else {
            debug!(post_id = %post.post_id, "confidence low but no AI extractor configured");
            return listing;
        };

        info!(
            post_id = %post.post_id,
            confidence = listing.confidence,
            "rule confidence low, invoking AI fallback"
        );

        match ai.extract(&post.raw_text).await {
            Ok(fields) => {
                let mut ai_contributed = false;

                if listing.price_min.is_none() {
                    if let (Some(min), Some(max)) = (fields.price_min, fields.price_max) {
                        listing.price_min = Some(min.min(max));
                        listing.price_max = Some(min.max(max));
                        ai_contributed = true;
                    } else if let Some(v) = fields.price_min.or(fields.price_max) {
                        listing.price_min = Some(v);
                        listing.price_max = Some(v);
                        ai_contributed = true;
                    }
                }
                if listing.rooms.is_none() {
                    if let Some(rooms) = fields.rooms {
                        listing.rooms = Some(rooms);
                        ai_contributed = true;
                    }
                }
                if listing.neighborhoods.is_empty() {
                    for n in fields.known_neighborhoods() {
                        listing.neighborhoods.insert(n);
                        ai_contributed = true;
                    }
                }
                if listing.listing_type == ListingType::Unclear {
                    if let Some(t) = fields.typed_listing() {
                        listing.listing_type = t;
                        ai_contributed = true;
                    }
                }

                listing.confidence = listing.field_coverage();
                listing.parse_source = match (rules_contributed, ai_contributed) {
                    (true, true) => ParseSource::Hybrid,
                    (true, false) => ParseSource::Regex,
                    (false, true) => ParseSource::Ai,
                    (false, false) => ParseSource::Unparseable,
                };
                listing
            }
            Err(e) => {
                warn!(post_id = %post.post_id, error = %e, "AI fallback failed, degrading to unparseable");
                listing.parse_source = ParseSource::Unparseable;
                listing
            }
        }
    }
}

fn contributed(fields: &RuleFields) -> bool {
    fields.price.is_some()
        || fields.rooms.is_some()
        || !fields.neighborhoods.is_empty()
        || fields.listing_type.is_some()
}

fn apply_rules(post: &RawPost, fields: &RuleFields) -> ParsedListing {
    let mut listing = ParsedListing::empty(&post.post_id);
    if let Some((min, max)) = fields.price {
        listing.price_min = Some(min);
        listing.price_max = Some(max);
    }
    listing.rooms = fields.rooms;
    listing.neighborhoods = fields.neighborhoods.clone();
    if let Some(t) = fields.listing_type {
        listing.listing_type = t;
    }
    listing
}
