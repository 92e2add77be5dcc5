use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

use crate::models::ListingType;
use crate::parser::gazetteer;

lazy_static! {
    // "4,500-5,500" with optional currency around either end.
    static ref PRICE_RANGE: Regex = Regex::new(
        r"(?:₪\s*)?([0-9]{1,2}[,.]?[0-9]{3})\s*[-–]\s*(?:₪\s*)?([0-9]{1,2}[,.]?[0-9]{3})"
    )
    .unwrap();

    // Currency-marked singles, most explicit first.
    static ref PRICE_SINGLE: Vec<Regex> = vec![
        Regex::new(r"₪\s*([0-9]{1,2}[,.]?[0-9]{3})").unwrap(),
        Regex::new(r"([0-9]{1,2}[,.]?[0-9]{3})\s*₪").unwrap(),
        Regex::new(r#"([0-9]{1,2}[,.]?[0-9]{3})\s*(?:ש"ח|ש״ח|שח|שקל|nis)"#).unwrap(),
        Regex::new(r"([0-9]{1,2}[,.]?[0-9]{3})\s*(?:לחודש|/חודש)").unwrap(),
        Regex::new(r"(?:מחיר|שכירות)[:\s]+([0-9]{1,2}[,.]?[0-9]{3})").unwrap(),
    ];

    // Shorthand multipliers: "5.5k", "5 אלף".
    static ref PRICE_K: Regex = Regex::new(r"\b([0-9]{1,2}(?:\.[0-9])?)\s*k\b").unwrap();
    static ref PRICE_ELEF: Regex =
        Regex::new(r"([0-9]{1,2}(?:\.[0-9])?)\s*אלף").unwrap();

    static ref ROOMS: Vec<Regex> = vec![
        Regex::new(r"([0-9]+(?:[.,][0-9])?)\s*חדרים").unwrap(),
        Regex::new(r"([0-9]+(?:[.,][0-9])?)\s*חד['׳]?").unwrap(),
        Regex::new(r"דירת?\s*([0-9]+(?:[.,][0-9])?)\s*חד").unwrap(),
        Regex::new(r"([0-9]+(?:[.,][0-9])?)\s*rooms?\b").unwrap(),
    ];

    static ref ROOM_FOR_RENT: Vec<Regex> = vec![
        Regex::new(r"שותפ").unwrap(),
        Regex::new(r"חדר\s+בדירה").unwrap(),
        Regex::new(r"חדר\s+להשכרה").unwrap(),
        Regex::new(r"roommates?").unwrap(),
        Regex::new(r"room\s+for\s+rent").unwrap(),
        Regex::new(r"looking\s+for\s+(?:a\s+)?room\b").unwrap(),
    ];

    static ref WHOLE_APARTMENT: Vec<Regex> = vec![
        Regex::new(r"דירה\s+(?:שלמה|להשכרה|למסירה)").unwrap(),
        Regex::new(r"דירת\s*[0-9]+(?:[.,][0-9])?\s*חדרים?\s+להשכרה").unwrap(),
        Regex::new(r"whole\s+apartment").unwrap(),
        Regex::new(r"entire\s+(?:apartment|flat)").unwrap(),
        Regex::new(r"למסירה").unwrap(),
    ];
}

/// Fields the rule-based extractors managed to populate.
#[derive(Debug, Clone, Default)]
pub struct RuleFields {
    pub price: Option<(i64, i64)>,
    pub rooms: Option<f32>,
    pub neighborhoods: BTreeSet<String>,
    pub listing_type: Option<ListingType>,
}

/// Ordered rule-based extractors, each attempting one field independently.
#[derive(Debug, Clone)]
pub struct RuleParser {
    sane_price_min: i64,
    sane_price_max: i64,
}

impl RuleParser {
    pub fn new(sane_price_min: i64, sane_price_max: i64) -> Self {
        Self {
            sane_price_min,
            sane_price_max,
        }
    }

    pub fn parse(&self, text: &str) -> RuleFields {
        let lower = text.to_lowercase();
        let fields = RuleFields {
            price: self.extract_price(&lower),
            rooms: extract_rooms(&lower),
            neighborhoods: gazetteer::match_neighborhoods(text),
            listing_type: extract_listing_type(&lower),
        };
        debug!(
            price = ?fields.price,
            rooms = ?fields.rooms,
            neighborhoods = fields.neighborhoods.len(),
            "rule extraction done"
        );
        fields
    }

    /// Price in whole currency units. Ranges collapse to (min, max);
    /// single values set min == max. Matches outside the sanity window
    /// are discarded (phone numbers, deposit sums).
    fn extract_price(&self, lower: &str) -> Option<(i64, i64)> {
        if let Some(caps) = PRICE_RANGE.captures(lower) {
            let a = parse_amount(&caps[1]);
            let b = parse_amount(&caps[2]);
            if let (Some(a), Some(b)) = (a, b) {
                if self.sane(a) && self.sane(b) {
                    return Some((a.min(b), a.max(b)));
                }
            }
        }

        for re in PRICE_SINGLE.iter() {
            if let Some(caps) = re.captures(lower) {
                if let Some(v) = parse_amount(&caps[1]) {
                    if self.sane(v) {
                        return Some((v, v));
                    }
                }
            }
        }

        for re in [&*PRICE_K, &*PRICE_ELEF] {
            if let Some(caps) = re.captures(lower) {
                if let Ok(v) = caps[1].parse::<f64>() {
                    let v = (v * 1000.0).round() as i64;
                    if self.sane(v) {
                        return Some((v, v));
                    }
                }
            }
        }

        None
    }

    fn sane(&self, price: i64) -> bool {
        price >= self.sane_price_min && price <= self.sane_price_max
    }
}

fn parse_amount(s: &str) -> Option<i64> {
    s.replace([',', '.'], "").parse().ok()
}

/// Room count as a rational value; half-room notation ("2.5", "3,5")
/// is preserved, never rounded.
fn extract_rooms(lower: &str) -> Option<f32> {
    for re in ROOMS.iter() {
        if let Some(caps) = re.captures(lower) {
            if let Ok(rooms) = caps[1].replace(',', ".").parse::<f32>() {
                if (1.0..=10.0).contains(&rooms) {
                    return Some(rooms);
                }
            }
        }
    }
    None
}

fn extract_listing_type(lower: &str) -> Option<ListingType> {
    if ROOM_FOR_RENT.iter().any(|re| re.is_match(lower)) {
        return Some(ListingType::Room);
    }
    if WHOLE_APARTMENT.iter().any(|re| re.is_match(lower)) {
        return Some(ListingType::WholeApartment);
    }
    None
}
