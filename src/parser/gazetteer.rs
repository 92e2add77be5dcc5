use std::collections::BTreeSet;

/// Bilingual gazetteer of known area names.
///
/// Keys are normalized neighborhood names; aliases cover the Hebrew and
/// English spellings seen in group posts. Matching is plain substring over
/// lowercased text, so aliases are stored lowercase.
const NEIGHBORHOODS: &[(&str, &[&str])] = &[
    // Central
    ("florentin", &["florentin", "פלורנטין"]),
    ("neve_tzedek", &["neve tzedek", "נווה צדק", "נוה צדק"]),
    ("kerem_hatemanim", &["kerem hatemanim", "כרם התימנים", "כרם תימנים"]),
    ("lev_hair", &["lev hair", "לב העיר", "לב תל אביב", "מרכז העיר"]),
    ("rothschild", &["rothschild", "רוטשילד", "שדרות רוטשילד"]),
    ("dizengoff", &["dizengoff", "דיזנגוף"]),
    ("basel", &["basel", "בזל", "כיכר בזל"]),
    ("habima", &["habima", "הבימה"]),
    ("allenby", &["allenby", "אלנבי"]),
    // North
    ("old_north", &["old north", "צפון הישן", "הצפון הישן"]),
    ("new_north", &["new north", "צפון חדש", "הצפון החדש"]),
    ("ramat_aviv", &["ramat aviv", "רמת אביב"]),
    ("bavli", &["bavli", "בבלי"]),
    // South
    ("shapira", &["shapira", "שפירא"]),
    ("neve_shaanan", &["neve shaanan", "נווה שאנן"]),
    ("hatikva", &["hatikva", "התקווה", "שכונת התקווה"]),
    // Beach
    ("tel_aviv_port", &["namal", "נמל", "נמל תל אביב"]),
    ("gordon_beach", &["gordon", "גורדון"]),
    ("frishman", &["frishman", "פרישמן"]),
    // Surroundings
    ("yaffo", &["jaffa", "yafo", "יפו"]),
    ("givatayim", &["givatayim", "גבעתיים"]),
    ("ramat_gan", &["ramat gan", "רמת גן"]),
];

/// All neighborhoods whose aliases occur in `text`. May be empty or hold
/// several matches; the caller decides what multiple matches mean.
pub fn match_neighborhoods(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut found = BTreeSet::new();
    for (name, aliases) in NEIGHBORHOODS {
        if aliases.iter().any(|alias| lower.contains(alias)) {
            found.insert((*name).to_string());
        }
    }
    found
}

/// Whether `name` is a normalized neighborhood this gazetteer knows.
pub fn is_known(name: &str) -> bool {
    NEIGHBORHOODS.iter().any(|(n, _)| *n == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_english_alias() {
        let found = match_neighborhoods("Cozy 2 room flat near Rothschild blvd");
        assert!(found.contains("rothschild"));
    }

    #[test]
    fn matches_hebrew_alias() {
        let found = match_neighborhoods("דירה מהממת בפלורנטין");
        assert!(found.contains("florentin"));
    }

    #[test]
    fn multiple_areas_all_reported() {
        let found = match_neighborhoods("בין דיזנגוף לבזל, close to the old north");
        assert!(found.contains("dizengoff"));
        assert!(found.contains("basel"));
        assert!(found.contains("old_north"));
    }

    #[test]
    fn no_match_yields_empty_set() {
        assert!(match_neighborhoods("apartment somewhere nice").is_empty());
    }
}
