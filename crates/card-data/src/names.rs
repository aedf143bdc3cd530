//! Card name helpers shared by the catalog loader, the index and the matcher.

use regex::Regex;
use std::sync::LazyLock;

static FORM_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^((special delivery|radiant|origin forme|hisuian|galarian|alolan|paldean|teal mask|hearthflame mask|wellspring mask|cornerstone mask|bloodmoon|lance's|dark|single strike|rapid strike|ice rider|shadow rider|flying|surfing|heat|mow|wash|fan|frost) )*",
    )
    .expect("form prefix pattern is valid")
});

static FORM_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i) (ex|v|vstar|vmax|v-union|sunny form|rainy form|snowy form|with grey felt hat)$")
        .expect("form suffix pattern is valid")
});

static PROFESSORS_RESEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^professor's research \(.*\)$").expect("pattern is valid")
});

static BOSS_ORDERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^boss's orders \(.*\)$").expect("pattern is valid"));

static BASIC_ENERGY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^basic (.*energy)$").expect("pattern is valid"));

/// Characters dropped before substring matching. OCR mangles accents and
/// apostrophes far more often than plain letters.
const DROPPED_CHARS: &[char] = &['é', 'É', '\'', '’', '‘', '`'];

/// Collapse per-printing name variants ("Professor's Research (Professor Turo)",
/// "Basic Grass Energy") onto the name printed in the deck list.
pub fn canonical_card_name(name: &str) -> String {
    if PROFESSORS_RESEARCH.is_match(name) {
        return "Professor's Research".to_string();
    }
    if BOSS_ORDERS.is_match(name) {
        return "Boss's Orders".to_string();
    }
    if let Some(caps) = BASIC_ENERGY.captures(name) {
        return caps[1].to_string();
    }
    name.to_string()
}

/// Strip alternate-form prefixes and the trailing rule-box suffix,
/// e.g. "Radiant Charizard" -> "Charizard", "Pikachu V" -> "Pikachu".
pub fn strip_form_affixes(name: &str) -> String {
    let canonical = canonical_card_name(name);
    let without_suffix = FORM_SUFFIX.replace(&canonical, "");
    FORM_PREFIX.replace(&without_suffix, "").trim().to_string()
}

/// Lowercase and drop accent/apostrophe variants so recognized text and
/// catalog names compare on the same footing.
pub fn matching_form(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !DROPPED_CHARS.contains(c))
        .collect()
}

/// Parse leading ASCII digits the way collector numbers are compared:
/// "045" -> 45, "12a" -> 12, "TG05" -> None.
pub fn parse_leading_int(value: &str) -> Option<u32> {
    let digits: String = value
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_form_affixes() {
        assert_eq!(strip_form_affixes("Pikachu V"), "Pikachu");
        assert_eq!(strip_form_affixes("Radiant Charizard"), "Charizard");
        assert_eq!(strip_form_affixes("Hisuian Origin Forme Palkia VSTAR"), "Palkia");
        assert_eq!(strip_form_affixes("Teal Mask Ogerpon ex"), "Ogerpon");
        assert_eq!(strip_form_affixes("Nest Ball"), "Nest Ball");
    }

    #[test]
    fn test_canonical_card_name() {
        assert_eq!(
            canonical_card_name("Professor's Research (Professor Sada)"),
            "Professor's Research"
        );
        assert_eq!(canonical_card_name("Boss's Orders (Ghetsis)"), "Boss's Orders");
        assert_eq!(canonical_card_name("Basic Grass Energy"), "Grass Energy");
        assert_eq!(canonical_card_name("Double Turbo Energy"), "Double Turbo Energy");
    }

    #[test]
    fn test_matching_form() {
        assert_eq!(matching_form("Pokégear 3.0"), "pokgear 3.0");
        assert_eq!(matching_form("Boss’s Orders"), "bosss orders");
        assert_eq!(matching_form("Professor's Research"), "professors research");
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("045"), Some(45));
        assert_eq!(parse_leading_int("12a"), Some(12));
        assert_eq!(parse_leading_int("TG05"), None);
        assert_eq!(parse_leading_int(""), None);
    }
}
