//! Best-effort season number inference from a season title.
//!
//! `None` means no number could be inferred. Callers only use the result to
//! pick an insertion position; it never overrides positional numbering.

const ROMAN: &[(&str, u32)] = &[
    ("ii", 2),
    ("iii", 3),
    ("iv", 4),
    ("v", 5),
    ("vi", 6),
    ("vii", 7),
    ("viii", 8),
    ("ix", 9),
    ("x", 10),
];

/// Infer a 1-based season number from text like "Season 2", "3rd Season",
/// "S4" or a trailing roman numeral ("Overlord III").
pub fn infer_season_number(title: &str) -> Option<u32> {
    let lower = title.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let inferred = tokens
        .windows(2)
        .find_map(|pair| match pair {
            ["season", n] => n.parse::<u32>().ok(),
            [ordinal, "season"] => parse_ordinal(ordinal),
            _ => None,
        })
        .or_else(|| tokens.iter().find_map(|t| parse_short_form(t)))
        .or_else(|| {
            // A lone roman numeral is a title, not a season marker.
            if tokens.len() < 2 {
                return None;
            }
            tokens.last().and_then(|t| parse_roman(t))
        });

    inferred.filter(|&n| n > 0)
}

/// "2nd", "3rd", "4th", "21st".
fn parse_ordinal(token: &str) -> Option<u32> {
    let digits = token
        .strip_suffix("st")
        .or_else(|| token.strip_suffix("nd"))
        .or_else(|| token.strip_suffix("rd"))
        .or_else(|| token.strip_suffix("th"))?;
    digits.parse().ok()
}

/// "s2", "s02".
fn parse_short_form(token: &str) -> Option<u32> {
    let digits = token.strip_prefix('s')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_roman(token: &str) -> Option<u32> {
    ROMAN
        .iter()
        .find(|(numeral, _)| *numeral == token)
        .map(|&(_, n)| n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_season_words() {
        assert_eq!(infer_season_number("Attack on Titan Season 3"), Some(3));
        assert_eq!(infer_season_number("season 12: finale"), Some(12));
        assert_eq!(infer_season_number("Kaguya-sama 2nd Season"), Some(2));
        assert_eq!(infer_season_number("The 21st Season"), Some(21));
    }

    #[test]
    fn test_short_form_and_roman() {
        assert_eq!(infer_season_number("Dr. Stone S2"), Some(2));
        assert_eq!(infer_season_number("Overlord III"), Some(3));
        assert_eq!(infer_season_number("Overlord IV"), Some(4));
    }

    #[test]
    fn test_no_inference() {
        assert_eq!(infer_season_number("Mob Psycho 100"), None);
        assert_eq!(infer_season_number("Second"), None);
        assert_eq!(infer_season_number("X"), None);
        assert_eq!(infer_season_number("Season 0"), None);
        assert_eq!(infer_season_number("Steins;Gate"), None);
        assert_eq!(infer_season_number(""), None);
    }
}
