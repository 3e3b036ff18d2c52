//! Title canonicalization. Feed titles and catalog names disagree on case,
//! punctuation, trademark glyphs, diacritics, and roman numerals; both sides
//! are folded onto one comparable key before any matching decision.

use deunicode::deunicode;

const TRADEMARK_GLYPHS: &[char] = &['\u{2122}', '\u{00AE}', '\u{00A9}'];

const ROMAN_NUMERALS: &[(&str, &str)] = &[
    ("i", "1"),
    ("ii", "2"),
    ("iii", "3"),
    ("iv", "4"),
    ("v", "5"),
    ("vi", "6"),
    ("vii", "7"),
    ("viii", "8"),
    ("ix", "9"),
    ("x", "10"),
    ("xi", "11"),
    ("xii", "12"),
    ("xiii", "13"),
    ("xiv", "14"),
    ("xv", "15"),
    ("xvi", "16"),
    ("xvii", "17"),
    ("xviii", "18"),
    ("xix", "19"),
    ("xx", "20"),
];

/// Fold a free-text title into its comparable key: trademark glyphs
/// dropped, diacritics transliterated, lowercased, `&` spelled out,
/// punctuation collapsed to spaces, and roman-numeral tokens I..XX mapped
/// to digits. Total and idempotent; empty input yields an empty key.
pub fn normalize(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| !TRADEMARK_GLYPHS.contains(c))
        .collect();
    let folded = deunicode(&stripped).to_lowercase().replace('&', " and ");
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    spaced
        .split_whitespace()
        .map(roman_token_to_digits)
        .collect::<Vec<_>>()
        .join(" ")
}

fn roman_token_to_digits(token: &str) -> &str {
    ROMAN_NUMERALS
        .iter()
        .find(|(roman, _)| *roman == token)
        .map(|(_, digits)| *digits)
        .unwrap_or(token)
}
