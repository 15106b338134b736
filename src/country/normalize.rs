//! Folding of free-text country names into comparison keys.
//!
//! Two names that differ only by case, diacritics, punctuation, a leading
//! "The" or common abbreviations ("St.", "Rep.", "Dem.") fold to the same key.

use std::borrow::Cow;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Token rewrites applied after punctuation is stripped.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("st", "saint"),
    ("ste", "sainte"),
    ("rep", "republic"),
    ("dem", "democratic"),
    ("fed", "federated"),
    ("sts", "states"),
    ("is", "islands"),
];

const APOSTROPHES: &[char] = &['\'', '\u{2019}', '\u{2018}', '`', '\u{00b4}'];

/// Undo UTF-8 text that was decoded as Latin-1 ("TÃ¼rkiye" -> "Türkiye").
///
/// Only applies when every char fits in a byte, at least one is non-ASCII and
/// the resulting bytes are valid UTF-8; otherwise the input is returned as is.
pub fn repair_mojibake(s: &str) -> Cow<'_, str> {
    if s.is_ascii() || s.chars().any(|c| (c as u32) > 0xFF) {
        return Cow::Borrowed(s);
    }
    let bytes: Vec<u8> = s.chars().map(|c| c as u32 as u8).collect();
    match String::from_utf8(bytes) {
        Ok(fixed) if fixed != s => Cow::Owned(fixed),
        _ => Cow::Borrowed(s),
    }
}

/// Fold a country name into its comparison key.
pub fn fold(name: &str) -> String {
    let repaired = repair_mojibake(name.trim());

    let mut flat = String::with_capacity(repaired.len());
    for c in repaired.nfkd().filter(|c| !is_combining_mark(*c)) {
        if APOSTROPHES.contains(&c) {
            continue;
        }
        if c == '&' {
            flat.push_str(" and ");
        } else if c.is_alphanumeric() {
            flat.extend(c.to_lowercase());
        } else {
            flat.push(' ');
        }
    }

    flat.split_whitespace()
        .filter(|t| *t != "the")
        .map(|t| {
            ABBREVIATIONS
                .iter()
                .find(|(short, _)| *short == t)
                .map(|(_, long)| *long)
                .unwrap_or(t)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// True for a plausible ISO 3166-1 alpha-3 code (three ASCII uppercase letters).
pub fn looks_like_iso3(s: &str) -> bool {
    s.len() == 3 && s.bytes().all(|b| b.is_ascii_uppercase())
}
