//! Text normalization helpers shared by the extractors

use chrono::{DateTime, NaiveDate};
use regex::Regex;

/// Minimum body length for an item to count as usable content
pub const MIN_CONTENT_CHARS: usize = 100;

/// Collapses runs of whitespace to single spaces and trims the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replaces typographic dash, quote and space variants with plain ASCII forms
pub fn normalize_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}'
            | '\u{2212}' => out.push('-'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => out.push('"'),
            '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2009}' | '\u{202F}' => out.push(' '),
            '\u{2026}' => out.push_str("..."),
            '\u{200B}' | '\u{FEFF}' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Full inline normalization: punctuation variants, then whitespace
pub fn normalize_text(text: &str) -> String {
    collapse_whitespace(&normalize_punctuation(text))
}

/// Removes every match of the boilerplate patterns and tidies the result
///
/// Paragraph breaks (blank lines) survive; lines left empty are dropped.
pub fn strip_boilerplate(text: &str, patterns: &[Regex]) -> String {
    if patterns.is_empty() {
        return text.to_string();
    }

    let mut stripped = text.to_string();
    for pattern in patterns {
        stripped = pattern.replace_all(&stripped, "").into_owned();
    }

    stripped
        .split("\n\n")
        .map(|block| {
            block
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parses a date from free text using the given chrono formats
///
/// Tries, in order: RFC 3339 / ISO timestamps, the whole text against each
/// format, and the text after a leading label such as `Published:`.
pub fn parse_date(text: &str, formats: &[String]) -> Option<NaiveDate> {
    let text = normalize_text(text);
    if text.is_empty() {
        return None;
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&text) {
        return Some(timestamp.date_naive());
    }
    if let Some(prefix) = text.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }

    let candidates = std::iter::once(text.as_str())
        .chain(text.split_once(':').map(|(_, rest)| rest.trim()))
        .chain(text.split_once('|').map(|(_, rest)| rest.trim()));

    for candidate in candidates {
        for format in formats {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return Some(date);
            }
        }
    }

    None
}

/// Share of characters that are letters, digits, whitespace or ASCII punctuation
pub fn readable_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut readable = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_alphanumeric() || c.is_whitespace() || c.is_ascii_punctuation() {
            readable += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }
    readable as f64 / total as f64
}

/// Returns true if the text is long enough and mostly made of real words
///
/// More than 30% of the words must be longer than three characters.
pub fn is_llm_ready(text: &str) -> bool {
    if text.chars().count() < MIN_CONTENT_CHARS {
        return false;
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }

    let meaningful = words.iter().filter(|word| word.chars().count() > 3).count();
    meaningful as f64 / words.len() as f64 > 0.3
}
