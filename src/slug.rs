//! Identifier and display-name normalisation for printed pattern labels.
//!
//! Both functions are pure and total. `slugify` may return an empty string
//! for degenerate labels (`":"`, `"???"`); callers treat that as invalid.
//!
//! ```
//! use drumgrid_extract::slug::{display_name, slugify};
//!
//! assert_eq!(slugify("Rock: 3"), "rock-3");
//! assert_eq!(display_name("new wave: 1"), "New Wave 1");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

static RE_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r":\s*").unwrap());
static RE_NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\-]+").unwrap());
static RE_HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Map a printed label to a catalog id.
///
/// `"Afro-cub: 1"` → `"afro-cub-1"`, `"New Wave: 1"` → `"new-wave-1"`.
pub fn slugify(label: &str) -> String {
    let s = label.to_lowercase();
    let s = RE_COLON.replace_all(&s, "-");
    let s = RE_NON_SLUG.replace_all(&s, "-");
    let s = RE_HYPHENS.replace_all(&s, "-");
    s.trim_matches('-').to_string()
}

/// Map a printed label to its display form.
///
/// Drops the colon, collapses whitespace and capitalises every
/// hyphen-delimited part of every word: `"Afro-cub: 1"` → `"Afro-Cub 1"`.
pub fn display_name(label: &str) -> String {
    let s = RE_COLON.replace_all(label, " ");
    let s = RE_WHITESPACE.replace_all(&s, " ");
    s.trim()
        .split(' ')
        .map(|word| {
            word.split('-')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First character upper-cased, the rest lower-cased.
fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
