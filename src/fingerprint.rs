//! Identity hashes and fuzzy search keys.
//!
//! The identity hash is a heuristic dedup key, not a cryptographic digest:
//! it folds the author's last name and the title into a lower-case
//! alphanumeric string, dropping edition noise along the way. Different
//! works with near-identical normalized titles can collide.
//!
//! Phonetic keys (double metaphone) and search tokens are both built from the
//! same `"title author"` string. A query matches a record when every query
//! term is present in the record's corresponding key set.

use regex::Regex;
use rphonetic::{DoubleMetaphone, Encoder};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::models::BookRecord;

static LEADING_NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[0-9]+").unwrap());
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]|\{[^}]*\}").unwrap());
static EDITION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\s*druk\s*[0-9]+").unwrap());
static ZERO_PADDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b0+([0-9])").unwrap());
static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Compute the identity key for an (author, title) pair.
pub fn compute_identity_hash(author: &str, title: &str) -> String {
    let author = author.to_lowercase();
    let mut title = title.to_lowercase();

    let last_name = author.split_whitespace().last().unwrap_or("");

    let author_trimmed = author.trim();
    if !author_trimmed.is_empty() {
        title = title.replacen(author_trimmed, "", 1);
    }
    if !last_name.is_empty() {
        title = title.replacen(last_name, "", 1);
    }

    let title = LEADING_NUMBERS.replace(&title, "");
    let joined = format!("{} {}", last_name, title);
    let joined = joined.trim();

    let s = BRACKETED.replace_all(joined, " ");
    let s = EDITION_MARKER.replace_all(&s, " ");
    let s = s.replace(": a novel", " ");
    let s = ZERO_PADDING.replace_all(&s, "$1");
    NON_ALPHANUMERIC.replace_all(&s, "").into_owned()
}

/// Double-metaphone codes of every word in `text`.
pub fn compute_phonetic_keys(text: &str) -> BTreeSet<String> {
    let encoder = DoubleMetaphone::default();
    words(text)
        .map(|word| encoder.encode(&word))
        .filter(|code| !code.is_empty())
        .collect()
}

/// Lower-cased, letters-only words of `text`.
pub fn compute_search_tokens(text: &str) -> BTreeSet<String> {
    words(text).collect()
}

/// Split a user query into (search tokens, phonetic codes), both sorted.
pub fn query_terms(query: &str) -> (Vec<String>, Vec<String>) {
    (
        compute_search_tokens(query).into_iter().collect(),
        compute_phonetic_keys(query).into_iter().collect(),
    )
}

/// Lexical or phonetic conjunctive match of a query against a record.
///
/// An empty query matches everything.
pub fn matches(record: &BookRecord, query: &str) -> bool {
    let (tokens, codes) = query_terms(query);
    if tokens.is_empty() && codes.is_empty() {
        return true;
    }
    (!tokens.is_empty() && record.has_search_tokens(&tokens))
        || (!codes.is_empty() && record.has_phonetic_keys(&codes))
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| {
            w.to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_lowercase())
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
}
