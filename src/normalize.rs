//! Text normalization for titles, author names, languages and descriptions.
//!
//! All functions here are pure. They run on every candidate before the
//! fingerprint is computed, so two files whose metadata differs only in
//! casing, name order, quote style or edition noise end up with the same
//! normalized strings.

use regex::Regex;
use std::sync::LazyLock;

/// Returned for empty names.
pub const UNKNOWN: &str = "Unknown";

static YEAR_ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((1|2)[0-9]{3}\)").unwrap());
static EDITION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/ druk [0-9]+").unwrap());
static POSSESSIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'S\b").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Normalize an author name or title.
///
/// - empty input becomes [`UNKNOWN`]
/// - `capitalize` title-cases every word and repairs `'S` to `'s`
/// - `swap_order` turns `"Last, First"` into `"First Last"` when there is
///   exactly one comma
/// - year annotations like `(1999)` and `/ druk N` markers are removed
/// - periods become spaces, whitespace runs collapse, the result is trimmed
/// - typographic quotes map to ASCII, underscores to spaces
pub fn normalize_name(raw: &str, capitalize: bool, swap_order: bool) -> String {
    if raw.trim().is_empty() {
        return UNKNOWN.to_string();
    }

    let mut s = unify_punctuation(raw);

    if capitalize {
        s = title_case(&s);
        s = POSSESSIVE.replace_all(&s, "'s").into_owned();
    }

    if swap_order {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() == 2 {
            s = format!("{} {}", parts[1].trim(), parts[0].trim());
        }
    }

    s = YEAR_ANNOTATION.replace_all(&s, "").into_owned();
    s = EDITION_MARKER.replace_all(&s, "").into_owned();
    s = s.replace('.', " ");
    let s = collapse_whitespace(&s);

    if s.is_empty() {
        UNKNOWN.to_string()
    } else {
        s
    }
}

/// Map a language tag or name to a two-letter code.
///
/// Unknown values pass through lower-cased.
pub fn normalize_language(raw: &str) -> String {
    let s = raw.trim().to_lowercase();
    let code = match s.as_str() {
        "nld" | "dut" | "dutch" | "nederlands" | "nederland" | "nl-nl" | "nl_nl" | "nl-be" => "nl",
        "deu" | "ger" | "german" | "deutsch" | "deutsche" | "duits" | "de-de" | "de_de" => "de",
        "eng" | "english" | "engels" | "uk" | "us" | "en-us" | "en-gb" | "en-en" | "en_us"
        | "en_gb" | "en_en" => "en",
        "fra" | "fre" | "french" | "francais" | "français" | "frans" | "fr-fr" | "fr_fr" => "fr",
        "spa" | "spanish" | "espanol" | "español" | "spaans" | "es-es" | "es_es" => "es",
        _ => return s,
    };
    code.to_string()
}

/// Strip markup from a description and collapse its whitespace.
pub fn sanitize_description(raw: &str) -> String {
    let without_tags = HTML_TAG.replace_all(raw, " ");
    let unescaped = without_tags
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    collapse_whitespace(&unescaped)
}

fn unify_punctuation(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{2039}' | '\u{203A}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201B}' => '\'',
            '_' => ' ',
            other => other,
        })
        .collect()
}

/// Lower-case everything, then upper-case each letter that starts a word.
/// A word starts after any character that is neither alphanumeric nor `_`.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
