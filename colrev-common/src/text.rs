//! Text normalization helpers
//!
//! String utilities shared by identifier construction, similarity scoring
//! and record preparation:
//! - Diacritic folding and robust identifier tokens
//! - Upper-case density checks and case repair
//! - Author name parsing and formatting
//! - Page range normalization
//! - Fuzzy string ratios (plain, partial, token-set)

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static NON_IDENTIFIER_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9a-zA-Z -]+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());
static FOUR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{4}").unwrap());

/// Fold diacritics (é → e, ü → u)
pub fn remove_accents(input: &str) -> String {
    input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'ø' => 'o',
            'Ø' => 'O',
            'ł' => 'l',
            'Ł' => 'L',
            'đ' => 'd',
            'Đ' => 'D',
            'ß' => 's',
            other => other,
        })
        .collect()
}

/// Collapse runs of whitespace (including newlines) into single spaces
pub fn collapse_whitespace(input: &str) -> String {
    WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

/// Normalize a value into a colrev_id token
///
/// Lowercase, ASCII alphanumerics only, words joined by `-`.
pub fn robust_token(value: &str) -> String {
    let value = value.replace(['\n', '/'], " ");
    let value = value
        .trim()
        .replace("emph{", "")
        .replace("&amp;", "and")
        .replace(" & ", " and ");
    let value = remove_accents(&value);
    let value = NON_IDENTIFIER_CHARS.replace_all(&value, "");
    let value = WHITESPACE.replace_all(&value, "-");
    let value = DASHES.replace_all(&value, "-").to_lowercase();
    if value.len() > 1 {
        value.trim_end_matches('-').to_string()
    } else {
        value
    }
}

// ============================================================================
// Case handling
// ============================================================================

/// Share of upper-case characters among all characters
pub fn percent_upper(input: &str) -> f64 {
    let total = input.chars().count();
    if total == 0 {
        return 0.0;
    }
    input.chars().filter(|c| c.is_uppercase()).count() as f64 / total as f64
}

/// Share of upper-case characters among alphabetic characters
pub fn upper_density(input: &str) -> f64 {
    let letters: Vec<char> = input.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    letters.iter().filter(|c| c.is_uppercase()).count() as f64 / letters.len() as f64
}

/// Whether most words are written in capitals
pub fn mostly_upper_words(input: &str) -> bool {
    if !input.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    let cleaned = input.replace(['.', ','], "");
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    let upper = words.iter().filter(|w| is_upper_word(w)).count();
    upper as f64 / words.len() as f64 > 0.8
}

fn is_upper_word(word: &str) -> bool {
    word.chars().any(|c| c.is_alphabetic())
        && word.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase())
}

/// First character upper case, the rest lower case
pub fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Title case with lower-case connectives
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for c in input.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = c != '\'';
        }
    }
    out.replace(" Of ", " of ")
        .replace(" For ", " for ")
        .replace(" The ", " the ")
        .replace(" And ", " and ")
        .replace(" In ", " in ")
        .replace(" On ", " on ")
        .replace("Ieee", "IEEE")
        .replace("Acm", "ACM")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Capitalize,
    Title,
}

/// Repair a string whose upper-case density exceeds 0.8
pub fn format_if_mostly_upper(input: &str, case: Case) -> String {
    if !input.chars().any(|c| c.is_ascii_alphabetic()) {
        return input.to_string();
    }
    if percent_upper(input) <= 0.8 {
        return input.to_string();
    }
    match case {
        Case::Capitalize => capitalize(input),
        Case::Title => title_case(input),
    }
}

// ============================================================================
// Author names
// ============================================================================

/// One parsed author name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    pub last: String,
    /// Given names as written (may be initials)
    pub given: Vec<String>,
}

impl PersonName {
    /// Initials of the given names
    pub fn initials(&self) -> Vec<char> {
        self.given
            .iter()
            .flat_map(|g| g.split('-'))
            .filter_map(|g| g.chars().find(|c| c.is_alphabetic()))
            .flat_map(|c| c.to_uppercase())
            .collect()
    }

    /// "Last, Given Middle"
    pub fn formatted(&self) -> String {
        if self.given.is_empty() {
            self.last.clone()
        } else {
            format!("{}, {}", self.last, self.given.join(" "))
        }
    }
}

/// Split an author field into individual names
///
/// Accepts `A and B` lists, `;`-separated lists and comma lists of
/// `First Last` names.
pub fn split_authors(author: &str) -> Vec<String> {
    let author = author.replace('\n', " ").replace("; ", " and ");
    let names: Vec<String> = if author.contains(" and ") {
        author.split(" and ").map(str::to_string).collect()
    } else if author.matches(',').count() > 1 && looks_like_last_first_list(&author) {
        let parts: Vec<&str> = author.split(',').map(str::trim).collect();
        parts
            .chunks(2)
            .map(|pair| pair.join(", "))
            .collect()
    } else if author.matches(',').count() > 1 {
        author.split(", ").map(str::to_string).collect()
    } else {
        vec![author]
    };
    names
        .into_iter()
        .map(|n| collapse_whitespace(&n))
        .filter(|n| !n.is_empty())
        .collect()
}

fn looks_like_last_first_list(author: &str) -> bool {
    // "Smith, J., Jones, K." style: every second part is initials only
    let parts: Vec<&str> = author.split(',').map(str::trim).collect();
    parts.len() % 2 == 0
        && parts
            .iter()
            .skip(1)
            .step_by(2)
            .all(|p| p.split_whitespace().all(|w| w.trim_end_matches('.').chars().count() <= 2))
}

/// Parse a single name in either `Last, First` or `First Last` order
pub fn parse_name(name: &str) -> PersonName {
    let name = collapse_whitespace(name);
    if let Some((last, given)) = name.split_once(',') {
        return PersonName {
            last: last.trim().to_string(),
            given: split_given(given),
        };
    }
    let mut tokens: Vec<&str> = name.split_whitespace().collect();
    let Some(last) = tokens.pop() else {
        return PersonName {
            last: String::new(),
            given: Vec::new(),
        };
    };
    // Particles belong to the family name ("van der Aalst")
    let mut last_parts = vec![last.to_string()];
    while let Some(prev) = tokens.last() {
        if ["van", "von", "der", "de", "den", "da", "del", "di", "la", "le"].contains(prev) {
            last_parts.insert(0, prev.to_string());
            tokens.pop();
        } else {
            break;
        }
    }
    PersonName {
        last: last_parts.join(" "),
        given: tokens.into_iter().map(str::to_string).collect(),
    }
}

fn split_given(given: &str) -> Vec<String> {
    given
        .replace('.', ". ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Parse an author field into names
pub fn parse_authors(author: &str) -> Vec<PersonName> {
    split_authors(author)
        .iter()
        .map(|n| parse_name(n))
        .filter(|n| !n.last.is_empty())
        .collect()
}

/// Format an author field as `Last, First and Last, First`
///
/// Drops the four-digit disambiguation suffixes some providers append and
/// capitalizes names when the field is written in capitals.
pub fn format_author_field(input: &str) -> String {
    let input = input.replace('\n', " ");
    let input = FOUR_DIGITS.replace_all(&input, "");
    let shouting = mostly_upper_words(&input.replace(" and ", " ").replace("Jr", ""));
    parse_authors(&input)
        .into_iter()
        .map(|mut name| {
            if shouting {
                name.last = title_case(&name.last.to_lowercase());
                name.given = name
                    .given
                    .iter()
                    .map(|g| title_case(&g.to_lowercase()))
                    .collect();
            }
            name.formatted()
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Family names of the authors, diacritics folded
pub fn family_names(author: &str) -> Vec<String> {
    parse_authors(author)
        .into_iter()
        .map(|n| remove_accents(&n.last))
        .collect()
}

// ============================================================================
// Pages
// ============================================================================

/// Normalize page ranges to the `--` separator
pub fn unify_pages(pages: &str) -> String {
    let mut pages = pages.trim().to_string();
    if pages.matches('-').count() == 1 {
        pages = pages.replace('-', "--");
    }
    pages
        .replace('–', "--")
        .replace("----", "--")
        .replace(" -- ", "--")
        .trim_end_matches('.')
        .to_string()
}

// ============================================================================
// Fuzzy ratios (0.0 - 1.0)
// ============================================================================

/// Normalized edit similarity of two strings
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Best ratio of the shorter string against any window of the longer one
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();
    if short_len == 0 {
        return if long_chars.is_empty() { 1.0 } else { 0.0 };
    }
    if short_len == long_chars.len() {
        return ratio(short, long);
    }
    (0..=long_chars.len() - short_len)
        .map(|start| {
            let window: String = long_chars[start..start + short_len].iter().collect();
            ratio(short, &window)
        })
        .fold(0.0, f64::max)
}

fn tokens(input: &str) -> BTreeSet<String> {
    input
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token-set ratio: compares the shared tokens with each side's remainder
///
/// Insensitive to word order, case, punctuation and duplicated words.
/// Two empty strings are identical.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let join = |set: Vec<&String>| set.into_iter().cloned().collect::<Vec<_>>().join(" ");
    let intersection = join(ta.intersection(&tb).collect());
    let diff_ab = join(ta.difference(&tb).collect());
    let diff_ba = join(tb.difference(&ta).collect());

    let combined = |diff: &str| {
        if intersection.is_empty() {
            diff.to_string()
        } else if diff.is_empty() {
            intersection.clone()
        } else {
            format!("{} {}", intersection, diff)
        }
    };
    let t1 = combined(&diff_ab);
    let t2 = combined(&diff_ba);

    let mut best = ratio(&t1, &t2);
    if !intersection.is_empty() {
        best = best.max(ratio(&intersection, &t1)).max(ratio(&intersection, &t2));
    }
    best
}

/// Round to four decimals
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
