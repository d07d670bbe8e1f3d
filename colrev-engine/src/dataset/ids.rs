//! Record ID generation

use colrev_common::record::fields::{AUTHOR, EDITOR, YEAR};
use colrev_common::settings::IdPattern;
use colrev_common::text::{format_author_field, remove_accents};
use colrev_common::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(.*\)").unwrap());
static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9a-zA-Z]+").unwrap());

fn family_name(author: &str) -> String {
    let name = match author.split_once(',') {
        Some((last, _)) => last,
        None => author.split(' ').next().unwrap_or(author),
    };
    name.replace(' ', "")
}

/// ID stem before collision handling
///
/// `THREE_AUTHORS`: up to three family names, `EtAl` for longer lists, then
/// the year (`NoYear` when absent). `FIRST_AUTHOR`: one family name and the
/// year. Diacritics are folded and non-alphanumerics stripped.
pub fn id_stem(record: &Record, pattern: IdPattern) -> String {
    let authors: Vec<String> = match record.known(AUTHOR).or_else(|| record.known(EDITOR)) {
        Some(value) => format_author_field(value)
            .split(" and ")
            .map(str::to_string)
            .collect(),
        None => vec!["Anonymous".to_string()],
    };
    let year = record.known(YEAR).unwrap_or("NoYear");

    let mut stem = match pattern {
        IdPattern::FirstAuthor => family_name(&authors[0]),
        IdPattern::ThreeAuthors => {
            let mut stem: String = authors.iter().take(3).map(|a| family_name(a)).collect();
            if authors.len() > 3 {
                stem.push_str("EtAl");
            }
            stem
        }
    };
    stem.push_str(year);

    if stem.chars().any(char::is_alphabetic) && stem == stem.to_uppercase() {
        let mut chars = stem.chars();
        stem = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => stem,
        };
    }
    let stem = remove_accents(&stem);
    let stem = PARENTHESIZED.replace_all(&stem, "");
    NON_ALPHANUMERIC.replace_all(&stem, "").to_string()
}

/// Letter suffixes in order: a..z, aa..zz, aaa..
fn suffixes() -> impl Iterator<Item = String> {
    (1usize..).flat_map(|len| {
        let total = 26usize.pow(len as u32);
        (0..total).map(move |mut n| {
            let mut suffix = vec!['a'; len];
            for slot in suffix.iter_mut().rev() {
                *slot = (b'a' + (n % 26) as u8) as char;
                n /= 26;
            }
            suffix.into_iter().collect()
        })
    })
}

/// First variant of `stem` not in `existing`
///
/// `existing` holds lowercased IDs; comparison is case-insensitive.
pub fn next_unique_id(stem: &str, existing: &HashSet<String>) -> String {
    let taken = |id: &str| existing.contains(&id.to_lowercase());
    if !taken(stem) {
        return stem.to_string();
    }
    suffixes()
        .map(|s| format!("{}{}", stem, s))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| stem.to_string())
}

/// Whether `id` ends in a letter suffix added for uniqueness (`Smith2020a`)
pub fn has_letter_suffix(id: &str) -> bool {
    let trimmed = id.trim_end_matches(|c: char| c.is_ascii_lowercase());
    trimmed.len() < id.len() && trimmed.ends_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(author: &str, year: &str) -> Record {
        Record::new("x", "article")
            .with_field("author", author)
            .with_field("year", year)
    }

    #[test]
    fn three_author_stems() {
        assert_eq!(
            id_stem(&record("Webster, J. and Watson, R.", "2002"), IdPattern::ThreeAuthors),
            "WebsterWatson2002"
        );
        assert_eq!(
            id_stem(
                &record("Hovorka, D. and Rowe, F. and Markus, L. and Jarvenpaa, S.", "2019"),
                IdPattern::ThreeAuthors
            ),
            "HovorkaRoweMarkusEtAl2019"
        );
        assert_eq!(
            id_stem(&record("Müller, Jörg and van der Aalst, W.", "2020"), IdPattern::ThreeAuthors),
            "MullervanderAalst2020"
        );
    }

    #[test]
    fn first_author_and_fallbacks() {
        assert_eq!(
            id_stem(&record("Webster, J. and Watson, R.", "2002"), IdPattern::FirstAuthor),
            "Webster2002"
        );
        let anonymous = Record::new("x", "misc");
        assert_eq!(id_stem(&anonymous, IdPattern::FirstAuthor), "AnonymousNoYear");
    }

    #[test]
    fn collisions_append_letters() {
        let existing: HashSet<String> = ["smith2020", "smith2020a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(next_unique_id("Smith2020", &existing), "Smith2020b");
        assert_eq!(next_unique_id("Jones2020", &existing), "Jones2020");

        let full: HashSet<String> = std::iter::once("x".to_string())
            .chain(suffixes().take(26).map(|s| format!("x{}", s)))
            .collect();
        assert_eq!(next_unique_id("x", &full), "xaa");
    }

    #[test]
    fn letter_suffix_detection() {
        assert!(has_letter_suffix("Smith2020a"));
        assert!(has_letter_suffix("Smith2020ab"));
        assert!(!has_letter_suffix("Smith2020"));
        assert!(!has_letter_suffix("SmithNoYear"));
    }
}
