//! Completeness of a PDF against the `pages` metadata

use once_cell::sync::Lazy;
use regex::Regex;

/// Notice on truncated previews
pub const FULL_VERSION_NOTICE: &str =
    "morepagesareavailableinthefullversionofthisdocument,whichmaybepurchas";

static ROMAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^M{0,3}(CM|CD|D?C{0,3})(XC|XL|L?X{0,3})(IX|IV|V?I{0,3})$").unwrap()
});

fn roman_value(c: char) -> Option<u32> {
    Some(match c {
        'i' => 1,
        'v' => 5,
        'x' => 10,
        'l' => 50,
        'c' => 100,
        'd' => 500,
        'm' => 1000,
        _ => return None,
    })
}

/// Arabic value of a roman numeral (`None` if it is not one)
pub fn roman_to_int(s: &str) -> Option<u32> {
    if s.is_empty() || !ROMAN.is_match(s) {
        return None;
    }
    let values: Vec<u32> = s
        .to_lowercase()
        .chars()
        .map(roman_value)
        .collect::<Option<_>>()?;
    let mut total = 0;
    for (i, v) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(next) if next > v => total -= *v as i64,
            _ => total += *v as i64,
        }
    }
    u32::try_from(total).ok()
}

fn page_number(s: &str) -> Option<u32> {
    let s = s.trim();
    s.parse().ok().or_else(|| roman_to_int(s))
}

/// Number of pages the `pages` field describes
///
/// Accepts `N`, `N--M` and roman numerals in either form.
pub fn pages_in_metadata(pages: &str) -> Option<usize> {
    match pages.split_once("--") {
        Some((start, end)) => {
            let (start, end) = (page_number(start)?, page_number(end)?);
            (end >= start).then(|| (end - start + 1) as usize)
        }
        None => page_number(pages).map(|_| 1),
    }
}

/// Verdict of the completeness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Complete,
    NotFullVersion,
    NoPagesInMetadata,
    PagesNotMatching { in_file: usize, in_metadata: usize },
}

impl Completeness {
    /// Provenance note of a failed check
    pub fn note(&self) -> Option<&'static str> {
        match self {
            Completeness::Complete => None,
            Completeness::NotFullVersion => Some("not_full_version"),
            Completeness::NoPagesInMetadata => Some("no_pages_in_metadata"),
            Completeness::PagesNotMatching { .. } => Some("nr_pages_not_matching"),
        }
    }
}

/// Compare the file's page count with the metadata
///
/// # Arguments
/// * `first_pages` - Text of the first two pages
/// * `last_pages` - Text of the last three pages
/// * `pages_in_file` - Page count of the PDF
/// * `pages` - The record's `pages` field
///
/// One page more or less than the metadata is tolerated (title or notice
/// pages). More pages pass when the tail mentions an appendix.
pub fn check(first_pages: &str, last_pages: &str, pages_in_file: usize, pages: Option<&str>) -> Completeness {
    let compact = super::document::compact(first_pages);
    if compact.contains(FULL_VERSION_NOTICE) {
        return Completeness::NotFullVersion;
    }
    let Some(in_metadata) = pages.and_then(pages_in_metadata) else {
        return Completeness::NoPagesInMetadata;
    };
    if in_metadata.abs_diff(pages_in_file) <= 1 {
        return Completeness::Complete;
    }
    if pages_in_file > in_metadata && last_pages.to_lowercase().contains("appendi") {
        return Completeness::Complete;
    }
    Completeness::PagesNotMatching {
        in_file: pages_in_file,
        in_metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roman_numerals() {
        assert_eq!(roman_to_int("xiv"), Some(14));
        assert_eq!(roman_to_int("MCMXC"), Some(1990));
        assert_eq!(roman_to_int("abc"), None);
        assert_eq!(pages_in_metadata("iv--xii"), Some(9));
    }

    #[test]
    fn page_ranges() {
        assert_eq!(pages_in_metadata("213--245"), Some(33));
        assert_eq!(pages_in_metadata("17"), Some(1));
        assert_eq!(pages_in_metadata("e12"), None);
        assert_eq!(pages_in_metadata("20--10"), None);
    }

    #[test]
    fn off_by_one_is_tolerated() {
        assert_eq!(check("", "", 11, Some("1--10")), Completeness::Complete);
        assert_eq!(
            check("", "", 14, Some("1--10")),
            Completeness::PagesNotMatching {
                in_file: 14,
                in_metadata: 10
            }
        );
    }

    #[test]
    fn appendix_allows_longer_files() {
        assert_eq!(check("", "Appendix A: Survey items", 14, Some("1--10")), Completeness::Complete);
        assert_ne!(check("", "Appendix A", 5, Some("1--10")), Completeness::Complete);
    }

    #[test]
    fn truncated_previews_and_missing_pages() {
        let preview = "More pages are available in the full version of this document, which may be purchased";
        assert_eq!(check(preview, "", 2, Some("1--2")), Completeness::NotFullVersion);
        assert_eq!(check("", "", 2, None), Completeness::NoPagesInMetadata);
        assert_eq!(Completeness::NoPagesInMetadata.note(), Some("no_pages_in_metadata"));
    }
}
