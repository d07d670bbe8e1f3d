//! Record merging (fuse rule)

use super::fields::{self, AUTHOR, BOOKTITLE, FILE, JOURNAL, PAGES, TITLE, URL};
use super::quality::{author_has_defects, author_is_incomplete};
use super::Record;
use crate::text::percent_upper;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static PART_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"part [A-Za-z0-9]+$").unwrap());

/// Title terms that must agree between duplicates
const MATCH_REQUIRED_TERMS: [&str; 6] = [
    "erratum",
    "correction",
    "corrigendum",
    "comment",
    "commentary",
    "response",
];

/// Refuse merges of "part 1" / "part 2" and of a paper with its erratum
pub fn check_mergeable(main: &Record, merging: &Record) -> Result<()> {
    let title_a = main.get(TITLE).unwrap_or("").to_lowercase();
    let title_b = merging.get(TITLE).unwrap_or("").to_lowercase();

    let part_a = PART_SUFFIX.find(&title_a).map(|m| m.as_str());
    let part_b = PART_SUFFIX.find(&title_b).map(|m| m.as_str());
    if part_a != part_b {
        return Err(Error::InvalidMerge {
            id1: main.id.clone(),
            id2: merging.id.clone(),
            reason: "different parts of a series".to_string(),
        });
    }

    let terms = |title: &str| -> Vec<&str> {
        MATCH_REQUIRED_TERMS
            .iter()
            .copied()
            .filter(|t| title.contains(t))
            .collect()
    };
    if terms(&title_a) != terms(&title_b) {
        return Err(Error::InvalidMerge {
            id1: main.id.clone(),
            id2: merging.id.clone(),
            reason: "erratum, comment or response paired with the original".to_string(),
        });
    }
    Ok(())
}

/// Fuse `merging` into `main`
///
/// - Origins and colrev_ids are unioned; the later status wins.
/// - A curated side's identifying fields win; when `main` takes over curated
///   masterdata, its own identifying fields (except pages) are dropped.
/// - When neither side is curated, identifying fields follow the per-field
///   selection heuristics below.
/// - Other fields are added when missing; `file` values are joined, https
///   URLs and values replacing `UNKNOWN` win. Between two curated records
///   only missing fields are added.
pub fn merge(main: &mut Record, merging: &Record, default_source: &str) -> Result<()> {
    check_mergeable(main, merging)?;

    main.add_origins(merging.origin.iter());
    if merging.status.ordinal() > main.status.ordinal() {
        main.status = merging.status;
    }
    for cid in &merging.colrev_id {
        main.add_colrev_id(cid);
    }
    if main.colrev_pdf_id.is_none() {
        main.colrev_pdf_id = merging.colrev_pdf_id.clone();
    }

    let both_curated = main.is_curated() && merging.is_curated();
    match (main.is_curated(), merging.is_curated()) {
        (false, true) => {
            main.masterdata_provenance = merging.masterdata_provenance.clone();
            main.fields
                .retain(|k, _| !fields::is_identifying(k) || k == PAGES);
            for key in fields::IDENTIFYING_FIELDS {
                if let Some(value) = merging.known(key) {
                    main.fields.insert(key.to_string(), value.to_string());
                }
            }
            main.entry_type = merging.entry_type.clone();
        }
        (true, _) => {}
        (false, false) => {
            for key in fields::IDENTIFYING_FIELDS {
                if let Some(value) = merging.known(key) {
                    let (source, _) = merging.field_source(key, default_source);
                    fuse_identifying_field(main, key, value, &source);
                }
            }
        }
    }

    for (key, value) in &merging.fields {
        if fields::is_identifying(key) || value.trim().is_empty() || key == fields::MOVED_DUPE_ID {
            continue;
        }
        let (source, note) = merging.field_source(key, default_source);
        if both_curated {
            if !main.has(key) {
                main.fields.insert(key.to_string(), value.to_string());
                main.data_provenance.set(key, &source, &note);
            }
            continue;
        }
        merge_other_field(main, key, value, &source, &note);
    }
    Ok(())
}

fn fuse_identifying_field(main: &mut Record, key: &str, value: &str, source: &str) {
    let Some(current) = main.known(key).map(str::to_string) else {
        main.update_field(key, value, source, "");
        return;
    };
    let best = match key {
        AUTHOR => select_best_author(&current, value),
        PAGES => select_best_pages(&current, value),
        TITLE => select_best_title(&current, value),
        JOURNAL | BOOKTITLE => select_best_container_title(&current, value),
        _ => &current,
    };
    if best != current {
        let best = best.to_string();
        main.update_field(key, &best, source, "");
    }
}

fn merge_other_field(main: &mut Record, key: &str, value: &str, source: &str, note: &str) {
    match main.get(key).map(str::to_string) {
        None => {
            main.fields.insert(key.to_string(), value.to_string());
            main.data_provenance.set(key, source, note);
        }
        Some(current) if current == fields::UNKNOWN && value != fields::UNKNOWN => {
            main.fields.insert(key.to_string(), value.to_string());
            main.data_provenance.set(key, source, note);
        }
        Some(current) if key == FILE => {
            if !current.split(';').any(|f| f == value) {
                main.fields.insert(key.to_string(), format!("{};{}", current, value));
            }
        }
        Some(current) if key == URL => {
            if current.trim_end_matches('/') != value.trim_end_matches('/')
                && !current.starts_with("https")
                && value.starts_with("https")
            {
                main.fields.insert(key.to_string(), value.to_string());
                main.data_provenance.set(key, source, note);
            }
        }
        Some(_) => {}
    }
}

fn has_full_given_names(author: &str) -> bool {
    author.split(" and ").all(|name| match name.split_once(',') {
        Some((_, given)) => given
            .split_whitespace()
            .next()
            .is_some_and(|g| g.trim_end_matches('.').chars().count() > 1),
        None => false,
    })
}

/// Prefer complete, well-formed, non-capitalized author lists with full given names
pub fn select_best_author<'a>(default: &'a str, candidate: &'a str) -> &'a str {
    let default_defect = author_has_defects(default) || author_is_incomplete(default);
    let candidate_defect = author_has_defects(candidate) || author_is_incomplete(candidate);
    if !default_defect && candidate_defect {
        return default;
    }
    if default_defect && !candidate_defect {
        return candidate;
    }
    if percent_upper(default) > 0.8 && percent_upper(candidate) <= 0.8 {
        return candidate;
    }
    if !has_full_given_names(default) && has_full_given_names(candidate) {
        return candidate;
    }
    default
}

/// Prefer page ranges over single page numbers
pub fn select_best_pages<'a>(default: &'a str, candidate: &'a str) -> &'a str {
    if candidate.contains("--") && !default.contains("--") {
        candidate
    } else {
        default
    }
}

/// Prefer the title with lower upper-case density
pub fn select_best_title<'a>(default: &'a str, candidate: &'a str) -> &'a str {
    if default.replace(" - ", ": ") == candidate.replace(" - ", ": ") {
        return default;
    }
    let marked = candidate.ends_with(['*', '1', '2']);
    if !marked && percent_upper(default) > percent_upper(candidate) {
        candidate
    } else {
        default
    }
}

/// Prefer unabbreviated, lower-density container titles
pub fn select_best_container_title<'a>(default: &'a str, candidate: &'a str) -> &'a str {
    let mut best = default;
    if default.contains('.') && !candidate.contains('.') {
        best = candidate;
    }
    if percent_upper(default) > percent_upper(candidate) {
        best = candidate;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RecordState;
    use pretty_assertions::assert_eq;

    fn webster(id: &str, origin: &str) -> Record {
        Record::new(id, "article")
            .with_field("author", "Webster, J. and Watson, R.")
            .with_field("title", "Writing a literature review")
            .with_field("year", "2002")
            .with_field("journal", "MIS Quarterly")
            .with_origin(origin)
            .with_status(RecordState::MdPrepared)
    }

    #[test]
    fn origins_are_unioned() {
        let mut main = webster("WebsterWatson2002", "search/a.bib/1");
        let merging = webster("Webster2002a", "search/b.bib/7");
        merge(&mut main, &merging, "merged").unwrap();
        assert_eq!(main.origin, vec!["search/a.bib/1", "search/b.bib/7"]);

        // merging the same origin again does not duplicate it
        merge(&mut main, &merging, "merged").unwrap();
        assert_eq!(main.origin.len(), 2);
    }

    #[test]
    fn later_status_wins() {
        let mut main = webster("A", "s/1");
        let merging = webster("B", "s/2").with_status(RecordState::MdProcessed);
        merge(&mut main, &merging, "merged").unwrap();
        assert_eq!(main.status, RecordState::MdProcessed);
    }

    #[test]
    fn parts_and_errata_are_not_merged() {
        let mut a = webster("A", "s/1");
        a.set_raw("title", "Digital strategy part 1");
        let mut b = webster("B", "s/2");
        b.set_raw("title", "Digital strategy part 2");
        assert!(matches!(merge(&mut a, &b, "m"), Err(Error::InvalidMerge { .. })));

        let mut c = webster("C", "s/3");
        c.set_raw("title", "Erratum: Writing a literature review");
        let mut a = webster("A", "s/1");
        assert!(merge(&mut a, &c, "m").is_err());
        assert_eq!(a.origin.len(), 1);
    }

    #[test]
    fn fuse_prefers_lower_case_density_and_ranges() {
        let mut main = webster("A", "s/1").with_field("pages", "13");
        main.set_raw("title", "WRITING A LITERATURE REVIEW");
        let merging = webster("B", "s/2").with_field("pages", "13--23");
        merge(&mut main, &merging, "merged").unwrap();
        assert_eq!(main.get("title"), Some("Writing a literature review"));
        assert_eq!(main.get("pages"), Some("13--23"));
        assert_eq!(
            main.masterdata_provenance.get("pages").map(|e| e.source.as_str()),
            Some("merged")
        );
    }

    #[test]
    fn curated_merging_record_wins() {
        let mut main = webster("A", "s/1").with_field("pages", "1--2");
        main.set_raw("title", "A different title");
        let mut curated = webster("B", "curation/c.bib/9");
        curated
            .masterdata_provenance
            .set("CURATED", "https://github.com/x/y", "");
        merge(&mut main, &curated, "merged").unwrap();
        assert!(main.is_curated());
        assert_eq!(main.get("title"), Some("Writing a literature review"));
        assert_eq!(main.get("pages"), Some("1--2"));
    }

    #[test]
    fn curated_main_is_untouched() {
        let mut main = webster("A", "s/1");
        main.masterdata_provenance.set("CURATED", "https://github.com/x/y", "");
        let mut other = webster("B", "s/2").with_field("doi", "10.2307/4132319");
        other.set_raw("title", "writing a literature review");
        merge(&mut main, &other, "merged").unwrap();
        assert_eq!(main.get("title"), Some("Writing a literature review"));
        assert_eq!(main.get("doi"), Some("10.2307/4132319"));
    }

    #[test]
    fn two_curated_records_only_fill_gaps() {
        let curate = |r: Record| {
            let mut r = r;
            r.masterdata_provenance.set("CURATED", "https://github.com/x/y", "");
            r
        };
        let mut main = curate(
            webster("A", "s/1")
                .with_field("url", "http://x.org/a")
                .with_field("abstract", "UNKNOWN"),
        );
        let merging = curate(
            webster("B", "s/2")
                .with_field("url", "https://x.org/a2")
                .with_field("abstract", "Text")
                .with_field("keywords", "literature review"),
        );
        merge(&mut main, &merging, "merged").unwrap();
        assert_eq!(main.get("url"), Some("http://x.org/a"));
        assert_eq!(main.get("abstract"), Some("UNKNOWN"));
        assert_eq!(main.get("keywords"), Some("literature review"));
    }

    #[test]
    fn other_fields() {
        let mut main = webster("A", "s/1")
            .with_field("file", "pdfs/A.pdf")
            .with_field("url", "http://x.org/a")
            .with_field("abstract", "UNKNOWN");
        let merging = webster("B", "s/2")
            .with_field("file", "pdfs/B.pdf")
            .with_field("url", "https://x.org/a2")
            .with_field("abstract", "Text");
        merge(&mut main, &merging, "merged").unwrap();
        assert_eq!(main.get("file"), Some("pdfs/A.pdf;pdfs/B.pdf"));
        assert_eq!(main.get("url"), Some("https://x.org/a2"));
        assert_eq!(main.get("abstract"), Some("Text"));
    }

    #[test]
    fn author_selection() {
        assert_eq!(
            select_best_author("Webster, J. and others", "Webster, Jane and Watson, Richard"),
            "Webster, Jane and Watson, Richard"
        );
        assert_eq!(
            select_best_author("WEBSTER, JANE", "Webster, Jane"),
            "Webster, Jane"
        );
        assert_eq!(
            select_best_author("Webster, J.", "Webster, Jane"),
            "Webster, Jane"
        );
    }
}
