//! Repository-relative paths of the persisted layout

/// Canonical records file
pub const RECORDS_FILE: &str = "records.bib";
/// Project settings
pub const SETTINGS_FILE: &str = "settings.toml";
/// Status snapshot, rewritten on every commit
pub const STATUS_FILE: &str = "status.toml";
/// Operation report (git-ignored)
pub const REPORT_FILE: &str = ".report.log";
/// Data-extraction file (propagation lock)
pub const DATA_FILE: &str = "data.csv";
/// Manuscript
pub const PAPER_FILE: &str = "paper.md";
pub const GITIGNORE_FILE: &str = ".gitignore";

pub const SEARCH_DIR: &str = "search";
pub const PDF_DIR: &str = "pdfs";
pub const DEDUPE_DIR: &str = "dedupe";
pub const PRESCREEN_DIR: &str = "prescreen";
pub const SCREEN_DIR: &str = "screen";
pub const DATA_DIR: &str = "data";
pub const PDF_GET_MAN_DIR: &str = "pdf_get_man";
pub const PDF_PREP_MAN_DIR: &str = "pdf_prep_man";

/// Ignore pattern matching everything under `search/`
pub const SEARCH_DIR_PATTERN: &str = "search/";
/// Ignore pattern matching everything under `pdfs/`
pub const PDF_DIR_PATTERN: &str = "pdfs/";

/// Active-learning training data
pub const TRAINING_DATA_FILE: &str = "dedupe/training_data.json";
pub const DUPLICATES_TO_VALIDATE: &str = "dedupe/duplicates_to_validate.xlsx";
pub const NON_DUPLICATES_TO_VALIDATE: &str = "dedupe/non_duplicates_to_validate.xlsx";
/// Manual merge list read by `dedupe --fix_errors`
pub const DUPES_FILE: &str = "dedupe/dupes.txt";

/// Whether `path` (repository-relative, `/`-separated) matches an ignore pattern
///
/// Patterns ending in `/` match everything below that directory; other
/// patterns match the path exactly.
pub fn matches_pattern(path: &str, pattern: &str) -> bool {
    if pattern.ends_with('/') {
        path.starts_with(pattern)
    } else {
        path == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_patterns_match_children() {
        assert!(matches_pattern("pdfs/Smith2020.pdf", PDF_DIR_PATTERN));
        assert!(!matches_pattern("pdfs.bib", PDF_DIR_PATTERN));
        assert!(matches_pattern("records.bib", RECORDS_FILE));
        assert!(!matches_pattern("search/records.bib", RECORDS_FILE));
    }
}
