//! Field names and per-entry-type field rules

pub const AUTHOR: &str = "author";
pub const TITLE: &str = "title";
pub const YEAR: &str = "year";
pub const JOURNAL: &str = "journal";
pub const BOOKTITLE: &str = "booktitle";
pub const VOLUME: &str = "volume";
pub const NUMBER: &str = "number";
pub const PAGES: &str = "pages";
pub const SERIES: &str = "series";
pub const SCHOOL: &str = "school";
pub const INSTITUTION: &str = "institution";
pub const PUBLISHER: &str = "publisher";
pub const EDITOR: &str = "editor";
pub const CHAPTER: &str = "chapter";
pub const ISSUE: &str = "issue";
pub const DOI: &str = "doi";
pub const URL: &str = "url";
pub const FULLTEXT: &str = "fulltext";
pub const FILE: &str = "file";
pub const ABSTRACT: &str = "abstract";
pub const LANGUAGE: &str = "language";
pub const DBLP_KEY: &str = "dblp_key";
pub const SEMANTIC_SCHOLAR_ID: &str = "semantic_scholar_id";
pub const CROSSMARK: &str = "crossmark";
pub const SCREENING_CRITERIA: &str = "screening_criteria";
pub const EXCL_CRITERIA: &str = "excl_criteria";
pub const PRESCREEN_EXCLUSION: &str = "prescreen_exclusion";
pub const MANUAL_DUPLICATE: &str = "manual_duplicate";
pub const MANUAL_NON_DUPLICATE: &str = "manual_non_duplicate";
pub const MOVED_DUPE_ID: &str = "MOVED_DUPE_ID";

// State fields (typed on `Record`, named here for serialization)
pub const ORIGIN: &str = "colrev_origin";
pub const STATUS: &str = "colrev_status";
pub const MD_PROV: &str = "colrev_masterdata_provenance";
pub const D_PROV: &str = "colrev_data_provenance";
pub const COLREV_ID: &str = "colrev_id";
pub const PDF_ID: &str = "colrev_pdf_id";

/// Placeholder for a field value that is known to be unknown
pub const UNKNOWN: &str = "UNKNOWN";
/// Provenance key marking curated masterdata
pub const CURATED: &str = "CURATED";
/// Default provenance source of imported values
pub const ORIGINAL: &str = "ORIGINAL";

/// Fields that define a record's identity
pub const IDENTIFYING_FIELDS: [&str; 8] = [
    AUTHOR, TITLE, YEAR, JOURNAL, BOOKTITLE, VOLUME, NUMBER, PAGES,
];

/// Fields written as multi-line lists
pub const LIST_FIELDS: [&str; 4] = [ORIGIN, MD_PROV, D_PROV, COLREV_ID];

/// Provenance group in serialization order
pub const PROVENANCE_FIELDS: [&str; 4] = [MD_PROV, D_PROV, COLREV_ID, PDF_ID];

/// Titles too common to tell records apart
pub const GENERIC_TITLES: [&str; 7] = [
    "editorial",
    "editorial introduction",
    "editorial notes",
    "editor's comments",
    "book reviews",
    "editorial note",
    "reviewer ackowledgment",
];

pub fn is_identifying(key: &str) -> bool {
    IDENTIFYING_FIELDS.contains(&key)
}

/// Whether `key` is immutable once the masterdata is curated
pub fn is_curated_immutable(key: &str) -> bool {
    is_identifying(key) && key != PAGES
}

/// Required fields per entry type
pub fn required_fields(entry_type: &str) -> &'static [&'static str] {
    match entry_type {
        "article" => &[AUTHOR, TITLE, JOURNAL, YEAR, VOLUME, NUMBER],
        "inproceedings" => &[AUTHOR, TITLE, BOOKTITLE, YEAR],
        "incollection" => &[AUTHOR, TITLE, BOOKTITLE, PUBLISHER, YEAR],
        "inbook" => &[AUTHOR, TITLE, CHAPTER, PUBLISHER, YEAR],
        "proceedings" => &[BOOKTITLE, EDITOR],
        "book" => &[AUTHOR, TITLE, PUBLISHER, YEAR],
        "phdthesis" | "masterthesis" | "mastersthesis" => &[AUTHOR, TITLE, SCHOOL, YEAR],
        "techreport" => &[AUTHOR, TITLE, INSTITUTION, YEAR],
        "unpublished" | "misc" => &[AUTHOR, TITLE, YEAR],
        "software" => &[AUTHOR, TITLE, URL],
        _ => &[AUTHOR, TITLE, YEAR],
    }
}

/// Fields that contradict an entry type
pub fn inconsistent_fields(entry_type: &str) -> &'static [&'static str] {
    match entry_type {
        "article" => &[BOOKTITLE],
        "inproceedings" => &[ISSUE, NUMBER, JOURNAL],
        "inbook" => &[JOURNAL],
        "book" => &[VOLUME, ISSUE, NUMBER, JOURNAL],
        "phdthesis" | "masterthesis" | "mastersthesis" | "techreport" | "unpublished" => {
            &[VOLUME, ISSUE, NUMBER, JOURNAL, BOOKTITLE]
        }
        _ => &[],
    }
}

pub fn is_thesis(entry_type: &str) -> bool {
    entry_type.contains("thesis")
}
