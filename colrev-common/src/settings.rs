//! Project settings (`settings.toml`)
//!
//! Endpoint lists are closed registries: each entry is a tagged variant
//! (`endpoint = "..."`), so an unknown endpoint name fails deserialization
//! and surfaces as a settings error.

use crate::state::ProcessType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub project: ProjectSettings,
    #[serde(default)]
    pub sources: Vec<SearchSource>,
    #[serde(default)]
    pub prep: PrepSettings,
    #[serde(default)]
    pub dedupe: DedupeSettings,
    #[serde(default)]
    pub prescreen: PrescreenSettings,
    #[serde(default)]
    pub pdf_get: PdfGetSettings,
    #[serde(default)]
    pub pdf_prep: PdfPrepSettings,
    #[serde(default)]
    pub screen: ScreenSettings,
    #[serde(default)]
    pub data: DataSettings,
}

// ============================================================================
// Project
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    LiteratureReview,
    NarrativeReview,
    ScopingReview,
    DescriptiveReview,
    TheoreticalReview,
    CuratedMasterdata,
}

impl std::str::FromStr for ReviewType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        toml::Value::String(s.to_string())
            .try_into()
            .map_err(|_| Error::Settings(format!("Unknown review type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdPattern {
    ThreeAuthors,
    FirstAuthor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub title: String,
    pub review_type: ReviewType,
    #[serde(default = "default_id_pattern")]
    pub id_pattern: IdPattern,
    /// Disables the preceding-states check (single-shot reviews)
    #[serde(default)]
    pub delay_automated_processing: bool,
    #[serde(default)]
    pub curated_fields: Vec<String>,
    #[serde(default)]
    pub curation_url: Option<String>,
    #[serde(default)]
    pub colrev_version: String,
}

fn default_id_pattern() -> IdPattern {
    IdPattern::ThreeAuthors
}

// ============================================================================
// Sources
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchType {
    Db,
    Feed,
    Pdfs,
    BackwardSearch,
    Other,
}

/// Scripts that retrieve records for `FEED` sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum SearchScript {
    /// Import of a file exported by the user
    Unknown,
    /// Crossref journal feed; `search_parameters` holds `issn=...`
    Crossref,
    /// DBLP venue feed; `search_parameters` holds `venue_key=...`
    Dblp,
    /// PDF directory scan
    PdfsDir,
}

/// Converters from raw search exports to records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum ConversionScript {
    Bibtex,
    Ris,
    Enl,
    Csv,
    Xlsx,
    Pdf,
}

impl ConversionScript {
    pub fn name(&self) -> &'static str {
        match self {
            ConversionScript::Bibtex => "bibtex",
            ConversionScript::Ris => "ris",
            ConversionScript::Enl => "enl",
            ConversionScript::Csv => "csv",
            ConversionScript::Xlsx => "xlsx",
            ConversionScript::Pdf => "pdf",
        }
    }

    /// Converter for a file extension
    pub fn for_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "bib" => Some(ConversionScript::Bibtex),
            "ris" => Some(ConversionScript::Ris),
            "enl" | "end" => Some(ConversionScript::Enl),
            "csv" => Some(ConversionScript::Csv),
            "xlsx" | "xls" => Some(ConversionScript::Xlsx),
            "pdf" => Some(ConversionScript::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSource {
    /// Path relative to the repository root (`search/<name>`)
    pub filename: String,
    pub search_type: SearchType,
    pub source_name: String,
    #[serde(default)]
    pub source_identifier: String,
    #[serde(default)]
    pub search_parameters: String,
    pub search_script: SearchScript,
    pub conversion_script: ConversionScript,
}

impl SearchSource {
    /// Value of a `key=value` item in the search parameters
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.search_parameters
            .split([';', '&'])
            .filter_map(|item| item.split_once('='))
            .find(|(k, _)| k.trim() == key)
            .map(|(_, v)| v.trim())
    }

    /// Origin prefix of records imported from this source
    pub fn origin_prefix(&self) -> String {
        Path::new(&self.filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }
}

// ============================================================================
// Prep
// ============================================================================

/// Preparation endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum PrepScript {
    ExcludeNonLatinAlphabets,
    ExcludeLanguages {
        #[serde(default = "default_languages")]
        languages_to_include: Vec<String>,
    },
    ExcludeCollections,
    RemoveUrlsWith500Errors,
    RemoveBrokenIds,
    GlobalIdsConsistencyCheck,
    PrepCurated,
    Format,
    ResolveCrossrefs,
    GetDoiFromUrls,
    GetMasterdataFromDoi,
    GetMasterdataFromCrossref,
    GetMasterdataFromDblp,
    GetMasterdataFromSemanticScholar,
    GetMasterdataFromOpenLibrary,
    GetYearFromVolIssJourCrossref,
    GetRecordFromLocalIndex,
    RemoveNicknames,
    FormatMinor,
    DropFields,
    RemoveRedundantFields,
    CorrectRecordtype,
    UpdateMetadataStatus,
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepRound {
    pub name: String,
    pub similarity: f64,
    pub scripts: Vec<PrepScript>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepSettings {
    #[serde(default)]
    pub fields_to_keep: Vec<String>,
    #[serde(default = "default_prep_rounds")]
    pub prep_rounds: Vec<PrepRound>,
    #[serde(default)]
    pub man_prep_scripts: Vec<ManPrepScript>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum ManPrepScript {
    ExportManPrep,
}

impl Default for PrepSettings {
    fn default() -> Self {
        Self {
            fields_to_keep: Vec::new(),
            prep_rounds: default_prep_rounds(),
            man_prep_scripts: vec![ManPrepScript::ExportManPrep],
        }
    }
}

fn metadata_scripts() -> Vec<PrepScript> {
    vec![
        PrepScript::GetMasterdataFromDoi,
        PrepScript::GetMasterdataFromCrossref,
        PrepScript::GetMasterdataFromDblp,
        PrepScript::GetMasterdataFromSemanticScholar,
        PrepScript::GetMasterdataFromOpenLibrary,
        PrepScript::GetRecordFromLocalIndex,
    ]
}

fn default_prep_rounds() -> Vec<PrepRound> {
    let mut high_confidence = vec![
        PrepScript::RemoveUrlsWith500Errors,
        PrepScript::RemoveBrokenIds,
        PrepScript::GlobalIdsConsistencyCheck,
        PrepScript::PrepCurated,
        PrepScript::Format,
        PrepScript::ResolveCrossrefs,
        PrepScript::GetDoiFromUrls,
        PrepScript::GetMasterdataFromDoi,
        PrepScript::GetMasterdataFromCrossref,
        PrepScript::GetMasterdataFromDblp,
        PrepScript::GetMasterdataFromSemanticScholar,
        PrepScript::GetMasterdataFromOpenLibrary,
        PrepScript::GetYearFromVolIssJourCrossref,
        PrepScript::GetRecordFromLocalIndex,
    ];
    high_confidence.extend([
        PrepScript::RemoveNicknames,
        PrepScript::FormatMinor,
        PrepScript::DropFields,
        PrepScript::RemoveRedundantFields,
        PrepScript::CorrectRecordtype,
        PrepScript::UpdateMetadataStatus,
    ]);
    let with_status = |mut scripts: Vec<PrepScript>| {
        scripts.push(PrepScript::UpdateMetadataStatus);
        scripts
    };
    vec![
        PrepRound {
            name: "exclusion".to_string(),
            similarity: 1.0,
            scripts: vec![
                PrepScript::ExcludeNonLatinAlphabets,
                PrepScript::ExcludeLanguages {
                    languages_to_include: default_languages(),
                },
                PrepScript::ExcludeCollections,
            ],
        },
        PrepRound {
            name: "high_confidence".to_string(),
            similarity: 0.99,
            scripts: high_confidence,
        },
        PrepRound {
            name: "medium_confidence".to_string(),
            similarity: 0.9,
            scripts: with_status(metadata_scripts()),
        },
        PrepRound {
            name: "low_confidence".to_string(),
            similarity: 0.8,
            scripts: with_status(metadata_scripts()),
        },
    ]
}

// ============================================================================
// Dedupe
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSourceMerges {
    Prevent,
    Warn,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum DedupeScript {
    SimpleDedupe {
        #[serde(default = "default_non_dup_threshold")]
        merging_non_dup_threshold: f64,
        #[serde(default = "default_dup_threshold")]
        merging_dup_threshold: f64,
    },
    ActiveLearningTraining,
    ActiveLearningAutomated {
        #[serde(default = "default_merge_threshold")]
        merge_threshold: f64,
        #[serde(default = "default_partition_threshold")]
        partition_threshold: f64,
    },
    CurationFullOutletDedupe {
        #[serde(default)]
        selected_source: Option<String>,
    },
    CurationMissingDedupe {
        selected_source: String,
    },
}

fn default_non_dup_threshold() -> f64 {
    0.7
}
fn default_dup_threshold() -> f64 {
    0.95
}
fn default_merge_threshold() -> f64 {
    0.8
}
fn default_partition_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupeSettings {
    #[serde(default = "default_same_source_merges")]
    pub same_source_merges: SameSourceMerges,
    #[serde(default = "default_dedupe_scripts")]
    pub scripts: Vec<DedupeScript>,
}

fn default_same_source_merges() -> SameSourceMerges {
    SameSourceMerges::Prevent
}

fn default_dedupe_scripts() -> Vec<DedupeScript> {
    vec![DedupeScript::SimpleDedupe {
        merging_non_dup_threshold: default_non_dup_threshold(),
        merging_dup_threshold: default_dup_threshold(),
    }]
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self {
            same_source_merges: default_same_source_merges(),
            scripts: default_dedupe_scripts(),
        }
    }
}

// ============================================================================
// Prescreen
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeScope {
    #[serde(default)]
    pub from: Option<u32>,
    #[serde(default)]
    pub to: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum PrescreenScript {
    /// Exclude records outside the time, language or outlet scope
    ScopePrescreen {
        #[serde(default)]
        timescope: Option<TimeScope>,
        #[serde(default)]
        language_scope: Vec<String>,
        #[serde(default)]
        exclude_complementary_materials: bool,
        #[serde(default)]
        outlet_exclusion: Vec<String>,
    },
    /// Include every remaining record
    ConditionalPrescreen,
    /// Decisions exchanged through `prescreen/prescreen.csv|xlsx`
    TablePrescreen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescreenSettings {
    #[serde(default)]
    pub explanation: String,
    #[serde(default = "default_prescreen_scripts")]
    pub scripts: Vec<PrescreenScript>,
}

fn default_prescreen_scripts() -> Vec<PrescreenScript> {
    vec![PrescreenScript::ScopePrescreen {
        timescope: None,
        language_scope: vec!["en".to_string()],
        exclude_complementary_materials: true,
        outlet_exclusion: Vec::new(),
    }]
}

impl Default for PrescreenSettings {
    fn default() -> Self {
        Self {
            explanation: String::new(),
            scripts: default_prescreen_scripts(),
        }
    }
}

// ============================================================================
// PDF get / prep
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfPathType {
    Symlink,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum PdfGetScript {
    LocalDirectoryLinker,
    LocalIndex,
    Unpaywall {
        #[serde(default)]
        email: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfGetSettings {
    #[serde(default = "default_pdf_path_type")]
    pub pdf_path_type: PdfPathType,
    #[serde(default = "default_pdf_get_scripts")]
    pub scripts: Vec<PdfGetScript>,
    #[serde(default = "default_pdf_get_man_scripts")]
    pub man_scripts: Vec<PdfGetManScript>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum PdfGetManScript {
    ExportPdfGetMan,
}

fn default_pdf_path_type() -> PdfPathType {
    PdfPathType::Symlink
}

fn default_pdf_get_scripts() -> Vec<PdfGetScript> {
    vec![
        PdfGetScript::LocalDirectoryLinker,
        PdfGetScript::LocalIndex,
        PdfGetScript::Unpaywall { email: None },
    ]
}

fn default_pdf_get_man_scripts() -> Vec<PdfGetManScript> {
    vec![PdfGetManScript::ExportPdfGetMan]
}

impl Default for PdfGetSettings {
    fn default() -> Self {
        Self {
            pdf_path_type: default_pdf_path_type(),
            scripts: default_pdf_get_scripts(),
            man_scripts: default_pdf_get_man_scripts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum PdfPrepScript {
    PdfCheckOcr,
    RemoveCoverpage,
    RemoveLastPage,
    ValidatePdfMetadata,
    ValidateCompleteness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfPrepSettings {
    /// Hard timeout of each preparation step
    #[serde(default = "default_pdf_prep_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_pdf_prep_scripts")]
    pub scripts: Vec<PdfPrepScript>,
}

fn default_pdf_prep_timeout() -> u64 {
    60
}

fn default_pdf_prep_scripts() -> Vec<PdfPrepScript> {
    vec![
        PdfPrepScript::PdfCheckOcr,
        PdfPrepScript::RemoveCoverpage,
        PdfPrepScript::RemoveLastPage,
        PdfPrepScript::ValidatePdfMetadata,
        PdfPrepScript::ValidateCompleteness,
    ]
}

impl Default for PdfPrepSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_pdf_prep_timeout(),
            scripts: default_pdf_prep_scripts(),
        }
    }
}

// ============================================================================
// Screen / data
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionType {
    InclusionCriterion,
    ExclusionCriterion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenCriterion {
    pub explanation: String,
    #[serde(default = "default_criterion_type")]
    pub criterion_type: CriterionType,
    #[serde(default)]
    pub comment: String,
}

fn default_criterion_type() -> CriterionType {
    CriterionType::InclusionCriterion
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum ScreenScript {
    /// Include every record (no criteria evaluated)
    ConditionalScreen,
    /// Decisions exchanged through `screen/screen.csv`
    TableScreen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenSettings {
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub criteria: BTreeMap<String, ScreenCriterion>,
    #[serde(default = "default_screen_scripts")]
    pub scripts: Vec<ScreenScript>,
}

fn default_screen_scripts() -> Vec<ScreenScript> {
    vec![ScreenScript::TableScreen]
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            explanation: String::new(),
            criteria: BTreeMap::new(),
            scripts: default_screen_scripts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataField {
    pub name: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
}

fn default_data_type() -> String {
    "str".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum DataScript {
    /// Extraction table in `data.csv`
    Structured {
        #[serde(default)]
        fields: Vec<DataField>,
    },
    /// Citations in `paper.md`
    Manuscript {
        #[serde(default)]
        word_template: Option<String>,
    },
}

impl DataScript {
    pub fn tag(&self) -> &'static str {
        match self {
            DataScript::Structured { .. } => "structured",
            DataScript::Manuscript { .. } => "manuscript",
        }
    }

    /// Endpoint for a tag given on the command line
    ///
    /// A new structured endpoint starts with a single `summary` field.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "structured" => Ok(DataScript::Structured {
                fields: vec![DataField {
                    name: "summary".to_string(),
                    explanation: "Main contribution of the paper".to_string(),
                    data_type: default_data_type(),
                }],
            }),
            "manuscript" => Ok(DataScript::Manuscript { word_template: None }),
            other => Err(Error::Settings(format!("Unknown data endpoint: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    #[serde(default)]
    pub scripts: Vec<DataScript>,
}

// ============================================================================
// Loading
// ============================================================================

impl Settings {
    /// Default settings for a new project
    pub fn new(title: &str, review_type: ReviewType) -> Self {
        let mut settings = Self {
            project: ProjectSettings {
                title: title.to_string(),
                review_type,
                id_pattern: IdPattern::ThreeAuthors,
                delay_automated_processing: false,
                curated_fields: Vec::new(),
                curation_url: None,
                colrev_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            sources: Vec::new(),
            prep: PrepSettings::default(),
            dedupe: DedupeSettings::default(),
            prescreen: PrescreenSettings::default(),
            pdf_get: PdfGetSettings::default(),
            pdf_prep: PdfPrepSettings::default(),
            screen: ScreenSettings::default(),
            data: DataSettings::default(),
        };
        if review_type == ReviewType::CuratedMasterdata {
            settings.project.delay_automated_processing = true;
            settings.dedupe.scripts = vec![DedupeScript::CurationFullOutletDedupe {
                selected_source: None,
            }];
            settings.prescreen.scripts = vec![PrescreenScript::ConditionalPrescreen];
            settings.screen.scripts = vec![ScreenScript::ConditionalScreen];
        } else {
            settings.data.scripts = vec![DataScript::Manuscript { word_template: None }];
        }
        settings
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Settings(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Settings(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn source(&self, filename: &str) -> Option<&SearchSource> {
        self.sources
            .iter()
            .find(|s| s.filename == filename || s.origin_prefix() == filename)
    }

    /// Whether the project is a curated masterdata repository
    pub fn is_curated_masterdata(&self) -> bool {
        self.project.review_type == ReviewType::CuratedMasterdata
    }

    /// Effective settings of one operation, as TOML (for commit messages)
    pub fn section_toml(&self, process: ProcessType) -> String {
        let section = match process {
            ProcessType::Search | ProcessType::Load => toml::Value::try_from(&self.sources)
                .map(|v| wrap("sources", v)),
            ProcessType::Prep | ProcessType::PrepMan => toml::Value::try_from(&self.prep).map(|v| wrap("prep", v)),
            ProcessType::Dedupe => toml::Value::try_from(&self.dedupe).map(|v| wrap("dedupe", v)),
            ProcessType::Prescreen => {
                toml::Value::try_from(&self.prescreen).map(|v| wrap("prescreen", v))
            }
            ProcessType::PdfGet | ProcessType::PdfGetMan => {
                toml::Value::try_from(&self.pdf_get).map(|v| wrap("pdf_get", v))
            }
            ProcessType::PdfPrep | ProcessType::PdfPrepMan => {
                toml::Value::try_from(&self.pdf_prep).map(|v| wrap("pdf_prep", v))
            }
            ProcessType::Screen => toml::Value::try_from(&self.screen).map(|v| wrap("screen", v)),
            ProcessType::Data => toml::Value::try_from(&self.data).map(|v| wrap("data", v)),
            ProcessType::Format | ProcessType::Explore | ProcessType::Check => {
                toml::Value::try_from(&self.project).map(|v| wrap("project", v))
            }
        };
        section
            .ok()
            .and_then(|v| toml::to_string(&v).ok())
            .unwrap_or_default()
    }
}

fn wrap(name: &str, value: toml::Value) -> toml::Value {
    let mut table = toml::map::Map::new();
    table.insert(name.to_string(), value);
    toml::Value::Table(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_round_trip() {
        let settings = Settings::new("Digital platforms", ReviewType::LiteratureReview);
        let text = settings.to_toml().unwrap();
        let parsed = Settings::from_toml(&text).unwrap();
        assert_eq!(parsed, settings);
        assert_eq!(parsed.prep.prep_rounds.len(), 4);
        assert_eq!(parsed.pdf_prep.timeout_secs, 60);
    }

    #[test]
    fn every_metadata_round_queries_semantic_scholar() {
        let rounds = PrepSettings::default().prep_rounds;
        for round in rounds.iter().filter(|r| r.name != "exclusion") {
            let position = |script: &PrepScript| round.scripts.iter().position(|s| s == script);
            let dblp = position(&PrepScript::GetMasterdataFromDblp);
            let semantic_scholar = position(&PrepScript::GetMasterdataFromSemanticScholar);
            assert!(semantic_scholar.is_some(), "{} lacks semantic scholar", round.name);
            assert_eq!(semantic_scholar, dblp.map(|i| i + 1), "{}", round.name);
        }
    }

    #[test]
    fn minimal_settings_fill_defaults() {
        let settings = Settings::from_toml(
            r#"
            [project]
            title = "x"
            review_type = "literature_review"

            [[sources]]
            filename = "search/lr.bib"
            search_type = "DB"
            source_name = "scopus"
            search_script = { endpoint = "unknown" }
            conversion_script = { endpoint = "bibtex" }
            "#,
        )
        .unwrap();
        assert_eq!(settings.project.id_pattern, IdPattern::ThreeAuthors);
        assert_eq!(settings.sources[0].origin_prefix(), "lr.bib");
        assert!(matches!(
            settings.dedupe.scripts[0],
            DedupeScript::SimpleDedupe { merging_dup_threshold, .. } if merging_dup_threshold == 0.95
        ));
    }

    #[test]
    fn unknown_endpoint_is_settings_error() {
        let err = Settings::from_toml(
            r#"
            [project]
            title = "x"
            review_type = "literature_review"

            [dedupe]
            scripts = [{ endpoint = "magic_dedupe" }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn source_parameters() {
        let source = SearchSource {
            filename: "search/misq.bib".into(),
            search_type: SearchType::Feed,
            source_name: "crossref".into(),
            source_identifier: String::new(),
            search_parameters: "issn=0276-7783".into(),
            search_script: SearchScript::Crossref,
            conversion_script: ConversionScript::Bibtex,
        };
        assert_eq!(source.parameter("issn"), Some("0276-7783"));
        assert_eq!(source.parameter("venue_key"), None);
    }

    #[test]
    fn review_type_from_str() {
        assert_eq!(
            "curated_masterdata".parse::<ReviewType>().unwrap(),
            ReviewType::CuratedMasterdata
        );
        assert!("nonsense".parse::<ReviewType>().is_err());
    }
}
