//! Record states and the transition table
//!
//! The lifecycle of a record is declared as data: every legal arc of the
//! state graph is one [`Transition`] entry in [`TRANSITIONS`], carrying the
//! operation (trigger) that performs it and the repository conditions that
//! must hold before the operation may run. The machine is a set of pure
//! functions over that table.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Legal values of `colrev_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    MdRetrieved,
    MdImported,
    MdNeedsManualPreparation,
    MdPrepared,
    MdProcessed,
    RevPrescreenExcluded,
    RevPrescreenIncluded,
    PdfNeedsManualRetrieval,
    PdfImported,
    PdfNotAvailable,
    PdfNeedsManualPreparation,
    PdfPrepared,
    RevExcluded,
    RevIncluded,
    RevSynthesized,
}

impl RecordState {
    pub const ALL: [RecordState; 15] = [
        RecordState::MdRetrieved,
        RecordState::MdImported,
        RecordState::MdNeedsManualPreparation,
        RecordState::MdPrepared,
        RecordState::MdProcessed,
        RecordState::RevPrescreenExcluded,
        RecordState::RevPrescreenIncluded,
        RecordState::PdfNeedsManualRetrieval,
        RecordState::PdfImported,
        RecordState::PdfNotAvailable,
        RecordState::PdfNeedsManualPreparation,
        RecordState::PdfPrepared,
        RecordState::RevExcluded,
        RecordState::RevIncluded,
        RecordState::RevSynthesized,
    ];

    /// Terminal states: a repository whose records all sit here is complete
    pub const TERMINAL: [RecordState; 4] = [
        RecordState::RevPrescreenExcluded,
        RecordState::RevExcluded,
        RecordState::PdfNotAvailable,
        RecordState::RevSynthesized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::MdRetrieved => "md_retrieved",
            RecordState::MdImported => "md_imported",
            RecordState::MdNeedsManualPreparation => "md_needs_manual_preparation",
            RecordState::MdPrepared => "md_prepared",
            RecordState::MdProcessed => "md_processed",
            RecordState::RevPrescreenExcluded => "rev_prescreen_excluded",
            RecordState::RevPrescreenIncluded => "rev_prescreen_included",
            RecordState::PdfNeedsManualRetrieval => "pdf_needs_manual_retrieval",
            RecordState::PdfImported => "pdf_imported",
            RecordState::PdfNotAvailable => "pdf_not_available",
            RecordState::PdfNeedsManualPreparation => "pdf_needs_manual_preparation",
            RecordState::PdfPrepared => "pdf_prepared",
            RecordState::RevExcluded => "rev_excluded",
            RecordState::RevIncluded => "rev_included",
            RecordState::RevSynthesized => "rev_synthesized",
        }
    }

    /// Position in the lifecycle (siblings share an ordinal)
    pub fn ordinal(&self) -> u8 {
        match self {
            RecordState::MdRetrieved => 0,
            RecordState::MdImported => 1,
            RecordState::MdNeedsManualPreparation => 2,
            RecordState::MdPrepared => 3,
            RecordState::MdProcessed => 4,
            RecordState::RevPrescreenExcluded | RecordState::RevPrescreenIncluded => 5,
            RecordState::PdfNeedsManualRetrieval => 6,
            RecordState::PdfImported | RecordState::PdfNotAvailable => 7,
            RecordState::PdfNeedsManualPreparation => 8,
            RecordState::PdfPrepared => 9,
            RecordState::RevExcluded | RecordState::RevIncluded => 10,
            RecordState::RevSynthesized => 11,
        }
    }

    /// States at or beyond md_prepared (provenance coverage applies)
    pub fn is_post_md_prepared(&self) -> bool {
        !matches!(
            self,
            RecordState::MdRetrieved
                | RecordState::MdImported
                | RecordState::MdNeedsManualPreparation
        )
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RecordState::ALL
            .iter()
            .find(|state| state.as_str() == s.trim())
            .copied()
            .ok_or_else(|| Error::StatusFieldValue {
                id: String::new(),
                value: s.to_string(),
            })
    }
}

/// Operations that may change records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    Search,
    Load,
    Prep,
    PrepMan,
    Dedupe,
    Prescreen,
    PdfGet,
    PdfGetMan,
    PdfPrep,
    PdfPrepMan,
    Screen,
    Data,
    Format,
    Explore,
    Check,
}

impl ProcessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Search => "search",
            ProcessType::Load => "load",
            ProcessType::Prep => "prep",
            ProcessType::PrepMan => "prep_man",
            ProcessType::Dedupe => "dedupe",
            ProcessType::Prescreen => "prescreen",
            ProcessType::PdfGet => "pdf_get",
            ProcessType::PdfGetMan => "pdf_get_man",
            ProcessType::PdfPrep => "pdf_prep",
            ProcessType::PdfPrepMan => "pdf_prep_man",
            ProcessType::Screen => "screen",
            ProcessType::Data => "data",
            ProcessType::Format => "format",
            ProcessType::Explore => "explore",
            ProcessType::Check => "check",
        }
    }

    /// Non-processing triggers map every state onto itself
    pub fn is_non_processing(&self) -> bool {
        matches!(
            self,
            ProcessType::Format | ProcessType::Explore | ProcessType::Check
        )
    }

    /// Repository conditions of the operation
    ///
    /// Taken from the operation's transitions. `search` creates no record
    /// states of its own and only needs the search files to be the dirty ones.
    pub fn conditions(&self) -> &'static [Condition] {
        match self {
            ProcessType::Search => &[Condition::CleanRepoExceptSearch],
            _ => transitions_for(*self).next().map(|t| t.conditions).unwrap_or(&[]),
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-transition preconditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    CleanRepo,
    CleanRepoExceptMainRecords,
    CleanRepoExceptSearch,
    CleanRepoExceptPdfDir,
    CleanRepoExceptManuscript,
    CheckRecordsStatePrecondition,
}

impl Condition {
    /// Path fragments that may be dirty under this condition
    ///
    /// `None` for conditions that do not inspect the working tree.
    pub fn ignore_patterns(&self) -> Option<&'static [&'static str]> {
        match self {
            Condition::CleanRepo => Some(&[]),
            Condition::CleanRepoExceptMainRecords => Some(&[crate::paths::RECORDS_FILE]),
            Condition::CleanRepoExceptSearch => {
                Some(&[crate::paths::SEARCH_DIR_PATTERN, crate::paths::SETTINGS_FILE])
            }
            Condition::CleanRepoExceptPdfDir => Some(&[crate::paths::PDF_DIR_PATTERN]),
            Condition::CleanRepoExceptManuscript => {
                Some(&[crate::paths::PAPER_FILE, crate::paths::DATA_FILE])
            }
            Condition::CheckRecordsStatePrecondition => None,
        }
    }
}

/// One arc of the state graph
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub trigger: ProcessType,
    pub source: RecordState,
    pub dest: RecordState,
    pub conditions: &'static [Condition],
}

macro_rules! t {
    ($trigger:ident, $source:ident => $dest:ident, [$($condition:ident),*]) => {
        Transition {
            trigger: ProcessType::$trigger,
            source: RecordState::$source,
            dest: RecordState::$dest,
            conditions: &[$(Condition::$condition),*],
        }
    };
}

/// All processing transitions
pub const TRANSITIONS: &[Transition] = &[
    t!(Load, MdRetrieved => MdImported, [CleanRepoExceptSearch]),
    t!(Prep, MdImported => MdNeedsManualPreparation, [CleanRepo, CheckRecordsStatePrecondition]),
    t!(Prep, MdImported => MdPrepared, [CleanRepo, CheckRecordsStatePrecondition]),
    t!(PrepMan, MdNeedsManualPreparation => MdPrepared, [CleanRepoExceptMainRecords, CheckRecordsStatePrecondition]),
    t!(Dedupe, MdPrepared => MdProcessed, [CleanRepo, CheckRecordsStatePrecondition]),
    t!(Prescreen, MdProcessed => RevPrescreenExcluded, [CleanRepoExceptMainRecords, CheckRecordsStatePrecondition]),
    t!(Prescreen, MdProcessed => RevPrescreenIncluded, [CleanRepoExceptMainRecords, CheckRecordsStatePrecondition]),
    t!(PdfGet, RevPrescreenIncluded => PdfImported, [CleanRepoExceptPdfDir, CheckRecordsStatePrecondition]),
    t!(PdfGet, RevPrescreenIncluded => PdfNeedsManualRetrieval, [CleanRepoExceptPdfDir, CheckRecordsStatePrecondition]),
    t!(PdfGetMan, PdfNeedsManualRetrieval => PdfNotAvailable, [CleanRepoExceptPdfDir, CheckRecordsStatePrecondition]),
    t!(PdfGetMan, PdfNeedsManualRetrieval => PdfImported, [CleanRepoExceptPdfDir, CheckRecordsStatePrecondition]),
    t!(PdfPrep, PdfImported => PdfNeedsManualPreparation, [CleanRepo, CheckRecordsStatePrecondition]),
    t!(PdfPrep, PdfImported => PdfPrepared, [CleanRepo, CheckRecordsStatePrecondition]),
    t!(PdfPrepMan, PdfNeedsManualPreparation => PdfPrepared, [CleanRepoExceptPdfDir, CheckRecordsStatePrecondition]),
    t!(Screen, PdfPrepared => RevExcluded, [CleanRepo, CheckRecordsStatePrecondition]),
    t!(Screen, PdfPrepared => RevIncluded, [CleanRepo, CheckRecordsStatePrecondition]),
    t!(Data, RevIncluded => RevSynthesized, [CleanRepoExceptManuscript, CheckRecordsStatePrecondition]),
];

/// Transitions triggered by `process`
pub fn transitions_for(process: ProcessType) -> impl Iterator<Item = &'static Transition> {
    TRANSITIONS.iter().filter(move |t| t.trigger == process)
}

/// Source states of an operation
pub fn source_states(process: ProcessType) -> BTreeSet<RecordState> {
    if process.is_non_processing() {
        return RecordState::ALL.iter().copied().collect();
    }
    transitions_for(process).map(|t| t.source).collect()
}

/// Legal successor states when `process` runs on a record in `current`
pub fn successors(process: ProcessType, current: RecordState) -> Vec<RecordState> {
    if process.is_non_processing() {
        return vec![current];
    }
    transitions_for(process)
        .filter(|t| t.source == current)
        .map(|t| t.dest)
        .collect()
}

/// Decide whether `process` may move a record from `current` to `target`
pub fn is_legal(process: ProcessType, current: RecordState, target: RecordState) -> bool {
    successors(process, current).contains(&target)
}

/// States from which `state` is reachable by one or more forward transitions
///
/// Computed as a fixed point over the transition table: start with the
/// sources of every arc into `state`, then add the sources of every arc into
/// a member of the set, until nothing changes. `state` itself is excluded.
pub fn preceding_states(state: RecordState) -> BTreeSet<RecordState> {
    let mut preceding = BTreeSet::new();
    loop {
        let added: Vec<RecordState> = TRANSITIONS
            .iter()
            .filter(|t| t.dest == state || preceding.contains(&t.dest))
            .map(|t| t.source)
            .filter(|s| *s != state && !preceding.contains(s))
            .collect();
        if added.is_empty() {
            break;
        }
        preceding.extend(added);
    }
    preceding
}

/// States that must be absent from the repository before `process` runs
pub fn required_absent(process: ProcessType) -> BTreeSet<RecordState> {
    if process.is_non_processing() || process == ProcessType::Search {
        return BTreeSet::new();
    }
    let sources = source_states(process);
    sources
        .iter()
        .flat_map(|s| preceding_states(*s))
        .filter(|s| !sources.contains(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_of_an_operation_share_their_conditions() {
        for transition in TRANSITIONS {
            assert_eq!(transition.trigger.conditions(), transition.conditions);
        }
        assert_eq!(
            ProcessType::Prep.conditions(),
            &[Condition::CleanRepo, Condition::CheckRecordsStatePrecondition]
        );
        assert_eq!(ProcessType::Search.conditions(), &[Condition::CleanRepoExceptSearch]);
        assert!(ProcessType::Check.conditions().is_empty());
    }

    #[test]
    fn parses_every_state() {
        for state in RecordState::ALL {
            assert_eq!(state.as_str().parse::<RecordState>().unwrap(), state);
        }
        assert!("md_unknown".parse::<RecordState>().is_err());
    }

    #[test]
    fn preceding_of_md_prepared() {
        let preceding = preceding_states(RecordState::MdPrepared);
        let expected: BTreeSet<_> = [
            RecordState::MdRetrieved,
            RecordState::MdImported,
            RecordState::MdNeedsManualPreparation,
        ]
        .into_iter()
        .collect();
        assert_eq!(preceding, expected);
    }

    #[test]
    fn preceding_of_first_state_is_empty() {
        assert!(preceding_states(RecordState::MdRetrieved).is_empty());
    }

    #[test]
    fn preceding_excludes_siblings() {
        let preceding = preceding_states(RecordState::PdfPrepared);
        assert!(preceding.contains(&RecordState::PdfImported));
        assert!(preceding.contains(&RecordState::PdfNeedsManualRetrieval));
        assert!(!preceding.contains(&RecordState::RevPrescreenExcluded));
        assert!(!preceding.contains(&RecordState::PdfPrepared));
    }

    #[test]
    fn dedupe_requires_absence_of_imported() {
        let absent = required_absent(ProcessType::Dedupe);
        assert!(absent.contains(&RecordState::MdImported));
        assert!(!absent.contains(&RecordState::MdPrepared));
    }

    #[test]
    fn legal_and_illegal_transitions() {
        assert!(is_legal(ProcessType::Prep, RecordState::MdImported, RecordState::MdPrepared));
        assert!(!is_legal(ProcessType::Prep, RecordState::MdImported, RecordState::MdProcessed));
        assert_eq!(
            successors(ProcessType::Format, RecordState::RevIncluded),
            vec![RecordState::RevIncluded]
        );
    }

    #[test]
    fn every_state_is_reachable() {
        for state in RecordState::ALL {
            if state == RecordState::MdRetrieved {
                continue;
            }
            assert!(
                TRANSITIONS.iter().any(|t| t.dest == state),
                "{} has no incoming transition",
                state
            );
        }
    }
}
