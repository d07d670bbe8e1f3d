//! Preparation engine
//!
//! Normalizes `md_imported` records and enriches them from metadata
//! providers until their identifying fields are complete and consistent,
//! or marks them for manual preparation.
//!
//! # Architecture
//! - **Rounds**: each round has a similarity threshold and an endpoint list
//!   (`prep.prep_rounds`); later rounds accept weaker provider matches.
//! - **Working copy**: endpoints operate on a copy of the record. Changes are
//!   kept when an endpoint always applies (exclusions, identifier checks,
//!   status updates) or when the copy reaches `md_prepared`.
//! - **Workers**: records of a round are prepared concurrently; report lines
//!   travel back with each record and are ordered by ID in the report.

pub mod exclusions;
pub mod format;
pub mod lexicon;
pub mod man;
pub mod metadata;
pub mod record_type;

use crate::clients::Providers;
use crate::commit::CommitRequest;
use crate::dataset::Records;
use crate::local_index::LocalIndex;
use crate::review_manager::ReviewManager;
use colrev_common::paths::RECORDS_FILE;
use colrev_common::record::change_score;
use colrev_common::settings::{PrepRound, PrepScript, PrepSettings};
use colrev_common::{Error, ProcessType, Record, RecordState, Result};
use futures::stream::{self, StreamExt};
use metadata::ProviderFailure;
use tracing::{debug, info, warn};

/// Change scores above this are flagged for review
pub const CHANGE_SCORE_THRESHOLD: f64 = 0.1;

/// Everything an endpoint may consult
pub struct PrepContext<'a> {
    pub providers: &'a Providers,
    pub local_index: Option<&'a LocalIndex>,
    pub settings: &'a PrepSettings,
    /// Snapshot of all records (crossref resolution)
    pub records: &'a Records,
}

/// A record after one round, with its report lines
#[derive(Debug, Clone)]
pub struct PrepOutcome {
    pub record: Record,
    pub lines: Vec<String>,
    pub change_score: f64,
}

/// States the engine still works on
pub fn status_to_prepare(status: RecordState) -> bool {
    matches!(
        status,
        RecordState::MdImported | RecordState::MdNeedsManualPreparation
    )
}

/// Endpoints whose changes are kept even if the record is not prepared
fn always_applies(script: &PrepScript) -> bool {
    matches!(
        script,
        PrepScript::ExcludeNonLatinAlphabets
            | PrepScript::ExcludeLanguages { .. }
            | PrepScript::ExcludeCollections
            | PrepScript::RemoveUrlsWith500Errors
            | PrepScript::RemoveBrokenIds
            | PrepScript::GlobalIdsConsistencyCheck
            | PrepScript::PrepCurated
            | PrepScript::GetYearFromVolIssJourCrossref
            | PrepScript::GetRecordFromLocalIndex
            | PrepScript::CorrectRecordtype
            | PrepScript::UpdateMetadataStatus
    )
}

fn is_finished(record: &Record) -> bool {
    matches!(
        record.status,
        RecordState::MdPrepared | RecordState::RevPrescreenExcluded
    )
}

/// Run one endpoint on the working copy
async fn run_endpoint(
    ctx: &PrepContext<'_>,
    script: &PrepScript,
    record: &mut Record,
    similarity: f64,
) -> std::result::Result<Vec<String>, ProviderFailure> {
    let providers = ctx.providers;
    match script {
        PrepScript::ExcludeNonLatinAlphabets => Ok(exclusions::exclude_non_latin_alphabets(record)),
        PrepScript::ExcludeLanguages {
            languages_to_include,
        } => Ok(exclusions::exclude_languages(record, languages_to_include)),
        PrepScript::ExcludeCollections => Ok(exclusions::exclude_collections(record)),
        PrepScript::RemoveUrlsWith500Errors => metadata::remove_urls_with_500_errors(providers, record).await,
        PrepScript::RemoveBrokenIds => Ok(metadata::remove_broken_ids(record)),
        PrepScript::GlobalIdsConsistencyCheck => {
            metadata::global_ids_consistency_check(providers, record).await
        }
        PrepScript::PrepCurated => {
            format::prep_curated(record);
            Ok(Vec::new())
        }
        PrepScript::Format => Ok(format::format(record)),
        PrepScript::ResolveCrossrefs => {
            format::resolve_crossrefs(record, ctx.records);
            Ok(Vec::new())
        }
        PrepScript::GetDoiFromUrls => metadata::get_doi_from_urls(providers, record, similarity).await,
        PrepScript::GetMasterdataFromDoi => {
            metadata::get_masterdata_from_doi(providers, record, similarity).await
        }
        PrepScript::GetMasterdataFromCrossref => {
            metadata::get_masterdata_from_crossref(providers, record, similarity).await
        }
        PrepScript::GetMasterdataFromDblp => {
            metadata::get_masterdata_from_dblp(providers, record, similarity).await
        }
        PrepScript::GetMasterdataFromSemanticScholar => {
            metadata::get_masterdata_from_semantic_scholar(providers, record, similarity).await
        }
        PrepScript::GetMasterdataFromOpenLibrary => {
            metadata::get_masterdata_from_open_library(providers, record).await
        }
        PrepScript::GetYearFromVolIssJourCrossref => {
            metadata::get_year_from_vol_iss_jour_crossref(providers, record).await
        }
        PrepScript::GetRecordFromLocalIndex => {
            metadata::get_record_from_local_index(ctx.local_index, record).await
        }
        PrepScript::RemoveNicknames => {
            format::remove_nicknames(record);
            Ok(Vec::new())
        }
        PrepScript::FormatMinor => {
            format::format_minor(record);
            Ok(Vec::new())
        }
        PrepScript::DropFields => Ok(format::drop_fields(record, &ctx.settings.fields_to_keep)),
        PrepScript::RemoveRedundantFields => {
            format::remove_redundant_fields(record);
            Ok(Vec::new())
        }
        PrepScript::CorrectRecordtype => Ok(record_type::correct_recordtype(record, similarity)),
        PrepScript::UpdateMetadataStatus => {
            let status = record.update_masterdata_provenance();
            Ok(vec![format!("Set status to {}", status)])
        }
    }
}

/// Prepare one record in one round
///
/// # Arguments
/// * `record` - Record in `md_imported` or `md_needs_manual_preparation`
/// * `round` - Endpoints and similarity threshold
/// * `last_round` - Whether unprepared records get their provenance hints now
///
/// Provider failures never escape: network trouble is reported and skipped,
/// a malformed response demotes the record.
pub async fn prepare_record(
    ctx: &PrepContext<'_>,
    record: Record,
    round: &PrepRound,
    last_round: bool,
) -> PrepOutcome {
    if !status_to_prepare(record.status) {
        return PrepOutcome {
            record,
            lines: Vec::new(),
            change_score: 0.0,
        };
    }
    let before = record.clone();
    let mut record = record;
    let mut working = record.clone();
    let mut lines = Vec::new();
    let mut malformed = false;

    for script in &round.scripts {
        match run_endpoint(ctx, script, &mut working, round.similarity).await {
            Ok(endpoint_lines) => lines.extend(endpoint_lines),
            Err(failure) if failure.malformed => {
                warn!(id = %working.id, service = failure.service, error = %failure.message, "Malformed provider response");
                lines.push(format!("Malformed response from {}", failure.service));
                malformed = true;
            }
            Err(failure) => {
                debug!(id = %working.id, service = failure.service, error = %failure.message, "Provider unavailable, skipping");
                lines.push(format!("Skipped {} ({})", failure.service, failure.message));
            }
        }
        if always_applies(script) {
            record = working.clone();
        }
        if is_finished(&working) {
            break;
        }
    }

    if working.status == RecordState::MdPrepared {
        record = working;
    } else if working.status == RecordState::RevPrescreenExcluded {
        record = working;
    } else if last_round && status_to_prepare(record.status) {
        record = working;
        let status = record.update_masterdata_provenance();
        debug!(id = %record.id, status = %status, "Preparation finished without match");
    }
    if malformed && !is_finished(&record) {
        record.status = RecordState::MdNeedsManualPreparation;
    }

    let score = change_score(&before, &record);
    if score > CHANGE_SCORE_THRESHOLD {
        info!(id = %record.id, change_score = score, "Substantial change, please check");
        lines.push(format!("Change score {:.2}", score));
    }
    PrepOutcome {
        record,
        lines,
        change_score: score,
    }
}

/// Prepare all pending records of one round on the worker pool
pub async fn prepare_round(
    ctx: &PrepContext<'_>,
    pending: Vec<Record>,
    round: &PrepRound,
    last_round: bool,
    workers: usize,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Vec<PrepOutcome>> {
    let mut stream = stream::iter(pending)
        .map(|record| prepare_record(ctx, record, round, last_round))
        .buffer_unordered(workers.max(1));
    let mut outcomes = Vec::new();
    while let Some(outcome) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

// ============================================================================
// Operation
// ============================================================================

/// Options of `colrev prep`
#[derive(Debug, Clone, Default)]
pub struct PrepOptions {
    /// Keep the IDs assigned at load time
    pub keep_ids: bool,
    /// Restore these records to their imported version first
    pub reset_records: Vec<String>,
    /// Only regenerate IDs
    pub reset_ids: bool,
}

/// Outcome of a `prep` run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepSummary {
    pub prepared: usize,
    pub needs_manual_preparation: usize,
    pub excluded: usize,
    pub commit: Option<String>,
}

/// Restore records to the version they had right after import
///
/// Walks the history of the records file (newest first) and takes the
/// latest `md_imported` version sharing an origin with the current record.
/// ID and origins stay as they are.
pub fn reset_records(review: &ReviewManager, records: &mut Records, ids: &[String]) -> Result<Vec<String>> {
    let history = review.dataset.records_history(&review.git, None)?;
    let mut reset = Vec::new();
    for id in ids {
        let Some(current) = records.get(id) else {
            warn!(id = %id, "Record to reset not found");
            continue;
        };
        let imported = history.iter().find_map(|(_, version)| {
            version.values().find(|r| {
                r.status == RecordState::MdImported
                    && r.origin.iter().any(|o| current.origin.contains(o))
            })
        });
        let Some(imported) = imported else {
            warn!(id = %id, "No imported version in history");
            continue;
        };
        let mut restored = imported.clone();
        restored.id = current.id.clone();
        restored.origin = current.origin.clone();
        restored.status = RecordState::MdImported;
        records.insert(id.clone(), restored);
        reset.push(id.clone());
    }
    Ok(reset)
}

fn args_of(options: &PrepOptions) -> String {
    let mut args = Vec::new();
    if options.keep_ids {
        args.push("-k".to_string());
    }
    if !options.reset_records.is_empty() {
        args.push(format!("--reset_records {}", options.reset_records.join(",")));
    }
    if options.reset_ids {
        args.push("--reset_ids".to_string());
    }
    args.join(" ")
}

/// `colrev prep`
pub async fn run(review: &mut ReviewManager, options: PrepOptions) -> Result<PrepSummary> {
    review.check_precondition(ProcessType::Prep)?;
    let mut records = review.load_records()?;

    if options.reset_ids {
        let renames = review.dataset.set_ids(&mut records, None, review.settings.project.id_pattern)?;
        for (old, new) in &renames {
            review.report.record(new, format!("Renamed from {}", old));
        }
        review.save_records(&records)?;
        let commit = review.create_commit(
            CommitRequest::new(ProcessType::Prep, "Reset IDs")
                .args(args_of(&options))
                .path(RECORDS_FILE),
        )?;
        return Ok(PrepSummary {
            commit,
            ..PrepSummary::default()
        });
    }

    if !options.reset_records.is_empty() {
        let reset = reset_records(review, &mut records, &options.reset_records)?;
        for id in &reset {
            review.report.record(id, "Reset to imported version");
        }
    }

    let providers = Providers::new(&review.providers, Some(review.env.user.email.clone()))?;
    let local_index = match review.local_index().await {
        Ok(index) => Some(index),
        Err(e) => {
            warn!(error = %e, "Local index unavailable");
            None
        }
    };

    let rounds = review.settings.prep.prep_rounds.clone();
    let prep_settings = review.settings.prep.clone();
    let mut touched: Vec<String> = Vec::new();
    for (i, round) in rounds.iter().enumerate() {
        let last_round = i + 1 == rounds.len();
        let pending: Vec<Record> = records
            .values()
            .filter(|r| status_to_prepare(r.status))
            .cloned()
            .collect();
        if pending.is_empty() {
            break;
        }
        info!(round = %round.name, similarity = round.similarity, records = pending.len(), "Preparation round");
        let outcomes = {
            let ctx = PrepContext {
                providers: &providers,
                local_index: local_index.as_ref(),
                settings: &prep_settings,
                records: &records,
            };
            prepare_round(&ctx, pending, round, last_round, review.workers, &review.cancel).await?
        };
        for outcome in outcomes {
            let id = outcome.record.id.clone();
            review.report.extend_record(&id, outcome.lines);
            if !touched.contains(&id) {
                touched.push(id.clone());
            }
            records.insert(id, outcome.record);
        }
        review.check_cancelled()?;
    }

    if !options.keep_ids {
        let renames = review
            .dataset
            .set_ids(&mut records, Some(touched.as_slice()), review.settings.project.id_pattern)?;
        for (old, new) in &renames {
            review.report.record(new, format!("Renamed from {}", old));
        }
    }

    let mut summary = PrepSummary::default();
    for record in records.values() {
        match record.status {
            RecordState::MdPrepared => summary.prepared += 1,
            RecordState::MdNeedsManualPreparation => summary.needs_manual_preparation += 1,
            RecordState::RevPrescreenExcluded => summary.excluded += 1,
            _ => {}
        }
    }
    review.save_records(&records)?;
    summary.commit = review.create_commit(
        CommitRequest::new(ProcessType::Prep, "Prepare records")
            .args(args_of(&options))
            .path(RECORDS_FILE),
    )?;
    info!(
        prepared = summary.prepared,
        manual = summary.needs_manual_preparation,
        excluded = summary.excluded,
        "Preparation complete"
    );
    Ok(summary)
}
