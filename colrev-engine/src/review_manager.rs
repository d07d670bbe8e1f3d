//! Review manager: one open review repository
//!
//! Bundles the settings, the dataset store, the git repository and the
//! resolved environment, and owns the commit discipline: status snapshot,
//! staging of declared paths, certification and the message layout.

use crate::clients::ProviderUrls;
use crate::commit::{self, Certification, CommitRequest};
use crate::dataset::{self, Dataset, Records};
use crate::git_repo::GitRepo;
use crate::local_index::LocalIndex;
use crate::process;
use crate::report::ReportLog;
use colrev_common::config::{EnvConfig, UserIdentity};
use colrev_common::paths::{RECORDS_FILE, REPORT_FILE, SETTINGS_FILE, STATUS_FILE};
use colrev_common::settings::Settings;
use colrev_common::state::ProcessType;
use colrev_common::status::StatusStats;
use colrev_common::{Error, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ReviewManager {
    pub path: PathBuf,
    pub settings: Settings,
    pub dataset: Dataset,
    pub git: GitRepo,
    pub env: EnvConfig,
    pub report: ReportLog,
    pub providers: ProviderUrls,
    pub cancel: CancellationToken,
    /// Size of the per-record worker pool
    pub workers: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ReviewManager {
    /// Open the review at `path`
    pub fn open(path: &Path, env: EnvConfig) -> Result<Self> {
        let settings_path = path.join(SETTINGS_FILE);
        if !settings_path.exists() {
            return Err(Error::Settings(format!(
                "{} not found (not a colrev repository: {})",
                SETTINGS_FILE,
                path.display()
            )));
        }
        let settings = Settings::load(&settings_path)?;
        let git = GitRepo::open(path)?;
        Ok(Self::from_parts(path, settings, git, env))
    }

    pub fn from_parts(path: &Path, settings: Settings, git: GitRepo, env: EnvConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            settings,
            dataset: Dataset::new(path),
            git,
            env,
            report: ReportLog::new(),
            providers: ProviderUrls::default(),
            cancel: CancellationToken::new(),
            workers: default_workers(),
        }
    }

    pub fn with_providers(mut self, providers: ProviderUrls) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings_path(&self) -> PathBuf {
        self.path.join(SETTINGS_FILE)
    }

    /// Persist and stage the settings
    pub fn save_settings(&self) -> Result<()> {
        self.settings.save(&self.settings_path())?;
        self.git.add(SETTINGS_FILE)
    }

    // ========================================================================
    // Gate and records
    // ========================================================================

    pub fn check_precondition(&self, process: ProcessType) -> Result<()> {
        process::check_precondition(&self.git, &self.dataset, &self.settings, process)
    }

    /// Abort between records once Ctrl-C was pressed
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    pub fn load_records(&self) -> Result<Records> {
        self.dataset.load_all()
    }

    /// Write and stage the records file
    pub fn save_records(&self, records: &Records) -> Result<()> {
        self.dataset.save_all(records)?;
        self.git.add(RECORDS_FILE)
    }

    pub async fn local_index(&self) -> Result<LocalIndex> {
        self.env.ensure_directories()?;
        LocalIndex::open(&self.env.local_index_path()).await
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Records in the search source files (imported or not)
    fn retrieved_in_sources(&self) -> usize {
        self.settings
            .sources
            .iter()
            .map(|s| self.path.join(&s.filename))
            .filter(|p| p.extension().is_some_and(|e| e == "bib") && p.exists())
            .map(|p| dataset::count_source_records(&p))
            .sum()
    }

    pub fn status_stats(&self) -> Result<StatusStats> {
        let summaries = self.dataset.record_summaries()?;
        let criteria: Vec<String> = self.settings.screen.criteria.keys().cloned().collect();
        Ok(StatusStats::compute(
            &summaries,
            self.retrieved_in_sources(),
            &criteria,
            self.settings.is_curated_masterdata(),
        ))
    }

    /// Rewrite `status.toml`
    pub fn write_status(&self) -> Result<StatusStats> {
        let stats = self.status_stats()?;
        std::fs::write(self.path.join(STATUS_FILE), toml::to_string(&stats)?)?;
        Ok(stats)
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Stage the declared paths and commit
    ///
    /// Returns `None` when nothing changed. Fails before committing when
    /// tracked files outside the declared paths were modified.
    pub fn create_commit(&mut self, request: CommitRequest) -> Result<Option<String>> {
        self.report.append_to(&self.path.join(REPORT_FILE))?;

        let stats = self.write_status()?;
        for path in &request.paths {
            self.git.add(path)?;
        }

        let declared: Vec<&str> = request.paths.iter().map(String::as_str).collect();
        let stray: Vec<String> = self
            .git
            .changes()?
            .into_iter()
            .filter(|c| c.unstaged && !declared.iter().any(|d| c.path == *d || c.path.starts_with(&format!("{}/", d.trim_end_matches('/')))))
            .filter(|c| c.path != STATUS_FILE && c.path != REPORT_FILE)
            .map(|c| c.path)
            .collect();
        if !stray.is_empty() {
            return Err(Error::UnstagedChanges(stray));
        }

        let tracked_status = self.git.file_at("HEAD", STATUS_FILE).ok().flatten().is_some();
        if request.process != ProcessType::Search || tracked_status {
            self.git.add(STATUS_FILE)?;
        }
        if !self.git.has_staged_changes()? && self.git.head_id()?.is_some() {
            debug!(process = %request.process, "Nothing to commit");
            self.report.clear();
            return Ok(None);
        }

        let certification = Certification {
            traceability: true,
            consistency: commit::certify_consistency(&self.dataset)?,
            completeness: stats.completeness_condition,
        };
        let message = commit::compose_message(
            &request,
            &self.settings.section_toml(request.process),
            certification,
            &stats,
            &self.report,
        );
        let author = if request.manual_author {
            self.env.user.clone()
        } else {
            UserIdentity::bot()
        };
        let commit_id = self.git.commit(&message, &author, &self.env.user)?;
        info!(process = %request.process, commit = %commit_id, "{}", request.summary);
        self.report.clear();
        Ok(Some(commit_id))
    }
}
