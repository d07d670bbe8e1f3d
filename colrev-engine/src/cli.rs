//! Command-line surface of the `colrev` binary
//!
//! Every subcommand opens the review in the working directory, runs one
//! operation and returns the text to print. Exit codes are derived from the
//! error in `main`.

use crate::clients::GrobidClient;
use crate::dedupe::{self, DedupeOptions};
use crate::ops::data::DataOptions;
use crate::ops::init::InitOptions;
use crate::ops::load::LoadOptions;
use crate::ops::prescreen::{PrescreenOptions, TableFormat};
use crate::ops::screen::ScreenOptions;
use crate::ops::validate::ValidationScope;
use crate::ops;
use crate::pdf::get::PdfGetOptions;
use crate::pdf::prep::PdfPrepOptions;
use crate::pdf::prep_man::PdfPrepManOptions;
use crate::prep::{self, PrepOptions};
use crate::review_manager::ReviewManager;
use clap::{Parser, Subcommand};
use colrev_common::config::EnvConfig;
use colrev_common::settings::ReviewType;
use colrev_common::Result;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Command-line arguments for colrev
#[derive(Parser, Debug)]
#[command(name = "colrev")]
#[command(about = "Collaborative literature reviews on top of git")]
#[command(version)]
pub struct Cli {
    /// Environment directory (local index, cover page sidecars)
    #[arg(long = "env_dir", global = true, env = "COLREV_ENV_DIR")]
    pub env_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "snake_case")]
pub enum Command {
    /// Create a review repository in the working directory
    Init {
        #[arg(long = "type", default_value = "literature_review")]
        review_type: ReviewType,
        #[arg(long)]
        title: Option<String>,
        /// Remote registered as origin
        #[arg(long)]
        url: Option<String>,
    },
    /// Show the review state and the next operation
    Status {
        /// Per-commit record counts
        #[arg(short, long)]
        analytics: bool,
    },
    /// Run the feed-based searches
    Search {
        /// List the search sources instead
        #[arg(short, long)]
        view: bool,
    },
    /// Import search results into the records file
    Load {
        #[arg(short, long = "keep_ids")]
        keep_ids: bool,
        /// One commit for all new sources
        #[arg(short, long)]
        combine: bool,
    },
    /// Prepare metadata
    Prep {
        #[arg(short, long = "keep_ids")]
        keep_ids: bool,
        /// Comma-separated IDs to restore to their imported version
        #[arg(long = "reset_records", value_delimiter = ',')]
        reset_records: Vec<String>,
        #[arg(long = "reset_ids")]
        reset_ids: bool,
    },
    /// Summarize records that need manual preparation
    PrepMan,
    /// Merge duplicates
    Dedupe {
        /// Apply corrections from the validation spreadsheets
        #[arg(long = "fix_errors")]
        fix_errors: bool,
        /// Show the settings and training data
        #[arg(short, long)]
        view: bool,
    },
    /// Screen titles and abstracts
    Prescreen {
        #[arg(long = "include_all")]
        include_all: bool,
        /// Write the screening table (csv or xlsx)
        #[arg(long)]
        export: Option<TableFormat>,
        /// Apply decisions from a screening table
        #[arg(long)]
        import: Option<PathBuf>,
        /// Write N balanced ID lists
        #[arg(long = "create_split")]
        create_split: Option<usize>,
        /// Only these IDs (file or comma-separated list)
        #[arg(long)]
        split: Option<String>,
    },
    /// Screen full texts against the criteria
    Screen {
        #[arg(long = "include_all")]
        include_all: bool,
        /// `name,explanation`
        #[arg(long = "add_criterion")]
        add_criterion: Option<String>,
        #[arg(long = "delete_criterion")]
        delete_criterion: Option<String>,
        #[arg(long)]
        export: Option<TableFormat>,
        #[arg(long)]
        import: Option<PathBuf>,
        #[arg(long = "create_split")]
        create_split: Option<usize>,
        #[arg(long)]
        split: Option<String>,
    },
    /// Retrieve PDFs
    PdfGet {
        /// Copy linked PDFs into the repository
        #[arg(short, long)]
        copy: bool,
        /// Rename PDFs to their record ID
        #[arg(short, long)]
        rename: bool,
        #[arg(long = "relink_files")]
        relink_files: bool,
    },
    /// Manual PDF retrieval
    PdfGetMan {
        /// Only write the list of missing PDFs
        #[arg(short, long)]
        export: bool,
    },
    /// Validate and prepare PDFs
    PdfPrep {
        #[arg(long = "update_colrev_pdf_ids")]
        update_colrev_pdf_ids: bool,
        #[arg(long)]
        reprocess: bool,
    },
    /// Manual PDF preparation
    PdfPrepMan {
        /// Remove the first page of the PDF of this record
        #[arg(long = "delete_first_page", visible_alias = "dfp", value_name = "ID")]
        delete_first_page: Option<String>,
        /// Write the records that need manual preparation to a table
        #[arg(long)]
        extract: bool,
        /// Apply the decisions of the extracted table
        #[arg(long)]
        apply: bool,
    },
    /// Synthesize included records
    Data {
        /// Write the sample profile
        #[arg(long)]
        profile: bool,
        /// structured or manuscript
        #[arg(long = "add_endpoint")]
        add_endpoint: Option<String>,
    },
    /// Review the changes of a commit
    Validate {
        #[arg(long, default_value = "all")]
        scope: ValidationScope,
        /// Commit to validate (default HEAD)
        #[arg(long)]
        commit: Option<String>,
    },
    /// History of one record
    Trace {
        #[arg(long)]
        id: String,
    },
    /// Render the manuscript with pandoc
    Paper,
    /// Pull from origin and refresh curated records
    Pull,
    /// Push to origin
    Push,
    /// Clone a review
    Clone {
        url: String,
        /// Target directory (default: repository name)
        target: Option<PathBuf>,
    },
    /// Send a PDF or BibTeX file to a review
    Distribute {
        #[arg(short, long)]
        path: PathBuf,
        /// Target review (default: working directory)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },
}

fn commit_line(out: &mut String, commit: &Option<String>) {
    match commit {
        Some(id) => {
            let _ = writeln!(out, "Created commit {}", &id[..id.len().min(8)]);
        }
        None => {
            let _ = writeln!(out, "No changes to commit");
        }
    }
}

fn clone_target(url: &str) -> PathBuf {
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("review")
        .trim_end_matches(".git");
    PathBuf::from(if name.is_empty() { "review" } else { name })
}

fn open(cwd: &Path, cli: &Cli, cancel: &CancellationToken) -> Result<ReviewManager> {
    let env = EnvConfig::resolve(cli.env_dir.as_deref(), Some(cwd))?;
    env.ensure_directories()?;
    Ok(ReviewManager::open(cwd, env)?.with_cancellation(cancel.clone()))
}

/// Run one command in `cwd` and return what to print
pub async fn execute(cli: &Cli, cwd: &Path, cancel: CancellationToken) -> Result<String> {
    let mut out = String::new();
    match &cli.command {
        Command::Init { review_type, title, url } => {
            let env = EnvConfig::resolve(cli.env_dir.as_deref(), Some(cwd))?;
            env.ensure_directories()?;
            let options = InitOptions {
                title: title.clone(),
                review_type: *review_type,
                url: url.clone(),
            };
            ops::init::run(cwd, env, options)?;
            let _ = writeln!(out, "Initialized review in {}", cwd.display());
        }
        Command::Clone { url, target } => {
            let target = cwd.join(target.clone().unwrap_or_else(|| clone_target(url)));
            let env = EnvConfig::resolve(cli.env_dir.as_deref(), None)?;
            ops::sync::clone(url, &target, env)?;
            let _ = writeln!(out, "Cloned {} into {}", url, target.display());
        }
        Command::Distribute { path, target } => {
            let target = target.clone().map_or_else(|| cwd.to_path_buf(), |t| cwd.join(t));
            let grobid = GrobidClient::with_base_url(&crate::clients::ProviderUrls::default().grobid)?;
            let summary = ops::distribute::run(&cwd.join(path), &target, Some(&grobid)).await?;
            let _ = writeln!(
                out,
                "Added {} record(s) to {}",
                summary.added,
                summary.bib_file.display()
            );
            if let Some(pdf) = summary.pdf {
                let _ = writeln!(out, "Copied PDF to {}", pdf.display());
            }
        }
        command => {
            let mut review = open(cwd, cli, &cancel)?;
            run_in_review(&mut review, command, &mut out).await?;
        }
    }
    Ok(out)
}

async fn run_in_review(review: &mut ReviewManager, command: &Command, out: &mut String) -> Result<()> {
    match command {
        Command::Status { analytics } => {
            if *analytics {
                out.push_str(&ops::status::format_analytics(&ops::status::analytics(review)?));
            } else {
                out.push_str(&ops::status::run(review)?);
            }
        }
        Command::Search { view } => {
            if *view {
                out.push_str(&ops::search::list_sources(&review.settings));
            } else {
                let summary = ops::search::run(review).await?;
                let _ = writeln!(out, "Search: {} added, {} changed", summary.added, summary.changed);
                commit_line(out, &summary.commit);
            }
        }
        Command::Load { keep_ids, combine } => {
            let summary = ops::load::run(
                review,
                LoadOptions {
                    keep_ids: *keep_ids,
                    combine: *combine,
                },
            )?;
            for source in &summary.new_sources {
                let _ = writeln!(out, "New source: {}", source);
            }
            let _ = writeln!(out, "Loaded {} record(s), {} skipped", summary.imported, summary.skipped);
            let _ = writeln!(out, "{} commit(s) created", summary.commits.len());
        }
        Command::Prep { keep_ids, reset_records, reset_ids } => {
            let summary = prep::run(
                review,
                PrepOptions {
                    keep_ids: *keep_ids,
                    reset_records: reset_records.clone(),
                    reset_ids: *reset_ids,
                },
            )
            .await?;
            let _ = writeln!(
                out,
                "Prepared {}, needs manual preparation {}, excluded {}",
                summary.prepared, summary.needs_manual_preparation, summary.excluded
            );
            commit_line(out, &summary.commit);
        }
        Command::PrepMan => {
            let stats = prep::man::run(review)?;
            let _ = writeln!(out, "Records needing manual preparation: {}", stats.records);
            for (entry_type, count) in &stats.entry_types {
                let _ = writeln!(out, "  {:<20} {}", entry_type, count);
            }
            for (hint, count) in &stats.hints {
                let _ = writeln!(out, "  {:<40} {}", hint, count);
            }
        }
        Command::Dedupe { fix_errors, view } => {
            if *view {
                out.push_str(&dedupe::view_info(review)?);
                return Ok(());
            }
            let summary = dedupe::run(
                review,
                DedupeOptions {
                    fix_errors: *fix_errors,
                    view: false,
                },
            )?;
            let _ = writeln!(
                out,
                "Merged {}, non-duplicates {}, potential duplicates {}",
                summary.merged, summary.non_duplicates, summary.potential_duplicates
            );
            commit_line(out, &summary.commit);
        }
        Command::Prescreen { include_all, export, import, create_split, split } => {
            let summary = ops::prescreen::run(
                review,
                PrescreenOptions {
                    include_all: *include_all,
                    export: *export,
                    import: import.clone(),
                    create_split: *create_split,
                    split: split.clone(),
                },
            )?;
            decisions(out, summary.included, summary.excluded, &summary.exported, &summary.splits);
            commit_line(out, &summary.commit);
        }
        Command::Screen {
            include_all,
            add_criterion,
            delete_criterion,
            export,
            import,
            create_split,
            split,
        } => {
            let summary = ops::screen::run(
                review,
                ScreenOptions {
                    include_all: *include_all,
                    add_criterion: add_criterion.clone(),
                    delete_criterion: delete_criterion.clone(),
                    export: *export,
                    import: import.clone(),
                    create_split: *create_split,
                    split: split.clone(),
                },
            )?;
            decisions(out, summary.included, summary.excluded, &summary.exported, &summary.splits);
            commit_line(out, &summary.commit);
        }
        Command::PdfGet { copy, rename, relink_files } => {
            let summary = crate::pdf::get::run(
                review,
                PdfGetOptions {
                    copy_to_repo: *copy,
                    rename: *rename,
                    relink_files: *relink_files,
                },
            )
            .await?;
            let _ = writeln!(
                out,
                "Retrieved {}, needs manual retrieval {}",
                summary.retrieved, summary.needs_manual_retrieval
            );
            if !summary.maintained.is_empty() {
                let _ = writeln!(out, "Updated links: {}", summary.maintained.join(", "));
            }
            commit_line(out, &summary.commit);
        }
        Command::PdfGetMan { export } => {
            let summary = crate::pdf::get_man::run(review, *export)?;
            let _ = writeln!(
                out,
                "Exported {}, linked {}, not available {}, still missing {}",
                summary.exported, summary.linked, summary.not_available, summary.still_missing
            );
            commit_line(out, &summary.commit);
        }
        Command::PdfPrep { update_colrev_pdf_ids, reprocess } => {
            let summary = crate::pdf::prep::run(
                review,
                PdfPrepOptions {
                    update_colrev_pdf_ids: *update_colrev_pdf_ids,
                    reprocess: *reprocess,
                },
            )
            .await?;
            let _ = writeln!(
                out,
                "Prepared {}, needs manual preparation {}",
                summary.prepared, summary.needs_manual_preparation
            );
            commit_line(out, &summary.commit);
        }
        Command::PdfPrepMan { delete_first_page, extract, apply } => {
            let summary = crate::pdf::prep_man::run(
                review,
                PdfPrepManOptions {
                    delete_first_page: delete_first_page.clone(),
                    extract: *extract,
                    apply: *apply,
                },
            )
            .await?;
            for (hint, count) in &summary.hints {
                let _ = writeln!(out, "  {:<40} {}", hint, count);
            }
            if summary.extracted > 0 {
                let _ = writeln!(out, "Extracted {} record(s)", summary.extracted);
            }
            if !summary.prepared.is_empty() {
                let _ = writeln!(out, "Prepared: {}", summary.prepared.join(", "));
            }
            commit_line(out, &summary.commit);
        }
        Command::Data { profile, add_endpoint } => {
            let summary = ops::data::run(
                review,
                DataOptions {
                    profile: *profile,
                    add_endpoint: add_endpoint.clone(),
                },
            )?;
            if let Some(path) = &summary.profile {
                let _ = writeln!(out, "Sample profile: {}", path.display());
            }
            let _ = writeln!(out, "Synthesized {}", summary.synthesized);
            commit_line(out, &summary.commit);
        }
        Command::Validate { scope, commit } => {
            let items = ops::validate::run(review, *scope, commit.as_deref())?;
            out.push_str(&ops::validate::format_items(&items));
        }
        Command::Trace { id } => {
            out.push_str(&ops::trace::format_steps(&ops::trace::run(review, id)?));
        }
        Command::Paper => {
            let path = ops::paper::run(review)?;
            let _ = writeln!(out, "Created {}", path.display());
        }
        Command::Pull => {
            let commit = ops::sync::pull(review).await?;
            commit_line(out, &commit);
        }
        Command::Push => {
            ops::sync::push(review)?;
            let _ = writeln!(out, "Pushed to origin");
        }
        Command::Init { .. } | Command::Clone { .. } | Command::Distribute { .. } => {}
    }
    Ok(())
}

fn decisions(out: &mut String, included: usize, excluded: usize, exported: &Option<PathBuf>, splits: &[PathBuf]) {
    for split in splits {
        let _ = writeln!(out, "Split: {}", split.display());
    }
    if let Some(path) = exported {
        let _ = writeln!(out, "Exported {}", path.display());
    }
    let _ = writeln!(out, "Included {}, excluded {}", included, excluded);
}
