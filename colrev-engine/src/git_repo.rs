//! Git repository wrapper
//!
//! Thin layer over `git2` with the operations the engine needs: staging,
//! committing, working tree status, path history and blob access, plus the
//! remote operations behind `clone`, `pull` and `push`.

use chrono::{DateTime, TimeZone, Utc};
use colrev_common::config::UserIdentity;
use colrev_common::{Error, Result};
use git2::{BranchType, ErrorCode, IndexAddOption, Oid, Repository, Signature, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A change to a tracked file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub staged: bool,
    pub unstaged: bool,
}

/// Commit metadata
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: String,
    pub author: String,
    pub email: String,
    pub date: DateTime<Utc>,
    pub message: String,
}

pub struct GitRepo {
    repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    pub fn init(path: &Path) -> Result<Self> {
        let repo = Repository::init(path)?;
        info!(path = %path.display(), "Initialized git repository");
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    pub fn clone_from(url: &str, path: &Path) -> Result<Self> {
        info!(url, path = %path.display(), "Cloning repository");
        let repo = Repository::clone(url, path)?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Index and commits
    // ========================================================================

    /// Stage a path relative to the repository root (files or directories)
    pub fn add(&self, rel_path: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        let full = self.path.join(rel_path);
        if full.is_dir() {
            index.add_all([rel_path], IndexAddOption::DEFAULT, None)?;
        } else if full.exists() {
            index.add_path(Path::new(rel_path))?;
        } else {
            index.remove_path(Path::new(rel_path))?;
        }
        index.write()?;
        debug!(path = rel_path, "Staged");
        Ok(())
    }

    /// Stage the removal of a tracked path
    pub fn remove(&self, rel_path: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        index.remove_path(Path::new(rel_path))?;
        index.write()?;
        Ok(())
    }

    fn head_commit(&self) -> Result<Option<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn head_id(&self) -> Result<Option<String>> {
        Ok(self.head_commit()?.map(|c| c.id().to_string()))
    }

    /// Whether the index differs from HEAD
    pub fn has_staged_changes(&self) -> Result<bool> {
        Ok(self.changes()?.iter().any(|c| c.staged))
    }

    /// Commit the index
    ///
    /// `author` is the bot for automated operations and the user for manual
    /// ones; the committer is always the user.
    pub fn commit(&self, message: &str, author: &UserIdentity, committer: &UserIdentity) -> Result<String> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let author_sig = Signature::now(&author.name, &author.email)?;
        let committer_sig = Signature::now(&committer.name, &committer.email)?;
        let parent = self.head_commit()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &author_sig, &committer_sig, message, &tree, &parents)?;
        info!(commit = %oid, "Created commit");
        Ok(oid.to_string())
    }

    // ========================================================================
    // Working tree
    // ========================================================================

    /// Staged and unstaged changes to tracked files (untracked files excluded)
    pub fn changes(&self) -> Result<Vec<FileChange>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut changes = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let status = entry.status();
            let staged = status.is_index_new()
                || status.is_index_modified()
                || status.is_index_deleted()
                || status.is_index_renamed()
                || status.is_index_typechange();
            let unstaged = status.is_wt_modified()
                || status.is_wt_deleted()
                || status.is_wt_renamed()
                || status.is_wt_typechange();
            if staged || unstaged {
                changes.push(FileChange {
                    path: path.to_string(),
                    staged,
                    unstaged,
                });
            }
        }
        Ok(changes)
    }

    /// Paths changed relative to HEAD (staged or not)
    pub fn diff_against_head(&self) -> Result<Vec<String>> {
        Ok(self.changes()?.into_iter().map(|c| c.path).collect())
    }

    // ========================================================================
    // History
    // ========================================================================

    fn commit_info(commit: &git2::Commit<'_>) -> CommitInfo {
        let author = commit.author();
        CommitInfo {
            id: commit.id().to_string(),
            author: author.name().unwrap_or("").to_string(),
            email: author.email().unwrap_or("").to_string(),
            date: Utc
                .timestamp_opt(commit.time().seconds(), 0)
                .single()
                .unwrap_or_default(),
            message: commit.message().unwrap_or("").to_string(),
        }
    }

    /// Commits touching `rel_path`, newest first
    pub fn history(&self, rel_path: &str, max: Option<usize>) -> Result<Vec<CommitInfo>> {
        if self.head_commit()?.is_none() {
            return Ok(Vec::new());
        }
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;

        let path = Path::new(rel_path);
        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            let current = commit.tree()?.get_path(path).ok().map(|e| e.id());
            let previous = match commit.parent(0) {
                Ok(parent) => parent.tree()?.get_path(path).ok().map(|e| e.id()),
                Err(_) => None,
            };
            if current.is_some() && current != previous {
                commits.push(Self::commit_info(&commit));
                if max.is_some_and(|m| commits.len() >= m) {
                    break;
                }
            }
        }
        Ok(commits)
    }

    /// All commits, newest first
    pub fn log(&self, max: Option<usize>) -> Result<Vec<CommitInfo>> {
        if self.head_commit()?.is_none() {
            return Ok(Vec::new());
        }
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;
        let mut commits = Vec::new();
        for oid in revwalk.take(max.unwrap_or(usize::MAX)) {
            commits.push(Self::commit_info(&self.repo.find_commit(oid?)?));
        }
        Ok(commits)
    }

    /// Content of `rel_path` at a commit (any revision spec, e.g. `HEAD~1`)
    pub fn file_at(&self, revision: &str, rel_path: &str) -> Result<Option<String>> {
        let commit = self.repo.revparse_single(revision)?.peel_to_commit()?;
        let entry = match commit.tree()?.get_path(Path::new(rel_path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob = self.repo.find_blob(entry.id())?;
        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }

    /// Resolve a revision spec to a full commit id
    pub fn resolve(&self, revision: &str) -> Result<String> {
        Ok(self.repo.revparse_single(revision)?.peel_to_commit()?.id().to_string())
    }

    /// Parent commit id of `revision`
    pub fn parent_of(&self, revision: &str) -> Result<Option<String>> {
        let commit = self.repo.revparse_single(revision)?.peel_to_commit()?;
        Ok(commit.parent_id(0).ok().map(|id: Oid| id.to_string()))
    }

    // ========================================================================
    // Remotes
    // ========================================================================

    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.repo.remote(name, url)?;
        Ok(())
    }

    pub fn has_remote(&self, name: &str) -> bool {
        self.repo.find_remote(name).is_ok()
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| Error::Internal("HEAD is not a branch".to_string()))
    }

    /// Fetch `origin` and fast-forward the current branch
    pub fn pull(&self) -> Result<()> {
        let branch = self.current_branch()?;
        let mut remote = self.repo.find_remote("origin")?;
        remote.fetch(&[branch.as_str()], None, None)?;

        let fetch_head = self.repo.find_reference("FETCH_HEAD")?;
        let fetch_commit = self.repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = self.repo.merge_analysis(&[&fetch_commit])?;
        if analysis.is_up_to_date() {
            info!(branch = %branch, "Already up to date");
            return Ok(());
        }
        if !analysis.is_fast_forward() {
            return Err(Error::Internal(format!(
                "Cannot fast-forward {} (diverged from origin)",
                branch
            )));
        }
        let refname = format!("refs/heads/{}", branch);
        let mut reference = self.repo.find_reference(&refname)?;
        reference.set_target(fetch_commit.id(), "pull: fast-forward")?;
        self.repo.set_head(&refname)?;
        self.repo
            .checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
        info!(branch = %branch, commit = %fetch_commit.id(), "Fast-forwarded");
        Ok(())
    }

    /// Push the current branch to `origin`
    pub fn push(&self) -> Result<()> {
        let branch = self.current_branch()?;
        if self.repo.find_branch(&branch, BranchType::Local).is_err() {
            return Err(Error::Internal(format!("Unknown branch {}", branch)));
        }
        let mut remote = self.repo.find_remote("origin")?;
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        remote.push(&[refspec.as_str()], None)?;
        info!(branch = %branch, "Pushed to origin");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserIdentity {
        UserIdentity {
            name: "Tester".to_string(),
            email: "tester@example.org".to_string(),
        }
    }

    #[test]
    fn commit_history_and_blobs() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = GitRepo::init(tmp.path()).unwrap();
        assert!(repo.head_id().unwrap().is_none());
        assert!(repo.history("records.bib", None).unwrap().is_empty());

        std::fs::write(tmp.path().join("records.bib"), "v1\n").unwrap();
        repo.add("records.bib").unwrap();
        let first = repo.commit("first", &UserIdentity::bot(), &user()).unwrap();

        std::fs::write(tmp.path().join("other.txt"), "x").unwrap();
        repo.add("other.txt").unwrap();
        repo.commit("unrelated", &user(), &user()).unwrap();

        std::fs::write(tmp.path().join("records.bib"), "v2\n").unwrap();
        assert_eq!(
            repo.changes().unwrap(),
            vec![FileChange {
                path: "records.bib".to_string(),
                staged: false,
                unstaged: true
            }]
        );
        repo.add("records.bib").unwrap();
        assert!(repo.has_staged_changes().unwrap());
        repo.commit("second", &user(), &user()).unwrap();

        let history = repo.history("records.bib", None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "second");
        assert_eq!(history[1].id, first);
        assert_eq!(history[1].author, UserIdentity::bot().name);

        assert_eq!(repo.file_at(&first, "records.bib").unwrap().as_deref(), Some("v1\n"));
        assert_eq!(repo.file_at("HEAD", "records.bib").unwrap().as_deref(), Some("v2\n"));
        assert_eq!(repo.file_at(&first, "missing.bib").unwrap(), None);
        assert!(repo.changes().unwrap().is_empty());
    }

    #[test]
    fn untracked_files_are_not_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = GitRepo::init(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        assert!(repo.changes().unwrap().is_empty());
    }
}
