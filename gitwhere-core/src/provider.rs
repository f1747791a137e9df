//! Revision Provider: read-only access to the repository history.
//!
//! [`RevisionProvider`] is the seam between the locator and the version-control
//! backend. [`GitRevisions`] implements it on top of libgit2. It holds only the
//! repository path and opens a fresh `git2::Repository` per call, because a
//! Repository is `!Sync` and every diff retrieval runs on its own blocking
//! thread.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use git2::{DiffFindOptions, DiffFormat, DiffOptions, ErrorCode, Oid, Repository, Sort};

use crate::error::LocateError;
use crate::types::Revision;

/// Read-only history access used by the locator and the diff fetcher.
///
/// Implementations must be safe to call from many threads at once. Revisions
/// returned here carry `position = 0`; chain positions are assigned by the
/// locator when it assembles the chain.
pub trait RevisionProvider: Send + Sync {
    /// Revisions committed at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// `LocateError::Backend` when the history cannot be read.
    fn list_revisions_since(&self, since: DateTime<Utc>) -> Result<Vec<Revision>, LocateError>;

    /// Newest revision committed strictly before `date`.
    ///
    /// # Errors
    ///
    /// `LocateError::NotFound` when the history starts at or after `date`.
    fn nearest_revision_before(&self, date: DateTime<Utc>) -> Result<Revision, LocateError>;

    /// Raw bytes of `file_name` as of `revision`.
    ///
    /// # Errors
    ///
    /// `LocateError::NotFound` when the file did not exist at that revision.
    fn file_content_at(&self, revision: &Revision, file_name: &str) -> Result<Vec<u8>, LocateError>;

    /// Unified diff text of the change `from -> to`.
    ///
    /// # Errors
    ///
    /// `LocateError::Backend` when either tree cannot be read or diffed.
    fn diff_between(&self, from: &Revision, to: &Revision) -> Result<String, LocateError>;
}

/// [`RevisionProvider`] backed by a git repository on disk.
///
/// History is the first-parent chain from `HEAD`, so merges show up as one
/// ordinary edit and the chain is always linear.
#[derive(Debug, Clone)]
pub struct GitRevisions {
    path: PathBuf,
    context_lines: u32,
}

impl GitRevisions {
    /// Opens the repository containing `path`.
    ///
    /// `context_lines` is passed to every diff; 0 makes each hunk cover exactly
    /// the changed lines.
    ///
    /// # Errors
    ///
    /// `LocateError::Backend` when `path` is not inside a git repository.
    pub fn open(path: impl AsRef<Path>, context_lines: u32) -> Result<Self, LocateError> {
        let repo = Repository::discover(path.as_ref())
            .map_err(|e| LocateError::backend(None, format!("{}: {}", path.as_ref().display(), e.message())))?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
        Ok(Self { path, context_lines })
    }

    /// Root of the repository this provider reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn repo(&self) -> Result<Repository, LocateError> {
        Ok(Repository::open(&self.path)?)
    }

    /// First-parent history from `HEAD`, newest first.
    fn first_parent_history(repo: &Repository) -> Result<Vec<Revision>, LocateError> {
        let mut walk = repo.revwalk()?;
        walk.push_head()?;
        walk.simplify_first_parent()?;
        walk.set_sorting(Sort::TOPOLOGICAL)?;

        let mut history = Vec::new();
        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            let seconds = commit.committer().when().seconds();
            let time = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
                LocateError::backend(None, format!("commit {} has an invalid timestamp", commit.id()))
            })?;
            history.push(Revision { id: commit.id().to_string(), time, position: 0 });
        }
        Ok(history)
    }

    fn tree_of<'r>(repo: &'r Repository, revision: &Revision) -> Result<git2::Tree<'r>, LocateError> {
        let oid = Oid::from_str(&revision.id)?;
        Ok(repo.find_commit(oid)?.tree()?)
    }
}

impl RevisionProvider for GitRevisions {
    fn list_revisions_since(&self, since: DateTime<Utc>) -> Result<Vec<Revision>, LocateError> {
        let repo = self.repo()?;
        // Stop at the first older commit so the result is contiguous with
        // nearest_revision_before even when commit times are not monotonic.
        let mut revisions: Vec<Revision> = Self::first_parent_history(&repo)?
            .into_iter()
            .take_while(|r| r.time >= since)
            .collect();
        revisions.reverse();
        Ok(revisions)
    }

    fn nearest_revision_before(&self, date: DateTime<Utc>) -> Result<Revision, LocateError> {
        let repo = self.repo()?;
        Self::first_parent_history(&repo)?
            .into_iter()
            .find(|r| r.time < date)
            .ok_or_else(|| {
                LocateError::NotFound(format!("no commit before {}", date.format("%Y-%m-%d")))
            })
    }

    fn file_content_at(&self, revision: &Revision, file_name: &str) -> Result<Vec<u8>, LocateError> {
        let repo = self.repo()?;
        let tree = Self::tree_of(&repo, revision)?;
        let entry = match tree.get_path(Path::new(file_name)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(LocateError::NotFound(format!(
                    "{} does not exist at {}",
                    file_name,
                    revision.short_id()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let blob = entry.to_object(&repo)?.peel_to_blob().map_err(|_| {
            LocateError::NotFound(format!("{} is not a file at {}", file_name, revision.short_id()))
        })?;
        Ok(blob.content().to_vec())
    }

    fn diff_between(&self, from: &Revision, to: &Revision) -> Result<String, LocateError> {
        let repo = self.repo()?;
        let old_tree = Self::tree_of(&repo, from)?;
        let new_tree = Self::tree_of(&repo, to)?;

        let mut opts = DiffOptions::new();
        opts.context_lines(self.context_lines);
        let mut diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

        let mut find = DiffFindOptions::new();
        find.renames(true).copies(true);
        diff.find_similar(Some(&mut find))?;

        let mut patch: Vec<u8> = Vec::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                patch.push(line.origin() as u8);
            }
            patch.extend_from_slice(line.content());
            true
        })?;
        Ok(String::from_utf8_lossy(&patch).into_owned())
    }
}

/// Parses a reference date as midnight UTC.
///
/// Accepts `MM/DD/YYYY` and `YYYY-MM-DD`.
///
/// # Errors
///
/// `LocateError::Input` for anything else, including impossible dates.
pub fn parse_reference_date(raw: &str) -> Result<DateTime<Utc>, LocateError> {
    let raw = raw.trim();
    let date = NaiveDate::parse_from_str(raw, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| {
            LocateError::Input(format!("invalid date '{raw}': expected MM/DD/YYYY or YYYY-MM-DD"))
        })?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}
