//! Owned data types shared by the parser, fetcher and locator.
//!
//! All types in this module are fully owned (no borrowed lifetimes) and
//! implement `Send` so they can be produced on blocking retrieval threads and
//! handed back to the async fold.

use chrono::{DateTime, Utc};

use crate::error::LocateError;

/// One point in the linear history being replayed.
///
/// `position` is the revision's index in the chain; the base revision the
/// chain starts from is always position 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Full hex object id.
    pub id: String,
    /// Committer time.
    pub time: DateTime<Utc>,
    /// Index in the chain.
    pub position: usize,
}

impl Revision {
    /// Abbreviated id for display, git's default seven characters.
    pub fn short_id(&self) -> &str {
        let end = self.id.char_indices().nth(7).map(|(i, _)| i).unwrap_or(self.id.len());
        &self.id[..end]
    }
}

/// The `(file, line)` pair threaded through the fold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedLocation {
    /// Repository-relative path.
    pub file_name: String,
    /// 1-based line number.
    pub line_number: u32,
}

impl TrackedLocation {
    /// Creates a location, rejecting empty paths and line 0.
    ///
    /// # Errors
    ///
    /// Returns `LocateError::Input` when the path is empty or the line is 0.
    pub fn new(file_name: impl Into<String>, line_number: u32) -> Result<Self, LocateError> {
        let file_name = file_name.into();
        if file_name.trim().is_empty() {
            return Err(LocateError::Input("file name must not be empty".to_owned()));
        }
        if line_number == 0 {
            return Err(LocateError::Input("line numbers start at 1".to_owned()));
        }
        Ok(Self { file_name, line_number })
    }
}

impl std::fmt::Display for TrackedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_name, self.line_number)
    }
}

/// One `@@` region of a unified diff.
///
/// `old_start` is the 1-based pre-edit line the region begins at (0 for an
/// insertion at the very top of the file); `old_lines` lines are removed from
/// there and `new_lines` lines replace them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditHunk {
    /// First pre-edit line of the region (0 for a top-of-file insertion).
    pub old_start: u32,
    /// Lines removed from the old file.
    pub old_lines: u32,
    /// First line of the region in the new file; display only.
    pub new_start: u32,
    /// Lines that replace them in the new file.
    pub new_lines: u32,
}

impl EditHunk {
    /// Net line-count change introduced by this hunk.
    pub fn delta(&self) -> i64 {
        i64::from(self.new_lines) - i64::from(self.old_lines)
    }
}

/// All hunks for one file within one revision transition.
///
/// A side that is `/dev/null` (file created or deleted) is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDiff {
    /// Path before the transition; `None` for a created file.
    pub old_name: Option<String>,
    /// Path after the transition; `None` for a deleted file.
    pub new_name: Option<String>,
    /// Set for `copy from`/`copy to` entries; the locator never follows these.
    pub is_copy: bool,
    /// Binary change; carries no hunks.
    pub is_binary: bool,
    /// Hunks in diff order (ascending `old_start`).
    pub hunks: Vec<EditHunk>,
}

impl FileDiff {
    /// True when both sides exist under different names.
    pub fn is_rename(&self) -> bool {
        matches!((&self.old_name, &self.new_name), (Some(old), Some(new)) if old != new)
    }
}

/// The unit exchanged between the fetcher and the locator.
///
/// `position` is the chain index of the newer revision of the pair, so the
/// transition `(r0, r1)` has position 1.
#[derive(Debug)]
pub struct DiffResult {
    pub position: usize,
    pub file_diffs: Result<Vec<FileDiff>, LocateError>,
}

/// Terminal state of the fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The whole chain was replayed; `location` is valid at `revision`.
    Located {
        location: TrackedLocation,
        revision: Revision,
    },
    /// The line was deleted by the transition `from -> to` at `position`.
    ///
    /// `location` is the last known place of the line, valid at `from`.
    Lost {
        position: usize,
        from: Revision,
        to: Revision,
        location: TrackedLocation,
    },
}

impl Outcome {
    /// Returns true for the cold-trail outcome.
    pub fn is_lost(&self) -> bool {
        matches!(self, Outcome::Lost { .. })
    }

    /// The last location the line is known to have had.
    pub fn location(&self) -> &TrackedLocation {
        match self {
            Outcome::Located { location, .. } | Outcome::Lost { location, .. } => location,
        }
    }
}

/// Result of a single-transition step, see [`crate::locate::apply_transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The line survived (possibly shifted or renamed).
    Moved(TrackedLocation),
    /// A hunk covered the line.
    Deleted,
}
