//! gitwhere-core: follows one line of one file through a linear git history.
//!
//! The pipeline is: [`provider`] lists the chain of revisions since a date,
//! [`fetch`] retrieves every consecutive diff concurrently, [`hunk`] parses
//! each diff, and [`locate`] folds the parsed edits in chain order into the
//! line's current `(file, line)` or the transition that deleted it.
pub mod error;
pub mod fetch;
pub mod hunk;
pub mod locate;
pub mod provider;
pub mod types;

pub use error::{LocateError, ParseError};
pub use locate::{LocateReport, LocateRequest, Locator};
pub use provider::{GitRevisions, RevisionProvider};
pub use types::{EditHunk, FileDiff, Outcome, Revision, TrackedLocation};
