//! Error types for gitwhere-core.
//!
//! Every variant raised while replaying the chain carries the chain position
//! it belongs to, so a failure can be reproduced against the exact revision
//! pair. A deleted line is not an error; see [`crate::types::Outcome::Lost`].

use std::time::Duration;

use thiserror::Error;

/// Malformed diff text.
///
/// `line` is the 1-based line of the diff text where parsing failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        Self { line, message: message.into() }
    }
}

/// Errors that abort a locate run.
#[derive(Error, Debug)]
pub enum LocateError {
    /// Bad file, line or date supplied by the caller.
    #[error("invalid input: {0}")]
    Input(String),

    /// The version-control backend failed.
    ///
    /// `position` is `None` for calls made while building the chain.
    #[error("backend error{}: {message}", at_position(*position))]
    Backend {
        position: Option<usize>,
        message: String,
    },

    /// Diff text for a transition could not be parsed.
    #[error("malformed diff{}: {source}", at_position(*position))]
    Parse {
        position: Option<usize>,
        #[source]
        source: ParseError,
    },

    /// The batch of diff retrievals outlived its deadline.
    #[error(
        "timed out after {after:?} waiting for chain position {position} \
         ({received} of {total} diffs received)"
    )]
    Timeout {
        position: usize,
        received: usize,
        total: usize,
        after: Duration,
    },

    /// A revision or file the run depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl LocateError {
    /// Builds a backend error for a chain position.
    pub fn backend(position: Option<usize>, message: impl Into<String>) -> Self {
        LocateError::Backend { position, message: message.into() }
    }

    /// Re-tags a position-less error with the chain position it occurred at.
    pub(crate) fn at(self, at: usize) -> Self {
        match self {
            LocateError::Backend { position: None, message } => {
                LocateError::Backend { position: Some(at), message }
            }
            LocateError::Parse { position: None, source } => {
                LocateError::Parse { position: Some(at), source }
            }
            other => other,
        }
    }

    /// Chain position the error is attributed to, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            LocateError::Backend { position, .. } | LocateError::Parse { position, .. } => {
                *position
            }
            LocateError::Timeout { position, .. } => Some(*position),
            LocateError::Input(_) | LocateError::NotFound(_) => None,
        }
    }
}

impl From<git2::Error> for LocateError {
    fn from(e: git2::Error) -> Self {
        LocateError::backend(None, e.message())
    }
}

impl From<ParseError> for LocateError {
    fn from(source: ParseError) -> Self {
        LocateError::Parse { position: None, source }
    }
}

fn at_position(position: Option<usize>) -> String {
    match position {
        Some(p) => format!(" at chain position {p}"),
        None => String::new(),
    }
}
