//! Line Locator: replays a chain of diffs against one tracked line.
//!
//! [`apply_transition`] is the single-step rule; [`Locator`] builds the chain,
//! starts the [`DiffFetcher`] and folds the results strictly in chain order,
//! stopping at the first transition that deletes the line.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{LocateError, ParseError};
use crate::fetch::{default_concurrency, DiffFetcher, DEFAULT_TIMEOUT};
use crate::provider::RevisionProvider;
use crate::types::{FileDiff, Outcome, Revision, TrackedLocation, Transition};

/// Applies one revision transition to `location`.
///
/// Only the first non-copy entry whose old name is the tracked file counts.
/// Hunk coordinates are pre-transition line numbers, so every comparison uses
/// the line as it was before this transition and the shifts are summed
/// separately. A hunk with `old_start <= line <= old_start + old_lines`
/// deletes the line; the upper bound is inclusive.
///
/// # Errors
///
/// `ParseError` (with `line` 0) when the hunks would move the line above the
/// top of the file, which only happens for overlapping or unordered hunks.
pub fn apply_transition(
    location: &TrackedLocation,
    file_diffs: &[FileDiff],
) -> Result<Transition, ParseError> {
    let Some(file) = file_diffs
        .iter()
        .find(|f| !f.is_copy && f.old_name.as_deref() == Some(location.file_name.as_str()))
    else {
        return Ok(Transition::Moved(location.clone()));
    };

    let line = i64::from(location.line_number);
    let mut offset: i64 = 0;
    for hunk in &file.hunks {
        let start = i64::from(hunk.old_start);
        if start > line {
            continue;
        }
        if start + i64::from(hunk.old_lines) >= line {
            return Ok(Transition::Deleted);
        }
        offset += hunk.delta();
    }

    let Some(new_name) = &file.new_name else {
        // Deleted without a hunk covering the line (binary or empty file).
        return Ok(Transition::Deleted);
    };

    let line_number = u32::try_from(line + offset)
        .ok()
        .filter(|&n| n >= 1)
        .ok_or_else(|| {
            ParseError::new(
                0,
                format!("hunks for {} move line {} to {}", location.file_name, line, line + offset),
            )
        })?;

    Ok(Transition::Moved(TrackedLocation { file_name: new_name.clone(), line_number }))
}

/// Number of lines in `content`, counting a final unterminated line.
pub fn count_lines(content: &[u8]) -> usize {
    let newlines = content.iter().filter(|&&b| b == b'\n').count();
    match content.last() {
        Some(b'\n') | None => newlines,
        Some(_) => newlines + 1,
    }
}

/// What to track and from when.
#[derive(Debug, Clone)]
pub struct LocateRequest {
    /// The line as it was referenced on `since`.
    pub location: TrackedLocation,
    /// Date the reference was made; the chain starts at the newest revision
    /// before it.
    pub since: DateTime<Utc>,
}

/// Everything a caller needs to explain the outcome.
#[derive(Debug, Clone)]
pub struct LocateReport {
    /// Base revision first, newest revision last.
    pub chain: Vec<Revision>,
    pub outcome: Outcome,
}

impl LocateReport {
    /// The revision the request's location refers to.
    pub fn base(&self) -> &Revision {
        &self.chain[0]
    }
}

/// Runs the whole pipeline: chain, concurrent fetch, ordered fold.
pub struct Locator<P> {
    provider: Arc<P>,
    timeout: Duration,
    max_concurrency: usize,
}

impl<P: RevisionProvider + 'static> Locator<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider, timeout: DEFAULT_TIMEOUT, max_concurrency: default_concurrency() }
    }

    /// Deadline for retrieving all diffs of one run.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Runs a provider call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, LocateError>
    where
        T: Send + 'static,
        F: FnOnce(&P) -> Result<T, LocateError> + Send + 'static,
    {
        let provider = Arc::clone(&self.provider);
        tokio::task::spawn_blocking(move || f(&*provider))
            .await
            .map_err(|e| LocateError::backend(None, format!("backend task failed: {e}")))?
    }

    /// Base revision (position 0) followed by every revision since `since`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no revision predates `since`; `Backend` when history
    /// cannot be read.
    pub async fn build_chain(&self, since: DateTime<Utc>) -> Result<Vec<Revision>, LocateError> {
        let base = self.blocking(move |p| p.nearest_revision_before(since)).await?;
        let newer = self.blocking(move |p| p.list_revisions_since(since)).await?;

        let chain: Vec<Revision> = std::iter::once(base)
            .chain(newer)
            .enumerate()
            .map(|(position, r)| Revision { position, ..r })
            .collect();
        tracing::info!(
            base = chain[0].short_id(),
            transitions = chain.len() - 1,
            "built revision chain"
        );
        Ok(chain)
    }

    /// Raw file content at `revision`, fetched on the blocking pool.
    ///
    /// # Errors
    ///
    /// `NotFound` when the file is absent at that revision.
    pub async fn content_at(&self, revision: &Revision, file_name: &str) -> Result<Vec<u8>, LocateError> {
        let revision = revision.clone();
        let file_name = file_name.to_owned();
        self.blocking(move |p| p.file_content_at(&revision, &file_name)).await
    }

    /// Tracks `request.location` from its base revision to the newest one.
    ///
    /// A deleted line is reported as `Outcome::Lost`, not as an error.
    ///
    /// # Errors
    ///
    /// `Input` when the line is past the end of the file at the base revision;
    /// `NotFound`, `Backend`, `Parse` or `Timeout` from building the chain or
    /// from the first failing transition. Nothing past that transition is
    /// folded.
    pub async fn locate(&self, request: &LocateRequest) -> Result<LocateReport, LocateError> {
        let chain = self.build_chain(request.since).await?;
        let base = &chain[0];

        let content = self.content_at(base, &request.location.file_name).await?;
        let line_count = count_lines(&content);
        if request.location.line_number as usize > line_count {
            return Err(LocateError::Input(format!(
                "line {} is past the end of {} ({} lines) at {}",
                request.location.line_number,
                request.location.file_name,
                line_count,
                base.short_id()
            )));
        }

        let fetcher = DiffFetcher::new(Arc::clone(&self.provider))
            .with_timeout(self.timeout)
            .with_max_concurrency(self.max_concurrency);
        let mut diffs = fetcher.fetch(&chain);

        let mut location = request.location.clone();
        while let Some(next) = diffs.next().await {
            let (position, file_diffs) = next?;
            let step = apply_transition(&location, &file_diffs)
                .map_err(|source| LocateError::Parse { position: Some(position), source })?;

            match step {
                Transition::Moved(moved) => {
                    if moved.file_name != location.file_name {
                        tracing::info!(position, from = %location.file_name, to = %moved.file_name, "file renamed");
                    }
                    tracing::debug!(position, from = %location, to = %moved, "transition applied");
                    location = moved;
                }
                Transition::Deleted => {
                    let from = chain[position - 1].clone();
                    let to = chain[position].clone();
                    tracing::info!(position, %location, to = to.short_id(), "trail went cold");
                    let outcome = Outcome::Lost { position, from, to, location };
                    return Ok(LocateReport { chain, outcome });
                }
            }
        }

        let revision = chain[chain.len() - 1].clone();
        let outcome = Outcome::Located { location, revision };
        Ok(LocateReport { chain, outcome })
    }
}
