//! Diff Fetcher: concurrent retrieval of every transition in a chain.
//!
//! Each consecutive revision pair is retrieved and parsed on its own blocking
//! thread (`spawn_blocking`, gated by a semaphore) and sent back tagged with
//! its slot in the chain. [`OrderedDiffs`] is the reorder buffer on the
//! receiving side: results are stored by slot as they arrive and handed out
//! strictly in chain order, all under one deadline fixed when the batch starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::LocateError;
use crate::hunk::parse_diff;
use crate::provider::RevisionProvider;
use crate::types::{DiffResult, FileDiff, Revision};

/// Deadline for a whole batch when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retrievals allowed in flight at once.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Fans diff retrieval out over the chain.
pub struct DiffFetcher<P> {
    provider: Arc<P>,
    timeout: Duration,
    max_concurrency: usize,
}

impl<P: RevisionProvider + 'static> DiffFetcher<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider, timeout: DEFAULT_TIMEOUT, max_concurrency: default_concurrency() }
    }

    /// Sets the deadline covering the whole batch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps the number of concurrent retrievals (at least one).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Starts retrieving the diff of every consecutive pair in `chain`.
    ///
    /// A chain of `n + 1` revisions yields `n` results. The deadline starts
    /// now, not at the first `next()` call. Must be called from within a
    /// Tokio runtime.
    pub fn fetch(&self, chain: &[Revision]) -> OrderedDiffs {
        let total = chain.len().saturating_sub(1);
        // Capacity for every result, so no task ever waits on a slow consumer.
        let (tx, rx) = mpsc::channel(total.max(1));
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (slot, pair) in chain.windows(2).enumerate() {
            let from = pair[0].clone();
            let to = pair[1].clone();
            let provider = Arc::clone(&self.provider);
            let permits = Arc::clone(&permits);
            let tx = tx.clone();

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let position = to.position;
                tracing::debug!(position, from = from.short_id(), to = to.short_id(), "fetching diff");
                let file_diffs = tokio::task::spawn_blocking(move || retrieve(&*provider, &from, &to))
                    .await
                    .unwrap_or_else(|e| {
                        Err(LocateError::backend(Some(position), format!("retrieval task failed: {e}")))
                    });
                let finished = Instant::now();
                // The receiver is gone once the caller stopped folding.
                let _ = tx.send((slot, DiffResult { position, file_diffs }, finished)).await;
            });
        }

        OrderedDiffs {
            rx,
            slots: (0..total).map(|_| None).collect(),
            positions: chain.iter().skip(1).map(|r| r.position).collect(),
            cursor: 0,
            received: 0,
            deadline: Instant::now() + self.timeout,
            timeout: self.timeout,
            tasks,
        }
    }
}

/// Retrieves and parses one transition. Runs on a blocking thread.
fn retrieve<P: RevisionProvider + ?Sized>(
    provider: &P,
    from: &Revision,
    to: &Revision,
) -> Result<Vec<FileDiff>, LocateError> {
    let text = provider.diff_between(from, to).map_err(|e| e.at(to.position))?;
    parse_diff(&text).map_err(|source| LocateError::Parse { position: Some(to.position), source })
}

/// Reorder buffer over the results of one [`DiffFetcher::fetch`] call.
///
/// Dropping it aborts the tasks still waiting; retrievals already running on
/// blocking threads finish in the background and their results are discarded.
pub struct OrderedDiffs {
    rx: mpsc::Receiver<(usize, DiffResult, Instant)>,
    slots: Vec<Option<DiffResult>>,
    positions: Vec<usize>,
    cursor: usize,
    received: usize,
    deadline: Instant,
    timeout: Duration,
    tasks: JoinSet<()>,
}

impl OrderedDiffs {
    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Results that have arrived so far, in any order.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Next transition in chain order as `(position, file_diffs)`.
    ///
    /// Waits only until that transition's result is in; later results keep
    /// arriving in the buffer meanwhile. A result counts as on time when its
    /// retrieval finished before the deadline, regardless of when it is
    /// asked for; one that finished later is a timeout at its position.
    /// Returns `None` once the chain is exhausted or after the first error.
    pub async fn next(&mut self) -> Option<Result<(usize, Vec<FileDiff>), LocateError>> {
        if self.cursor >= self.slots.len() {
            return None;
        }

        while self.slots[self.cursor].is_none() {
            match tokio::time::timeout_at(self.deadline, self.rx.recv()).await {
                Ok(Some((_, result, finished))) if finished > self.deadline => {
                    // Finished past the deadline: never handed out, however
                    // early the caller comes back for it.
                    tracing::debug!(position = result.position, "discarding late diff");
                }
                Ok(Some((slot, result, _))) => {
                    self.received += 1;
                    self.slots[slot] = Some(result);
                }
                Ok(None) if Instant::now() >= self.deadline => {
                    let error = self.timed_out();
                    return Some(Err(self.fail(error)));
                }
                Ok(None) => {
                    let position = self.positions[self.cursor];
                    return Some(Err(self.fail(LocateError::backend(
                        Some(position),
                        "retrieval ended without a result",
                    ))));
                }
                Err(_) => {
                    let error = self.timed_out();
                    return Some(Err(self.fail(error)));
                }
            }
        }

        let result = self.slots[self.cursor].take()?;
        self.cursor += 1;
        match result.file_diffs {
            Ok(file_diffs) => Some(Ok((result.position, file_diffs))),
            Err(e) => Some(Err(self.fail(e))),
        }
    }

    /// Drains the whole batch in chain order, failing on the first error.
    pub async fn collect(mut self) -> Result<Vec<(usize, Vec<FileDiff>)>, LocateError> {
        let mut all = Vec::with_capacity(self.slots.len());
        while let Some(next) = self.next().await {
            all.push(next?);
        }
        Ok(all)
    }

    fn timed_out(&self) -> LocateError {
        let position = self.positions[self.cursor];
        tracing::warn!(position, received = self.received(), total = self.len(), "diff batch timed out");
        LocateError::Timeout {
            position,
            received: self.received,
            total: self.slots.len(),
            after: self.timeout,
        }
    }

    fn fail(&mut self, error: LocateError) -> LocateError {
        self.cursor = self.slots.len();
        self.rx.close();
        self.tasks.abort_all();
        error
    }
}
