//! Fetcher and fold behaviour against a scripted in-memory history with
//! injected retrieval latencies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use gitwhere_core::fetch::DiffFetcher;
use gitwhere_core::{
    LocateError, LocateRequest, Locator, Outcome, Revision, RevisionProvider, TrackedLocation,
};

const TRANSITIONS: usize = 50;
const RENAME_AT: usize = 10;

fn day(n: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::days(n as i64)
}

fn revision(n: usize) -> Revision {
    Revision { id: format!("r{n}"), time: day(n), position: 0 }
}

/// History whose transition `n` (from `r{n-1}` to `r{n}`) returns `diffs[n-1]`
/// after sleeping `latencies[n-1]`.
struct ScriptedHistory {
    diffs: Vec<String>,
    latencies: Vec<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    /// Transition whose retrieval fails with a backend error.
    fail_at: Option<usize>,
    /// Transition whose retrieval panics.
    panic_at: Option<usize>,
}

impl ScriptedHistory {
    fn new(diffs: Vec<String>, latencies: Vec<Duration>) -> Self {
        assert_eq!(diffs.len(), latencies.len());
        Self {
            diffs,
            latencies,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fail_at: None,
            panic_at: None,
        }
    }

    fn failing_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    fn panicking_at(mut self, n: usize) -> Self {
        self.panic_at = Some(n);
        self
    }

    fn index_of(revision: &Revision) -> usize {
        revision.id[1..].parse().unwrap()
    }
}

impl RevisionProvider for ScriptedHistory {
    fn list_revisions_since(&self, _since: DateTime<Utc>) -> Result<Vec<Revision>, LocateError> {
        Ok((1..=self.diffs.len()).map(revision).collect())
    }

    fn nearest_revision_before(&self, _date: DateTime<Utc>) -> Result<Revision, LocateError> {
        Ok(revision(0))
    }

    fn file_content_at(&self, _revision: &Revision, _file_name: &str) -> Result<Vec<u8>, LocateError> {
        Ok("line\n".repeat(500).into_bytes())
    }

    fn diff_between(&self, _from: &Revision, to: &Revision) -> Result<String, LocateError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let n = Self::index_of(to);
        std::thread::sleep(self.latencies[n - 1]);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.panic_at == Some(n) {
            panic!("retrieval of r{n} crashed");
        }
        if self.fail_at == Some(n) {
            return Err(LocateError::backend(None, format!("object r{n} is corrupt")));
        }
        Ok(self.diffs[n - 1].clone())
    }
}

/// Transition `n` inserts `n % 3 + 1` lines at the top of the tracked file
/// and touches an unrelated file; transition `RENAME_AT` renames f.txt to g.txt.
fn scripted_diff(n: usize) -> String {
    let mut text = String::from(
        "diff --git a/other.txt b/other.txt\n--- a/other.txt\n+++ b/other.txt\n@@ -1,200 +0,0 @@\n",
    );
    text.push_str(&"-gone\n".repeat(200));

    if n == RENAME_AT {
        text.push_str(
            "diff --git a/f.txt b/g.txt\nsimilarity index 95%\nrename from f.txt\nrename to g.txt\n\
             --- a/f.txt\n+++ b/g.txt\n@@ -1,0 +2,2 @@\n+x\n+y\n",
        );
        return text;
    }

    let name = if n < RENAME_AT { "f.txt" } else { "g.txt" };
    let inserted = n % 3 + 1;
    text.push_str(&format!(
        "diff --git a/{name} b/{name}\n--- a/{name}\n+++ b/{name}\n@@ -1,0 +2,{inserted} @@\n"
    ));
    text.push_str(&"+new\n".repeat(inserted));
    // A hunk below the tracked line, which never moves it.
    text.push_str("@@ -450,2 +460 @@\n-a\n-b\n+c\n");
    text
}

fn expected_line(start: u32) -> u32 {
    (1..=TRANSITIONS)
        .map(|n| if n == RENAME_AT { 2 } else { (n % 3 + 1) as u32 })
        .sum::<u32>()
        + start
}

fn request(file: &str, line: u32) -> LocateRequest {
    LocateRequest { location: TrackedLocation::new(file, line).unwrap(), since: day(1) }
}

fn latencies(reverse: bool) -> Vec<Duration> {
    (1..=TRANSITIONS)
        .map(|n| {
            let step = if reverse { TRANSITIONS - n } else { n };
            Duration::from_millis(2 * step as u64)
        })
        .collect()
}

async fn run(reverse: bool) -> Outcome {
    let diffs = (1..=TRANSITIONS).map(scripted_diff).collect();
    let history = Arc::new(ScriptedHistory::new(diffs, latencies(reverse)));
    let locator = Locator::new(history)
        .with_timeout(Duration::from_secs(20))
        .with_max_concurrency(16);
    locator.locate(&request("f.txt", 100)).await.unwrap().outcome
}

#[tokio::test]
async fn fold_result_ignores_completion_order() {
    let forward = run(false).await;
    let reverse = run(true).await;
    assert_eq!(forward, reverse);

    let Outcome::Located { location, revision } = forward else {
        panic!("line should survive: {forward:?}");
    };
    assert_eq!(location.file_name, "g.txt");
    assert_eq!(location.line_number, expected_line(100));
    assert_eq!(revision.position, TRANSITIONS);
    assert_eq!(revision.id, format!("r{TRANSITIONS}"));
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let first = run(true).await;
    let second = run(true).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn fetcher_hands_out_results_in_chain_order() {
    let diffs = (1..=TRANSITIONS).map(scripted_diff).collect();
    let history = Arc::new(ScriptedHistory::new(diffs, latencies(true)));
    let chain: Vec<Revision> = (0..=TRANSITIONS)
        .map(|n| Revision { position: n, ..revision(n) })
        .collect();

    let ordered = DiffFetcher::new(history).fetch(&chain);
    assert_eq!(ordered.len(), TRANSITIONS);
    let all = ordered.collect().await.unwrap();

    let positions: Vec<usize> = all.iter().map(|(p, _)| *p).collect();
    assert_eq!(positions, (1..=TRANSITIONS).collect::<Vec<_>>());
    assert!(all[RENAME_AT - 1].1.iter().any(|f| f.is_rename()));
}

#[tokio::test]
async fn concurrency_is_capped() {
    let diffs = (1..=12).map(scripted_diff).collect();
    let lat = vec![Duration::from_millis(20); 12];
    let history = Arc::new(ScriptedHistory::new(diffs, lat));
    let chain: Vec<Revision> = (0..=12).map(|n| Revision { position: n, ..revision(n) }).collect();

    DiffFetcher::new(Arc::clone(&history))
        .with_max_concurrency(3)
        .fetch(&chain)
        .collect()
        .await
        .unwrap();
    let peak = history.peak.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak concurrency was {peak}");
}

#[tokio::test]
async fn empty_chain_locates_unchanged() {
    let history = Arc::new(ScriptedHistory::new(Vec::new(), Vec::new()));
    let report = Locator::new(history).locate(&request("f.txt", 42)).await.unwrap();
    assert_eq!(report.chain.len(), 1);
    assert_eq!(
        report.outcome,
        Outcome::Located {
            location: TrackedLocation::new("f.txt", 42).unwrap(),
            revision: Revision { position: 0, ..revision(0) },
        }
    );
}

#[tokio::test]
async fn deletion_stops_the_fold_and_reports_last_location() {
    let mut diffs: Vec<String> = (1..=6).map(scripted_diff).collect();
    // Transition 3 deletes lines 100..=110 of f.txt; transition 5 is garbage
    // that must never be consulted.
    diffs[2] = "diff --git a/f.txt b/f.txt\n--- a/f.txt\n+++ b/f.txt\n@@ -100,10 +99,0 @@\n"
        .to_owned()
        + &"-x\n".repeat(10);
    diffs[4] = "diff --git a/f.txt b/f.txt\n@@ -1,5 +1,5 @@\n-only one line\n".to_owned();
    let history = Arc::new(ScriptedHistory::new(diffs, vec![Duration::ZERO; 6]));

    // Transitions 1 and 2 insert 2 and 3 lines: 100 -> 105.
    let report = Locator::new(history).locate(&request("f.txt", 100)).await.unwrap();
    match report.outcome {
        Outcome::Lost { position, from, to, location } => {
            assert_eq!(position, 3);
            assert_eq!(from.id, "r2");
            assert_eq!(to.id, "r3");
            assert_eq!(location, TrackedLocation::new("f.txt", 105).unwrap());
        }
        other => panic!("expected a cold trail, got {other:?}"),
    }
}

#[tokio::test]
async fn parse_error_names_its_position() {
    let mut diffs: Vec<String> = (1..=6).map(scripted_diff).collect();
    diffs[4] = "diff --git a/f.txt b/f.txt\n--- a/f.txt\n+++ b/f.txt\n@@ -1,5 +1,5 @@\n-only\n".to_owned();
    let history = Arc::new(ScriptedHistory::new(diffs, vec![Duration::ZERO; 6]));

    let err = Locator::new(history).locate(&request("f.txt", 100)).await.unwrap_err();
    assert!(matches!(err, LocateError::Parse { position: Some(5), .. }), "{err:?}");
    assert_eq!(err.position(), Some(5));
    assert!(err.to_string().contains("chain position 5"), "{err}");
}

#[tokio::test]
async fn slow_transition_times_out_the_batch() {
    let diffs = (1..=4).map(scripted_diff).collect();
    let mut lat = vec![Duration::ZERO; 4];
    lat[1] = Duration::from_millis(600);
    let history = Arc::new(ScriptedHistory::new(diffs, lat));

    let err = Locator::new(history)
        .with_timeout(Duration::from_millis(100))
        .locate(&request("f.txt", 100))
        .await
        .unwrap_err();
    match err {
        LocateError::Timeout { position, total, .. } => {
            assert_eq!(position, 2);
            assert_eq!(total, 4);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn backend_error_names_its_position_and_message() {
    let diffs = (1..=6).map(scripted_diff).collect();
    let history = Arc::new(ScriptedHistory::new(diffs, vec![Duration::ZERO; 6]).failing_at(3));

    let err = Locator::new(history).locate(&request("f.txt", 100)).await.unwrap_err();
    match &err {
        LocateError::Backend { position: Some(3), message } => {
            assert!(message.contains("object r3 is corrupt"), "{message}");
        }
        other => panic!("expected a backend error at position 3, got {other:?}"),
    }
    assert_eq!(err.position(), Some(3));
    let shown = err.to_string();
    assert!(shown.contains("chain position 3"), "{shown}");
    assert!(shown.contains("object r3 is corrupt"), "{shown}");
}

#[tokio::test]
async fn earlier_deletion_wins_over_later_backend_error() {
    let mut diffs: Vec<String> = (1..=6).map(scripted_diff).collect();
    diffs[2] = "diff --git a/f.txt b/f.txt\n--- a/f.txt\n+++ b/f.txt\n@@ -100,10 +99,0 @@\n"
        .to_owned()
        + &"-x\n".repeat(10);
    let history = Arc::new(ScriptedHistory::new(diffs, vec![Duration::ZERO; 6]).failing_at(5));

    let report = Locator::new(history).locate(&request("f.txt", 100)).await.unwrap();
    assert!(
        matches!(report.outcome, Outcome::Lost { position: 3, .. }),
        "{:?}",
        report.outcome
    );
}

#[tokio::test]
async fn crashed_retrieval_is_a_backend_error_at_its_position() {
    let diffs = (1..=6).map(scripted_diff).collect();
    let history = Arc::new(ScriptedHistory::new(diffs, vec![Duration::ZERO; 6]).panicking_at(4));

    let err = Locator::new(history).locate(&request("f.txt", 100)).await.unwrap_err();
    match err {
        LocateError::Backend { position: Some(4), message } => {
            assert!(message.contains("retrieval task failed"), "{message}");
        }
        other => panic!("expected a backend error at position 4, got {other:?}"),
    }
}

fn chain(len: usize) -> Vec<Revision> {
    (0..=len).map(|n| Revision { position: n, ..revision(n) }).collect()
}

#[tokio::test]
async fn results_finished_after_the_deadline_are_never_handed_out() {
    let diffs = (1..=4).map(scripted_diff).collect();
    let history = Arc::new(ScriptedHistory::new(diffs, vec![Duration::from_millis(150); 4]));

    let mut ordered = DiffFetcher::new(history)
        .with_timeout(Duration::from_millis(50))
        .with_max_concurrency(4)
        .fetch(&chain(4));
    // Every retrieval has finished, late, by the time the caller asks.
    tokio::time::sleep(Duration::from_millis(400)).await;

    match ordered.next().await {
        Some(Err(LocateError::Timeout { position, received, total, .. })) => {
            assert_eq!(position, 1);
            assert_eq!(received, 0);
            assert_eq!(total, 4);
        }
        other => panic!("expected a timeout at position 1, got {other:?}"),
    }
    assert_eq!(ordered.received(), 0);
    assert!(ordered.next().await.is_none());
}

#[tokio::test]
async fn results_finished_in_time_survive_a_slow_consumer() {
    let diffs = (1..=4).map(scripted_diff).collect();
    let history = Arc::new(ScriptedHistory::new(diffs, vec![Duration::ZERO; 4]));

    let mut ordered = DiffFetcher::new(history)
        .with_timeout(Duration::from_millis(500))
        .fetch(&chain(4));
    tokio::time::sleep(Duration::from_millis(800)).await;

    let mut positions = Vec::new();
    while let Some(next) = ordered.next().await {
        positions.push(next.unwrap().0);
    }
    assert_eq!(positions, vec![1, 2, 3, 4]);
    assert_eq!(ordered.received(), 4);
}

#[tokio::test]
async fn line_past_end_of_file_is_rejected() {
    let history = Arc::new(ScriptedHistory::new(Vec::new(), Vec::new()));
    let err = Locator::new(history).locate(&request("f.txt", 501)).await.unwrap_err();
    assert!(matches!(err, LocateError::Input(_)), "{err:?}");
}
