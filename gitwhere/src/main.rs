//! gitwhere: find where a line referenced on a past date lives today.
//!
//! Entry point for the `gitwhere` binary. Wires together argument parsing
//! (`cli`), the optional config file (`config`), the locator from
//! `gitwhere-core`, and the file view (`present`, `theme`).
//!
//! # Exit status
//!
//! - `0` the line was followed to the newest revision.
//! - `2` the line was deleted along the way; its last place is printed.
//! - `1` any error (bad input, unknown date, git failure, timeout).

mod cli;
mod config;
mod present;
mod theme;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gitwhere_core::provider::parse_reference_date;
use gitwhere_core::{GitRevisions, LocateRequest, Locator, Outcome, Revision, TrackedLocation};
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::present::Presenter;

/// Logs go to stderr so stdout stays clean for the report.
///
/// `GITWHERE_LOG` takes any `EnvFilter` directive and wins over `-v`.
fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("GITWHERE_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn describe(revision: &Revision) -> String {
    format!("{} ({})", revision.short_id(), revision.time.format("%Y-%m-%d %H:%M UTC"))
}

/// Returns `true` when the line was located, `false` when it was lost.
async fn run(args: Args) -> anyhow::Result<bool> {
    let config = config::load().with_overrides(&args);
    tracing::debug!(?config, "effective settings");

    let since = parse_reference_date(&args.date)?;
    let location = TrackedLocation::new(args.file.as_str(), args.line)?;
    let revisions = GitRevisions::open(&args.path, config.diff_context)?;
    tracing::info!(repo = %revisions.path().display(), "opened repository");
    let locator = Locator::new(Arc::new(revisions))
        .with_timeout(Duration::from_secs(config.timeout_secs))
        .with_max_concurrency(config.max_concurrency);

    let presenter = (!args.no_show).then(|| {
        Presenter::new(theme::Theme::from_name(&config.theme), config.context, args.plain)
    });

    let request = LocateRequest { location, since };
    let report = locator.locate(&request).await?;
    let base = report.base();
    println!("Working off of base commit {}", describe(base));

    if let Some(presenter) = &presenter {
        let content = locator
            .content_at(base, &request.location.file_name)
            .await
            .context("reading file at base commit")?;
        let title = format!("{} @ {}", request.location, base.short_id());
        presenter.render(&title, &request.location.file_name, &content, request.location.line_number, false)?;
    }

    let (revision, lost) = match &report.outcome {
        Outcome::Located { location, revision } => {
            println!(
                "Current reference is {} line {} at {}",
                location.file_name,
                location.line_number,
                describe(revision)
            );
            (revision, false)
        }
        Outcome::Lost { position, from, to, location } => {
            println!(
                "Trail went cold at chain position {position}: the line was deleted between {} and {}",
                describe(from),
                describe(to)
            );
            println!(
                "Last known reference is {} line {} at {}",
                location.file_name,
                location.line_number,
                describe(from)
            );
            (from, true)
        }
    };

    if let Some(presenter) = &presenter {
        let location = report.outcome.location();
        let content = locator
            .content_at(revision, &location.file_name)
            .await
            .with_context(|| format!("reading {} at {}", location.file_name, revision.short_id()))?;
        let title = format!("{location} @ {}", revision.short_id());
        presenter.render(&title, &location.file_name, &content, location.line_number, lost)?;
    }

    Ok(!lost)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("gitwhere: {e:#}");
            ExitCode::FAILURE
        }
    }
}
