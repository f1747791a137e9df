//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Find where a line referenced on a past date lives today.
#[derive(Parser, Debug)]
#[command(name = "gitwhere", version, about)]
pub struct Args {
    /// Repository-relative path of the file, as it was named on --date
    #[arg(short, long)]
    pub file: String,

    /// Line number in that file
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub line: u32,

    /// Date the line was referenced (MM/DD/YYYY or YYYY-MM-DD)
    #[arg(short, long)]
    pub date: String,

    /// Path to the repository
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Seconds allowed for retrieving every diff in the chain
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum number of diffs retrieved at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Lines shown above and below the tracked line
    #[arg(short = 'C', long)]
    pub context: Option<usize>,

    /// Context lines requested from git for each diff (0 = changed lines only)
    #[arg(long)]
    pub diff_context: Option<u32>,

    /// Color theme: dark or catppuccin-mocha
    #[arg(long)]
    pub theme: Option<String>,

    /// Print without colors or borders
    #[arg(long)]
    pub plain: bool,

    /// Only report the location; do not print file content
    #[arg(long)]
    pub no_show: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
