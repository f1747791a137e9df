//! Optional user configuration in `~/.config/gitwhere/config.toml`.
//!
//! Every key is optional. Command-line flags win over file values.

use serde::Deserialize;

use crate::cli::Args;

/// Settings merged from the config file and the command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Theme name, see `Theme::from_name`.
    pub theme: String,
    /// Deadline for the whole diff batch, in seconds.
    pub timeout_secs: u64,
    /// Diff retrievals allowed in flight at once.
    pub max_concurrency: usize,
    /// Lines shown around the tracked line.
    pub context: usize,
    /// Context lines git includes in each hunk.
    pub diff_context: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "catppuccin-mocha".to_owned(),
            timeout_secs: gitwhere_core::fetch::DEFAULT_TIMEOUT.as_secs(),
            max_concurrency: gitwhere_core::fetch::default_concurrency(),
            context: 5,
            diff_context: 0,
        }
    }
}

impl Config {
    /// Parses config file contents.
    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Applies command-line overrides.
    pub fn with_overrides(mut self, args: &Args) -> Self {
        if let Some(theme) = &args.theme {
            self.theme = theme.clone();
        }
        if let Some(timeout) = args.timeout {
            self.timeout_secs = timeout;
        }
        if let Some(jobs) = args.jobs {
            self.max_concurrency = jobs.max(1);
        }
        if let Some(context) = args.context {
            self.context = context;
        }
        if let Some(diff_context) = args.diff_context {
            self.diff_context = diff_context;
        }
        self
    }
}

/// Returns the path to the gitwhere config file.
///
/// Prefers `$XDG_CONFIG_HOME/gitwhere/config.toml`; falls back to
/// `~/.config/gitwhere/config.toml` when the env var is absent.
pub fn config_path() -> std::path::PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(std::path::PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| std::path::PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| std::path::PathBuf::from(".config"));
    base.join("gitwhere").join("config.toml")
}

/// Loads the config file, falling back to defaults.
///
/// A missing file is normal. A file that cannot be parsed is logged and
/// ignored; config errors never stop a run.
pub fn load() -> Config {
    let path = config_path();
    let raw = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };
    match Config::parse(&raw) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            Config::default()
        }
    }
}
