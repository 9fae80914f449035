// settings.rs - Resolved runtime settings, built once from the CLI.
//
// Everything the commands need is gathered here and passed down by
// reference; nothing reads the environment after startup.

use std::path::PathBuf;
use std::time::Duration;

use gits_dispatch::Schedule;

/// Default watchlist file name inside each candidate directory.
pub const CONF_FILE_NAME: &str = "watchlist.json";

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Watchlist file to read (and write, for mutating actions).
    pub conf_path: PathBuf,
    /// Executable to run per repository.
    pub program: String,
    /// Per-invocation timeout; zero means none.
    pub timeout: Duration,
    pub schedule: Schedule,
    /// Restrict the run to one repository.
    pub key: Option<String>,
    /// Restrict the run to repositories matching a regex.
    pub pattern: Option<String>,
}

/// Candidate watchlist locations, most preferred first.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(config) = dirs::config_dir() {
        paths.push(config.join("gits").join(CONF_FILE_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".gits").join(CONF_FILE_NAME));
    }
    paths
}

/// The explicit path if given; otherwise the first candidate that exists,
/// falling back to the first candidate (or a file in the current directory).
pub fn resolve_conf_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| pick_candidate(candidate_paths()))
}

fn pick_candidate(candidates: Vec<PathBuf>) -> PathBuf {
    candidates
        .iter()
        .find(|path| path.is_file())
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| PathBuf::from(CONF_FILE_NAME))
}
