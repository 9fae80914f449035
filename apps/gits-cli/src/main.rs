//! # gits-cli
//!
//! Command-line interface for `gits`.
//!
//! Runs one git command across every repository on a watchlist:
//! - `gits status` - fan `git status` out to all watched repositories
//! - `gits --watch <PATH>` / `--unwatch <PATH>` / `--prune` - edit the watchlist
//! - `gits --list` / `--template` / `--init` - inspect or create a watchlist
//!
//! Only the first argument is checked against the watchlist's restriction;
//! everything is forwarded to git after `--git-dir`/`--work-tree` for each
//! repository.

mod commands;
mod settings;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser};
use gits_dispatch::Schedule;
use tracing_subscriber::EnvFilter;

use commands::Action;
use settings::Settings;

/// Run one git command across every repository on a watchlist.
#[derive(Parser)]
#[command(name = "gits", version, about)]
struct Cli {
    /// Executable to run in each repository (name on PATH or full path).
    #[arg(long, default_value = "git")]
    git: String,

    /// Watchlist file (defaults to the first existing candidate path).
    #[arg(long, value_name = "PATH")]
    conf: Option<PathBuf>,

    /// Timeout per repository, e.g. "90s" or "30m". "0" disables it.
    #[arg(long, default_value = "30m", value_parser = parse_timeout)]
    timeout: Duration,

    /// Run repositories one at a time, in name order.
    #[arg(long, conflicts_with = "jobs")]
    sequential: bool,

    /// Run at most N repositories at once.
    #[arg(short, long, value_name = "N")]
    jobs: Option<NonZeroUsize>,

    /// Only run in the repository with this name.
    #[arg(long, value_name = "NAME")]
    key: Option<String>,

    /// Only run in repositories whose name matches this regex.
    #[arg(long = "match", value_name = "REGEX")]
    pattern: Option<String>,

    /// Log progress to stderr.
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    action: ActionArgs,

    /// Command and arguments forwarded to every repository.
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

/// One-shot watchlist operations. At most one may be given.
#[derive(Args)]
#[group(multiple = false, conflicts_with = "command")]
struct ActionArgs {
    /// Print a starter watchlist.
    #[arg(long)]
    template: bool,

    /// Write a starter watchlist to the config path.
    #[arg(long)]
    init: bool,

    /// Print the resolved watchlist path.
    #[arg(long)]
    conf_path: bool,

    /// Print the candidate watchlist paths.
    #[arg(long)]
    candidate_dirs: bool,

    /// Show the restriction and watched repositories.
    #[arg(long)]
    list: bool,

    /// Add the repository at PATH to the watchlist.
    #[arg(long, value_name = "PATH")]
    watch: Option<PathBuf>,

    /// Remove the repository named by PATH from the watchlist.
    #[arg(long, value_name = "PATH")]
    unwatch: Option<PathBuf>,

    /// Remove repositories whose work-tree no longer exists.
    #[arg(long)]
    prune: bool,
}

impl ActionArgs {
    fn requested(self) -> Option<Action> {
        if self.template {
            Some(Action::Template)
        } else if self.init {
            Some(Action::Init)
        } else if self.conf_path {
            Some(Action::ConfPath)
        } else if self.candidate_dirs {
            Some(Action::CandidateDirs)
        } else if self.list {
            Some(Action::List)
        } else if let Some(path) = self.watch {
            Some(Action::Watch(path))
        } else if let Some(path) = self.unwatch {
            Some(Action::Unwatch(path))
        } else if self.prune {
            Some(Action::Prune)
        } else {
            None
        }
    }
}

impl Cli {
    fn settings(&self) -> Settings {
        let schedule = match (self.sequential, self.jobs) {
            (true, _) => Schedule::Sequential,
            (false, Some(workers)) => Schedule::Pool(workers),
            (false, None) => Schedule::Concurrent,
        };
        Settings {
            conf_path: settings::resolve_conf_path(self.conf.clone()),
            program: self.git.clone(),
            timeout: self.timeout,
            schedule,
            key: self.key.clone(),
            pattern: self.pattern.clone(),
        }
    }
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    if s.trim() == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(s).map_err(|e| format!("invalid duration '{}': {}", s, e))
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "gits=info,gits_dispatch=info,gits_watchlist=info"
    } else {
        "warn"
    };
    // Logs go to stderr so they never mix into forwarded command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = cli.settings();
    tracing::debug!(conf = %settings.conf_path.display(), "resolved watchlist path");

    if cli.command.is_empty() {
        return match cli.action.requested() {
            Some(action) => {
                commands::execute(action, &settings)?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("{}", Cli::command().render_help());
                Ok(ExitCode::FAILURE)
            }
        };
    }

    commands::dispatch::execute(&settings, &cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn timeout_accepts_zero_and_units() {
        assert_eq!(parse_timeout("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_timeout("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_timeout("30m").unwrap(), Duration::from_secs(1800));
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn forwarded_args_keep_hyphens() {
        let cli = Cli::try_parse_from(["gits", "--sequential", "log", "--oneline", "-n", "3"])
            .unwrap();
        assert_eq!(cli.command, ["log", "--oneline", "-n", "3"]);
        assert_eq!(cli.settings().schedule, Schedule::Sequential);
    }

    #[test]
    fn jobs_selects_pool() {
        let cli = Cli::try_parse_from(["gits", "--jobs", "4", "fetch"]).unwrap();
        assert_eq!(
            cli.settings().schedule,
            Schedule::Pool(NonZeroUsize::new(4).unwrap())
        );
    }

    #[test]
    fn default_is_concurrent_with_timeout() {
        let cli = Cli::try_parse_from(["gits", "status"]).unwrap();
        let settings = cli.settings();
        assert_eq!(settings.schedule, Schedule::Concurrent);
        assert_eq!(settings.timeout, Duration::from_secs(30 * 60));
        assert_eq!(settings.program, "git");
    }

    #[test]
    fn sequential_conflicts_with_jobs() {
        assert!(Cli::try_parse_from(["gits", "--sequential", "--jobs", "2", "status"]).is_err());
    }

    #[test]
    fn jobs_must_be_positive() {
        assert!(Cli::try_parse_from(["gits", "--jobs", "0", "status"]).is_err());
    }

    #[test]
    fn actions_are_exclusive() {
        assert!(Cli::try_parse_from(["gits", "--list", "--prune"]).is_err());
        assert!(Cli::try_parse_from(["gits", "--list", "status"]).is_err());
    }

    #[test]
    fn action_is_recognized() {
        let cli = Cli::try_parse_from(["gits", "--watch", "/tmp/repo"]).unwrap();
        assert!(matches!(
            cli.action.requested(),
            Some(Action::Watch(path)) if path == PathBuf::from("/tmp/repo")
        ));
    }
}
