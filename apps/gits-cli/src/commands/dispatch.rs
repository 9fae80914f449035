// dispatch.rs - Forward a command to every watched repository.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use gits_dispatch::{Dispatcher, InputSource, Invoker, OutputMode, Schedule, SyncSink};

use crate::commands::watchlist::load;
use crate::settings::Settings;

pub fn execute(settings: &Settings, command: &[String]) -> anyhow::Result<ExitCode> {
    let mut watchlist = load(settings)?;

    // Checked here only to show the configuration alongside the rejection;
    // Dispatcher::run checks again and remains the gate for library callers.
    if let Err(e) = watchlist.restriction.check(command) {
        eprintln!(
            "Configuration file path:\n\t[{}]\n{}",
            settings.conf_path.display(),
            watchlist
        );
        eprintln!("This argument is not allowed: {:?}", command);
        return Err(e.into());
    }

    let configured = watchlist.repositories.len();
    if let Some(key) = &settings.key {
        watchlist.select(key)?;
    }
    if let Some(pattern) = &settings.pattern {
        watchlist.retain_matching(pattern)?;
    }
    // A filter that removes everything must not fall back to the current
    // directory; that fallback is only for an empty watchlist.
    if configured > 0 && watchlist.repositories.is_empty() {
        anyhow::bail!("no watched repository matches the given filter");
    }

    // Only a single process at a time may own the terminal: sequential runs
    // get stdin and write to stdout directly, parallel runs are captured.
    let (stdin, output) = match settings.schedule {
        Schedule::Sequential => (InputSource::Inherit, OutputMode::Stream),
        Schedule::Concurrent | Schedule::Pool(_) => (InputSource::Null, OutputMode::Capture),
    };

    let sink = Arc::new(SyncSink::stdio());
    let invoker = Invoker::new(&settings.program, Arc::clone(&sink))?
        .with_timeout(settings.timeout)
        .with_stdin(stdin)
        .with_output(output);
    tracing::info!(
        program = %invoker.program().display(),
        timeout = ?invoker.timeout(),
        repositories = watchlist.repositories.len(),
        "starting dispatch"
    );

    let report = Dispatcher::new(&invoker, &watchlist.restriction)
        .with_schedule(settings.schedule)
        .run(command, &watchlist.repositories)?;

    if report.is_success() {
        return Ok(ExitCode::SUCCESS);
    }

    sink.write_err_line("---------- found error ----------")
        .context("failed to report errors")?;
    for failure in &report.failures {
        sink.write_err_line(&failure.to_string())
            .context("failed to report errors")?;
    }
    Ok(ExitCode::FAILURE)
}
