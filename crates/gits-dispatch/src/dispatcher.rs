// dispatcher.rs - Fan one command line out across a target set.
//
// run() does, in order:
//
// 1. Policy check on the first argument. Rejection aborts before any spawn.
// 2. Empty target set: run once in the current directory, args untouched.
// 3. Otherwise build `--git-dir=<gitdir> --work-tree=<workdir> <args...>`
//    per target and schedule the invocations.
// 4. Collect per-target failures; a failure never stops other targets.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use gits_policy::Policy;
use gits_watchlist::{Target, TargetSet};

use crate::error::{DispatchError, InvokeError, TargetFailure};
use crate::invoker::Invoke;

/// Name used in failure reports for the no-watchlist fallback run.
pub const AMBIENT_TARGET: &str = ".";

const AMBIENT_NOTICE: &str = "not found git repositories: working on current directory";

/// How target invocations are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    /// One at a time, in target-name order.
    Sequential,
    /// One thread per target, all started at once.
    #[default]
    Concurrent,
    /// At most N invocations in flight.
    Pool(NonZeroUsize),
}

/// Outcome of one dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// How many invocations were made.
    pub invocations: usize,
    /// Failed targets, sorted by name.
    pub failures: Vec<TargetFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The two flags that point git at one target's repository.
///
/// Target paths are UTF-8 (the watchlist refuses anything else), so the
/// flags carry them unchanged.
pub fn location_args(target: &Target) -> [String; 2] {
    [
        format!("--git-dir={}", target.gitdir.display()),
        format!("--work-tree={}", target.workdir.display()),
    ]
}

struct Job<'t> {
    name: &'t str,
    preface: String,
    args: Vec<String>,
}

/// Runs a command against every target through an [`Invoke`] implementation.
pub struct Dispatcher<'a, I: Invoke> {
    invoker: &'a I,
    policy: &'a Policy,
    schedule: Schedule,
}

impl<'a, I: Invoke> Dispatcher<'a, I> {
    pub fn new(invoker: &'a I, policy: &'a Policy) -> Self {
        Self {
            invoker,
            policy,
            schedule: Schedule::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Run `args` (command first) once per target.
    ///
    /// Returns `Err` only for policy violations; per-target failures are in
    /// the report.
    pub fn run(&self, args: &[String], targets: &TargetSet) -> Result<DispatchReport, DispatchError> {
        // Callers may have checked already; this check is the one that counts.
        self.policy.check(args)?;

        if targets.is_empty() {
            self.invoker.notice(AMBIENT_NOTICE);
            let failures = self
                .invoker
                .invoke("", args)
                .err()
                .map(|error| TargetFailure {
                    target: AMBIENT_TARGET.to_string(),
                    error,
                })
                .into_iter()
                .collect();
            return Ok(DispatchReport {
                invocations: 1,
                failures,
            });
        }

        let jobs: Vec<Job<'_>> = targets
            .iter()
            .map(|(name, target)| Job {
                name,
                preface: format!("\n[{}]\n", name),
                args: location_args(target)
                    .into_iter()
                    .chain(args.iter().cloned())
                    .collect(),
            })
            .collect();

        tracing::info!(
            command = %args[0],
            targets = jobs.len(),
            schedule = ?self.schedule,
            "dispatching"
        );

        let outcomes: Vec<Result<(), InvokeError>> = match self.schedule {
            Schedule::Sequential => jobs.iter().map(|job| self.invoke(job)).collect(),
            Schedule::Concurrent => self.run_concurrent(&jobs),
            Schedule::Pool(workers) => self.run_pool(&jobs, workers),
        };

        let failures: Vec<TargetFailure> = jobs
            .iter()
            .zip(outcomes)
            .filter_map(|(job, outcome)| {
                outcome.err().map(|error| TargetFailure {
                    target: job.name.to_string(),
                    error,
                })
            })
            .collect();
        for failure in &failures {
            tracing::debug!(repository = %failure.target, error = %failure.error, "target failed");
        }

        Ok(DispatchReport {
            invocations: jobs.len(),
            failures,
        })
    }

    fn invoke(&self, job: &Job<'_>) -> Result<(), InvokeError> {
        tracing::debug!(repository = job.name, args = ?job.args, "invoking");
        self.invoker.invoke(&job.preface, &job.args)
    }

    fn run_concurrent(&self, jobs: &[Job<'_>]) -> Vec<Result<(), InvokeError>> {
        thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|job| scope.spawn(move || self.invoke(job)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(Err(InvokeError::Panicked)))
                .collect()
        })
    }

    fn run_pool(&self, jobs: &[Job<'_>], workers: NonZeroUsize) -> Vec<Result<(), InvokeError>> {
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<(), InvokeError>>>> =
            jobs.iter().map(|_| Mutex::new(None)).collect();

        let (next, slots_ref) = (&next, &slots);
        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers.get().min(jobs.len()))
                .map(|_| {
                    scope.spawn(move || loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(index) else { break };
                        let outcome = self.invoke(job);
                        *slots_ref[index].lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
                    })
                })
                .collect();
            // Joining here keeps a panicking worker from tearing down the scope.
            for handle in handles {
                let _ = handle.join();
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .unwrap_or(Err(InvokeError::Panicked))
            })
            .collect()
    }
}
