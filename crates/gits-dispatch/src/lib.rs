//! # gits-dispatch
//!
//! Runs one command line against every repository in a watchlist.
//!
//! The pieces, leaves first:
//!
//! - [`SyncSink`] - the shared stdout/stderr pair. A captured invocation
//!   writes its preface and output as one atomic block; a streamed one
//!   holds the lock for its whole run. Either way runs never interleave.
//! - [`Invoker`] - spawns a single process with an optional deadline and
//!   hands its output to the sink, captured or streamed per
//!   [`OutputMode`]. Implements the [`Invoke`] seam.
//! - [`Dispatcher`] - checks the command against the [`Policy`], injects
//!   each target's `--git-dir`/`--work-tree` flags and schedules the
//!   invocations sequentially, one thread per target, or on a bounded pool.
//!
//! A failing target never stops its siblings; failures are collected into
//! a [`DispatchReport`].
//!
//! [`Policy`]: gits_policy::Policy

pub mod dispatcher;
pub mod error;
pub mod invoker;
pub mod sink;

pub use dispatcher::{location_args, DispatchReport, Dispatcher, Schedule, AMBIENT_TARGET};
pub use error::{DispatchError, InvokeError, TargetFailure};
pub use invoker::{InputSource, Invoke, Invoker, OutputMode};
pub use sink::{SharedBuffer, SinkGuard, SyncSink};
