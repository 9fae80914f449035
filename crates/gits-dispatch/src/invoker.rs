// invoker.rs - One external process, optionally bounded by a deadline.
//
// The executable is resolved on PATH once, when the Invoker is built, so a
// misconfigured `--git` fails before any target runs. Output reaches the
// sink in one of two ways:
//
// - Capture: stdout/stderr are piped and buffered, then written as one
//   block when the process ends. Parallel runs overlap freely.
// - Stream: the sink is locked and the preface written before spawning.
//   Over a stdio sink the process inherits the terminal; otherwise its
//   pipes are forwarded chunk by chunk. The lock is held until it ends.
//
// Pipes are read on detached threads feeding a channel. At the deadline
// the process is killed and the call returns even if a descendant still
// holds the pipes open.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{DispatchError, InvokeError};
use crate::sink::SyncSink;

/// How often a running invocation checks whether its process has exited.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long output already in flight is still accepted after a kill.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// The seam between the dispatcher and process execution.
///
/// `Sync` because the dispatcher calls it from several threads at once.
pub trait Invoke: Sync {
    /// Run once with `args`, labelling the output with `preface`.
    fn invoke(&self, preface: &str, args: &[String]) -> Result<(), InvokeError>;

    /// Report an informational message to the user.
    fn notice(&self, _message: &str) {}
}

/// Where a spawned process reads its standard input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputSource {
    /// Share the caller's stdin (interactive prompts work).
    Inherit,
    /// Empty input; required when many processes run at once.
    #[default]
    Null,
}

impl InputSource {
    fn stdio(self) -> Stdio {
        match self {
            InputSource::Inherit => Stdio::inherit(),
            InputSource::Null => Stdio::null(),
        }
    }
}

/// How a process's output reaches the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Buffer everything; write one block when the process ends.
    #[default]
    Capture,
    /// Hold the sink for the whole run and pass output through as it comes.
    Stream,
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Out,
    Err,
}

type Chunk = (Channel, Vec<u8>);

/// Spawns the configured executable and reports to a shared [`SyncSink`].
pub struct Invoker {
    program: PathBuf,
    timeout: Option<Duration>,
    stdin: InputSource,
    output: OutputMode,
    sink: Arc<SyncSink>,
}

impl Invoker {
    /// Resolve `program` on PATH (or as a path) and bind it to `sink`.
    pub fn new(program: &str, sink: Arc<SyncSink>) -> Result<Self, DispatchError> {
        let resolved = which::which(program).map_err(|source| DispatchError::ExecutableNotFound {
            program: program.to_string(),
            source,
        })?;
        tracing::debug!(program, resolved = %resolved.display(), "resolved executable");
        Ok(Self {
            program: resolved,
            timeout: None,
            stdin: InputSource::default(),
            output: OutputMode::default(),
            sink,
        })
    }

    /// Bound every invocation by `timeout`. Zero means unbounded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_stdin(mut self, stdin: InputSource) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Absolute path of the resolved executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the executable once with `args`.
    ///
    /// A non-zero exit or timeout is reported even when writing the output
    /// also failed.
    pub fn exec(&self, preface: &str, args: &[String]) -> Result<(), InvokeError> {
        match self.output {
            OutputMode::Capture => self.exec_captured(preface, args),
            OutputMode::Stream => self.exec_streamed(preface, args),
        }
    }

    fn exec_captured(&self, preface: &str, args: &[String]) -> Result<(), InvokeError> {
        let own_group = self.owns_group();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let waited = self
            .spawn(args, Stdio::piped(), Stdio::piped(), own_group)
            .and_then(|mut child| {
                self.pump(&mut child, own_group, |channel, bytes| match channel {
                    Channel::Out => out.extend_from_slice(bytes),
                    Channel::Err => err.extend_from_slice(bytes),
                })
            });
        let written = self.sink.write_block(preface, &out, &err);
        conclude(waited, written)
    }

    fn exec_streamed(&self, preface: &str, args: &[String]) -> Result<(), InvokeError> {
        let own_group = self.owns_group();
        let mut guard = self.sink.lock();
        let mut written = guard.write_out(preface.as_bytes());

        let waited = if self.sink.is_stdio() {
            // The child writes straight to our stdout/stderr; nothing to forward.
            self.spawn(args, Stdio::inherit(), Stdio::inherit(), own_group)
                .and_then(|mut child| self.pump(&mut child, own_group, |_, _| {}))
        } else {
            self.spawn(args, Stdio::piped(), Stdio::piped(), own_group)
                .and_then(|mut child| {
                    self.pump(&mut child, own_group, |channel, bytes| {
                        let result = match channel {
                            Channel::Out => guard.write_out(bytes),
                            Channel::Err => guard.write_err(bytes),
                        };
                        if written.is_ok() {
                            written = result;
                        }
                    })
                })
        };
        conclude(waited, written)
    }

    // A child in its own group cannot read the terminal, so only detached
    // (null stdin) runs get one.
    fn owns_group(&self) -> bool {
        self.timeout.is_some() && self.stdin == InputSource::Null
    }

    fn spawn(
        &self,
        args: &[String],
        stdout: Stdio,
        stderr: Stdio,
        own_group: bool,
    ) -> Result<Child, InvokeError> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(self.stdin.stdio())
            .stdout(stdout)
            .stderr(stderr);
        if own_group {
            isolate_group(&mut command);
        }

        let child = command.spawn().map_err(|source| InvokeError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;
        tracing::debug!(pid = child.id(), program = %self.program.display(), ?args, "spawned");
        Ok(child)
    }

    /// Wait for `child`, handing output to `forward` as it arrives.
    ///
    /// Without a deadline this returns once the process has exited and its
    /// pipes are closed. With one, it returns at the deadline regardless.
    fn pump(
        &self,
        child: &mut Child,
        own_group: bool,
        mut forward: impl FnMut(Channel, &[u8]),
    ) -> Result<ExitStatus, InvokeError> {
        let chunks = spawn_readers(child);
        let limit = self.timeout.map(|timeout| (timeout, Instant::now() + timeout));
        let mut status = None;
        let mut open = true;

        loop {
            if status.is_none() {
                status = child.try_wait()?;
            }
            if let (Some(status), false) = (status, open) {
                return Ok(status);
            }

            let now = Instant::now();
            if let Some((timeout, deadline)) = limit {
                if now >= deadline {
                    return match status {
                        None => {
                            tracing::warn!(pid = child.id(), ?timeout, "deadline passed, killing process");
                            terminate(child, own_group);
                            drain_pending(&chunks, &mut forward);
                            Err(InvokeError::Timeout { timeout })
                        }
                        Some(status) => {
                            tracing::warn!(?timeout, "process exited but its output is still open, abandoning it");
                            if own_group {
                                kill_group(child);
                            }
                            drain_pending(&chunks, &mut forward);
                            Ok(status)
                        }
                    };
                }
            }

            let wait = limit.map_or(POLL_INTERVAL, |(_, deadline)| POLL_INTERVAL.min(deadline - now));
            if open {
                match chunks.recv_timeout(wait) {
                    Ok((channel, bytes)) => forward(channel, &bytes),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => open = false,
                }
            } else if limit.is_none() {
                status = Some(child.wait()?);
            } else {
                thread::sleep(wait);
            }
        }
    }
}

impl Invoke for Invoker {
    fn invoke(&self, preface: &str, args: &[String]) -> Result<(), InvokeError> {
        self.exec(preface, args)
    }

    fn notice(&self, message: &str) {
        if let Err(e) = self.sink.write_err_line(message) {
            tracing::warn!(error = %e, "failed to write notice");
        }
    }
}

fn conclude(waited: Result<ExitStatus, InvokeError>, written: io::Result<()>) -> Result<(), InvokeError> {
    let outcome = waited.and_then(|status| {
        if status.success() {
            Ok(())
        } else {
            Err(InvokeError::Exit { status })
        }
    });
    match (outcome, written) {
        (Ok(()), written) => written.map_err(InvokeError::from),
        (Err(e), Err(write_error)) => {
            tracing::warn!(error = %write_error, "failed to write output");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
    }
}

fn spawn_readers(child: &mut Child) -> Receiver<Chunk> {
    let (tx, rx) = mpsc::channel();
    if let Some(pipe) = child.stdout.take() {
        read_into(pipe, Channel::Out, tx.clone());
    }
    if let Some(pipe) = child.stderr.take() {
        read_into(pipe, Channel::Err, tx);
    }
    rx
}

// Detached: a reader blocked on a pipe some descendant still holds must not
// hold up the caller.
fn read_into(mut pipe: impl Read + Send + 'static, channel: Channel, tx: Sender<Chunk>) {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send((channel, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!(error = %e, "output pipe closed early");
                    break;
                }
            }
        }
    });
}

fn drain_pending(chunks: &Receiver<Chunk>, forward: &mut impl FnMut(Channel, &[u8])) {
    let until = Instant::now() + DRAIN_GRACE;
    while let Some(left) = until.checked_duration_since(Instant::now()) {
        match chunks.recv_timeout(left) {
            Ok((channel, bytes)) => forward(channel, &bytes),
            Err(_) => break,
        }
    }
}

fn terminate(child: &mut Child, own_group: bool) {
    if own_group {
        kill_group(child);
    }
    // Best-effort: the process may have exited on its own meanwhile.
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn isolate_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_group(child: &Child) {
    // Safety: the child leads its own process group (process_group(0)), so
    // a negative pid addresses exactly that group.
    unsafe {
        libc::kill(-(child.id() as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sink::SharedBuffer;

    fn invoker(program: &str) -> (Invoker, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let sink = Arc::new(SyncSink::new(out.clone(), err.clone()));
        (Invoker::new(program, sink).unwrap(), out, err)
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// A writer whose every write fails, like a closed pipe.
    struct ClosedPipe;

    impl io::Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn closed_invoker(program: &str) -> Invoker {
        let sink = Arc::new(SyncSink::new(ClosedPipe, ClosedPipe));
        Invoker::new(program, sink).unwrap()
    }

    #[test]
    fn unknown_executable_fails_at_construction() {
        let sink = Arc::new(SyncSink::new(SharedBuffer::new(), SharedBuffer::new()));
        let result = Invoker::new("gits-definitely-not-installed", sink);
        assert!(matches!(
            result,
            Err(DispatchError::ExecutableNotFound { program, .. }) if program == "gits-definitely-not-installed"
        ));
    }

    #[test]
    fn resolves_to_absolute_path() {
        let (inv, _, _) = invoker("echo");
        assert!(inv.program().is_absolute());
    }

    #[test]
    fn writes_preface_then_output() {
        let (inv, out, _) = invoker("echo");
        inv.exec("\n[app]\n", &args(&["hello", "world"])).unwrap();
        assert_eq!(out.contents(), "\n[app]\nhello world\n");
    }

    #[test]
    fn stderr_goes_to_error_stream() {
        let (inv, out, err) = invoker("sh");
        inv.exec("[x]\n", &args(&["-c", "echo fine; echo oops >&2"]))
            .unwrap();
        assert_eq!(out.contents(), "[x]\nfine\n");
        assert_eq!(err.contents(), "oops\n");
    }

    #[test]
    fn nonzero_exit_is_reported_with_output_kept() {
        let (inv, out, _) = invoker("sh");
        let result = inv.exec("[bad]\n", &args(&["-c", "echo partial; exit 3"]));

        match result {
            Err(InvokeError::Exit { status }) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected Exit, got {:?}", other),
        }
        assert_eq!(out.contents(), "[bad]\npartial\n");
    }

    #[test]
    fn timeout_kills_process() {
        let (inv, _, _) = invoker("sleep");
        let inv = inv.with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let result = inv.exec("", &args(&["5"]));

        assert!(matches!(result, Err(InvokeError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn timeout_reaches_grandchildren() {
        let (inv, _, _) = invoker("sh");
        let inv = inv.with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let result = inv.exec("", &args(&["-c", "sleep 5; echo done"]));

        assert!(matches!(result, Err(InvokeError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn zero_timeout_is_unbounded() {
        let (inv, _, _) = invoker("sleep");
        let inv = inv.with_timeout(Duration::ZERO);
        assert_eq!(inv.timeout(), None);
        inv.exec("", &args(&["0.2"])).unwrap();
    }

    #[test]
    fn finishes_before_deadline() {
        let (inv, out, _) = invoker("echo");
        let inv = inv.with_timeout(Duration::from_secs(10));
        inv.exec("", &args(&["quick"])).unwrap();
        assert_eq!(out.contents(), "quick\n");
    }

    #[test]
    fn null_stdin_reads_empty() {
        let (inv, out, _) = invoker("cat");
        let inv = inv.with_stdin(InputSource::Null);
        inv.exec("[cat]\n", &[]).unwrap();
        assert_eq!(out.contents(), "[cat]\n");
    }

    #[test]
    fn notice_goes_to_error_stream() {
        let (inv, out, err) = invoker("echo");
        inv.notice("heads up");
        assert_eq!(err.contents(), "heads up\n");
        assert!(out.contents().is_empty());
    }

    #[test]
    fn timeout_returns_with_inherited_stdin() {
        // Inherited stdin keeps the child in our process group, so only the
        // shell is killed and its `sleep` lives on holding the pipes.
        for output in [OutputMode::Capture, OutputMode::Stream] {
            let (inv, _, _) = invoker("sh");
            let inv = inv
                .with_timeout(Duration::from_millis(200))
                .with_stdin(InputSource::Inherit)
                .with_output(output);

            let started = Instant::now();
            let result = inv.exec("", &args(&["-c", "sleep 4; echo done"]));

            assert!(matches!(result, Err(InvokeError::Timeout { .. })), "{:?}", output);
            assert!(started.elapsed() < Duration::from_secs(2), "{:?}", output);
        }
    }

    #[test]
    fn timeout_keeps_output_written_before_the_kill() {
        let (inv, out, _) = invoker("sh");
        let inv = inv
            .with_timeout(Duration::from_millis(300))
            .with_stdin(InputSource::Inherit);

        let result = inv.exec("[slow]\n", &args(&["-c", "echo started; sleep 4"]));

        assert!(matches!(result, Err(InvokeError::Timeout { .. })));
        assert_eq!(out.contents(), "[slow]\nstarted\n");
    }

    #[test]
    fn streamed_output_appears_while_running() {
        let (inv, out, _) = invoker("sh");
        let inv = inv.with_output(OutputMode::Stream);

        thread::scope(|scope| {
            let running = scope.spawn(|| inv.exec("\n[app]\n", &args(&["-c", "echo 'Password:'; sleep 1"])));

            thread::sleep(Duration::from_millis(500));
            assert_eq!(out.contents(), "\n[app]\nPassword:\n");

            running.join().unwrap().unwrap();
        });
    }

    #[test]
    fn streamed_runs_hold_the_sink() {
        let (inv, out, _) = invoker("sh");
        let inv = inv.with_output(OutputMode::Stream);
        let script = args(&["-c", "echo one; sleep 0.2; echo two"]);

        thread::scope(|scope| {
            let first = scope.spawn(|| inv.exec("[a]\n", &script));
            let second = scope.spawn(|| inv.exec("[b]\n", &script));
            first.join().unwrap().unwrap();
            second.join().unwrap().unwrap();
        });

        let text = out.contents();
        assert!(
            text == "[a]\none\ntwo\n[b]\none\ntwo\n" || text == "[b]\none\ntwo\n[a]\none\ntwo\n",
            "interleaved: {:?}",
            text
        );
    }

    #[test]
    fn streamed_stderr_goes_to_error_stream() {
        let (inv, out, err) = invoker("sh");
        let inv = inv.with_output(OutputMode::Stream);
        inv.exec("[x]\n", &args(&["-c", "echo fine; echo oops >&2"]))
            .unwrap();
        assert_eq!(out.contents(), "[x]\nfine\n");
        assert_eq!(err.contents(), "oops\n");
    }

    #[test]
    fn exit_status_wins_over_sink_failure() {
        for output in [OutputMode::Capture, OutputMode::Stream] {
            let inv = closed_invoker("sh").with_output(output);
            let result = inv.exec("[bad]\n", &args(&["-c", "echo partial; exit 3"]));
            match result {
                Err(InvokeError::Exit { status }) => assert_eq!(status.code(), Some(3)),
                other => panic!("expected Exit for {:?}, got {:?}", output, other),
            }
        }
    }

    #[test]
    fn timeout_wins_over_sink_failure() {
        let inv = closed_invoker("sleep").with_timeout(Duration::from_millis(100));
        let result = inv.exec("[slow]\n", &args(&["5"]));
        assert!(matches!(result, Err(InvokeError::Timeout { .. })));
    }

    #[test]
    fn sink_failure_is_reported_for_successful_run() {
        let inv = closed_invoker("echo");
        let result = inv.exec("[ok]\n", &args(&["hello"]));
        assert!(matches!(result, Err(InvokeError::Io(_))));
    }
}
