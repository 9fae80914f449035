// sink.rs - Output streams shared by every invocation of one dispatch.
//
// All writes go through a single mutex. A captured invocation writes its
// preface, stdout and stderr under one acquisition; a streamed invocation
// holds a SinkGuard for its whole run. Either way two targets' output can
// never interleave.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Streams {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

/// A stdout/stderr pair guarded by one lock.
pub struct SyncSink {
    streams: Mutex<Streams>,
    stdio: bool,
}

/// Exclusive access to a [`SyncSink`] until dropped.
pub struct SinkGuard<'a>(MutexGuard<'a, Streams>);

impl SinkGuard<'_> {
    /// Write to the output stream and flush.
    pub fn write_out(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.out.write_all(bytes)?;
        self.0.out.flush()
    }

    /// Write to the error stream and flush.
    pub fn write_err(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.err.write_all(bytes)?;
        self.0.err.flush()
    }
}

impl SyncSink {
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            streams: Mutex::new(Streams {
                out: Box::new(out),
                err: Box::new(err),
            }),
            stdio: false,
        }
    }

    /// Sink over the process's own stdout and stderr.
    pub fn stdio() -> Self {
        Self {
            stdio: true,
            ..Self::new(io::stdout(), io::stderr())
        }
    }

    /// Whether the streams are this process's own stdout and stderr, so a
    /// child holding the lock may inherit them directly.
    pub fn is_stdio(&self) -> bool {
        self.stdio
    }

    /// Take the lock until the returned guard is dropped.
    pub fn lock(&self) -> SinkGuard<'_> {
        SinkGuard(self.streams())
    }

    /// Write one invocation's output as a single uninterrupted block.
    ///
    /// `preface` and `stdout` go to the output stream, `stderr` to the error
    /// stream; no other writer can run in between.
    pub fn write_block(&self, preface: &str, stdout: &[u8], stderr: &[u8]) -> io::Result<()> {
        let mut streams = self.streams();
        streams.out.write_all(preface.as_bytes())?;
        streams.out.write_all(stdout)?;
        streams.out.flush()?;
        if !stderr.is_empty() {
            streams.err.write_all(stderr)?;
            streams.err.flush()?;
        }
        Ok(())
    }

    /// Write a line to the error stream.
    pub fn write_err_line(&self, line: &str) -> io::Result<()> {
        let mut streams = self.streams();
        writeln!(streams.err, "{}", line)?;
        streams.err.flush()
    }

    // A panic while holding the lock leaves the streams usable; keep going.
    fn streams(&self) -> MutexGuard<'_, Streams> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory writer that can be cloned and read back, e.g. to capture what
/// a [`SyncSink`] produced.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&data).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn capture() -> (SyncSink, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        (SyncSink::new(out.clone(), err.clone()), out, err)
    }

    #[test]
    fn block_routes_streams() {
        let (sink, out, err) = capture();
        sink.write_block("\n[app]\n", b"clean\n", b"warning\n").unwrap();

        assert_eq!(out.contents(), "\n[app]\nclean\n");
        assert_eq!(err.contents(), "warning\n");
    }

    #[test]
    fn err_line_appends_newline() {
        let (sink, out, err) = capture();
        sink.write_err_line("no repositories").unwrap();

        assert_eq!(err.contents(), "no repositories\n");
        assert!(out.contents().is_empty());
    }

    #[test]
    fn guard_blocks_other_writers() {
        let (sink, out, _err) = capture();
        let sink = Arc::new(sink);

        let mut guard = sink.lock();
        guard.write_out(b"[held]\n").unwrap();
        let other = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || sink.write_block("[other]\n", b"", b"").unwrap())
        };
        thread::sleep(std::time::Duration::from_millis(100));
        guard.write_out(b"still mine\n").unwrap();
        drop(guard);
        other.join().unwrap();

        assert_eq!(out.contents(), "[held]\nstill mine\n[other]\n");
        assert!(!sink.is_stdio());
    }

    #[test]
    fn concurrent_blocks_stay_contiguous() {
        let (sink, out, _err) = capture();
        let sink = Arc::new(sink);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    let body: String = (0..50).map(|n| format!("t{} line {}\n", i, n)).collect();
                    sink.write_block(&format!("[t{}]\n", i), body.as_bytes(), b"")
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let text = out.contents();
        let mut current: Option<String> = None;
        let mut seen = 0;
        for line in text.lines() {
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(name.to_string());
                seen += 1;
                continue;
            }
            let owner = current.as_deref().expect("body before any preface");
            assert!(line.starts_with(owner), "line {:?} inside block {}", line, owner);
        }
        assert_eq!(seen, 8);
    }
}
