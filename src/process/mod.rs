//! Process-backed tube channel
//!
//! [`ProcessTube`] wraps a spawned child process and exposes its standard
//! streams as one duplex byte channel: the write side feeds the child's
//! stdin, the read side drains a single pipe carrying the child's stdout and
//! stderr merged. The read end is switched to non-blocking mode at
//! construction so a bounded receive never blocks past data availability.
//!
//! ## Lifecycle
//!
//! The channel passively notices child termination before every I/O
//! operation, records the exit status exactly once, and reports it through
//! the injected [`Reporter`]. Each pipe end can be half-closed independently;
//! once both are gone the channel closes fully, force-killing the child if it
//! is still running. `close()` is idempotent and never fails for an
//! already-dead process.
//!
//! ## Concurrency
//!
//! Single-threaded and synchronous. The only suspension point is the
//! readiness wait in [`Tube::can_recv_raw`], bounded by the given
//! [`Timeout`]; everything else returns without waiting on I/O readiness.

// Allow unsafe code for this module since non-blocking pipe setup requires
// libc::fcntl() calls
#![allow(unsafe_code)]

use crate::error::{Result, TubeError};
use crate::report::{Reporter, TracingReporter};
use crate::timeout::Timeout;
use crate::tube::Tube;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{pipe, Pid};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStdin, ExitStatus, Stdio};
use tracing::{debug, warn};

pub mod config;

pub use config::{Invocation, ProcessSpec, DEFAULT_SHELL};

/// Chunk size used when draining a channel to EOF
const DRAIN_CHUNK: usize = 4096;

/// Which half of the channel a [`ProcessTube::shutdown`] closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The outgoing half: the local write end feeding the child's stdin.
    /// The child observes EOF on its stdin afterwards.
    Out,
    /// The incoming half: the local read end draining the child's output
    In,
}

/// A duplex byte channel backed by a spawned child process
///
/// Owns the child handle and both pipe ends exclusively. See the module
/// documentation for lifecycle and concurrency notes.
pub struct ProcessTube {
    /// Identity of the program being run, for notifications
    program: String,
    /// The spawned child (pid, non-blocking exit polling, kill)
    child: Child,
    /// Write end to the child's stdin; `None` once closed
    stdin: Option<ChildStdin>,
    /// Read end of the merged stdout+stderr pipe; `None` once closed
    stdout: Option<File>,
    /// Set exactly once when termination is first detected; never reset
    exit_observed: bool,
    /// Exit code cached when `exit_observed` flips
    exit_code: Option<i32>,
    /// Default bound for readiness waits in `recv_raw`
    timeout: Timeout,
    /// Notification sink for start/exit/stop events
    reporter: Box<dyn Reporter>,
}

impl ProcessTube {
    /// Spawn an argument list with default timeout and reporting
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_spec(ProcessSpec::new(argv), Box::<TracingReporter>::default())
    }

    /// Spawn a shell command line with default timeout and reporting
    pub fn shell(command_line: impl Into<String>) -> Result<Self> {
        Self::from_spec(
            ProcessSpec::shell(command_line),
            Box::<TracingReporter>::default(),
        )
    }

    /// Spawn the child a spec describes and wire up the channel.
    ///
    /// The child's stdout and stderr both land in one channel-owned pipe;
    /// there is no separate stderr stream. The read end is non-blocking
    /// before this returns. Emits a "started" notification on success.
    pub fn from_spec(spec: ProcessSpec, reporter: Box<dyn Reporter>) -> Result<Self> {
        let program = spec.program()?;
        let mut command = spec.command()?;

        let (read_end, write_end) = pipe()
            .map_err(|e| TubeError::Spawn(format!("failed to create output pipe: {e}")))?;
        let write_end_stderr = write_end
            .try_clone()
            .map_err(|e| TubeError::Spawn(format!("failed to clone output pipe: {e}")))?;

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::from(write_end))
            .stderr(Stdio::from(write_end_stderr));

        let mut child = command.spawn().map_err(|e| {
            reporter.error(&format!("Failed to start program {program:?}: {e}"));
            TubeError::Spawn(format!("failed to spawn {program:?}: {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TubeError::Spawn("child stdin was not piped".to_string()))?;

        // The parent's write copies were consumed by the spawn; the read end
        // sees EOF once the child (and only the child) closes its side.
        let stdout = File::from(read_end);
        set_nonblocking(stdout.as_raw_fd())
            .map_err(|e| TubeError::Spawn(format!("failed to set pipe non-blocking: {e}")))?;

        debug!(pid = child.id(), program = %program, "spawned child process");
        reporter.success(&format!("Started program {program:?}"));

        Ok(Self {
            program,
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            exit_observed: false,
            exit_code: None,
            timeout: spec.timeout,
            reporter,
        })
    }

    /// Process ID of the child
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Identity of the program being run
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Poll the child's exit status without blocking.
    ///
    /// `Ok(None)` while the child runs. On the first transition to
    /// terminated, caches the code, marks the exit observed and emits one
    /// "exited" notification; afterwards returns the cached code silently.
    /// Pipe ends are untouched.
    pub fn poll_exit(&mut self) -> Result<Option<i32>> {
        if let Some(code) = self.exit_code {
            return Ok(Some(code));
        }
        match self.child.try_wait()? {
            Some(status) => {
                let code = exit_code_of(&status);
                self.record_exit(code);
                self.reporter.info(&format!(
                    "Program {:?} stopped with exit code {}",
                    self.program, code
                ));
                Ok(Some(code))
            }
            None => Ok(None),
        }
    }

    /// Block until the child exits, record the status and return its code.
    ///
    /// Notification behavior matches [`ProcessTube::poll_exit`]: at most one
    /// "exited" event per channel.
    pub fn wait_exit(&mut self) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self.child.wait()?;
        let code = exit_code_of(&status);
        self.record_exit(code);
        self.reporter.info(&format!(
            "Program {:?} stopped with exit code {}",
            self.program, code
        ));
        Ok(code)
    }

    /// Close one half of the channel.
    ///
    /// Once both halves are closed the channel closes fully, which includes
    /// terminating a still-running child.
    pub fn shutdown(&mut self, direction: Direction) -> Result<()> {
        match direction {
            Direction::Out => {
                self.stdin = None;
            }
            Direction::In => {
                self.stdout = None;
            }
        }
        if self.stdin.is_none() && self.stdout.is_none() {
            self.close()?;
        }
        Ok(())
    }

    /// Alias for [`Tube::close`]
    pub fn kill(&mut self) -> Result<()> {
        self.close()
    }

    /// Feed optional input to the child, half-close stdin, drain the merged
    /// output to EOF and reap the child.
    ///
    /// Readiness waits during the drain are indefinite; the child's exit is
    /// what ends them (via EOF on the merged pipe).
    pub fn communicate(&mut self, input: Option<&[u8]>) -> Result<Vec<u8>> {
        if let Some(data) = input {
            self.send_raw(data)?;
        }
        // Drop only the write end here; shutdown() would escalate to a full
        // close (and a kill) when the read end is already gone.
        self.stdin = None;

        let mut output = Vec::new();
        while self.stdout.is_some() {
            match self.recv_bounded(DRAIN_CHUNK, Timeout::Indefinite) {
                Ok(Some(chunk)) => output.extend_from_slice(&chunk),
                Ok(None) => continue,
                Err(TubeError::EndOfStream) => break,
                Err(e) => return Err(e),
            }
        }
        self.wait_exit()?;
        Ok(output)
    }

    /// Record a terminal state; monotonic, called at most once per channel
    fn record_exit(&mut self, code: i32) {
        self.exit_observed = true;
        self.exit_code = Some(code);
    }

    /// Timeout-bounded read of up to `max` bytes from the merged output pipe
    fn recv_bounded(&mut self, max: usize, timeout: Timeout) -> Result<Option<Vec<u8>>> {
        self.poll_exit()?;

        if self.stdout.is_none() {
            return Err(TubeError::EndOfStream);
        }
        if max == 0 {
            return Ok(None);
        }
        if !self.can_recv_raw(timeout)? {
            return Ok(None);
        }

        let Some(stdout) = self.stdout.as_mut() else {
            return Err(TubeError::EndOfStream);
        };
        // Readiness was observed, so this read returns data or EOF without
        // blocking; WouldBlock can still occur if readiness raced with exit.
        let mut buffer = vec![0u8; max];
        match stdout.read(&mut buffer) {
            Ok(0) => {
                debug!(program = %self.program, "read end reached EOF");
                self.stdout = None;
                Err(TubeError::EndOfStream)
            }
            Ok(n) => {
                buffer.truncate(n);
                Ok(Some(buffer))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(TubeError::Io(e)),
        }
    }
}

impl Tube for ProcessTube {
    fn recv_raw(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        let timeout = self.timeout;
        self.recv_bounded(max, timeout)
    }

    fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.poll_exit()?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TubeError::EndOfStream);
        };
        // A dead peer surfaces as EndOfStream, never as a raw I/O error.
        if let Err(e) = stdin.write_all(data).and_then(|()| stdin.flush()) {
            debug!(program = %self.program, error = %e, "write to child failed");
            return Err(TubeError::EndOfStream);
        }
        Ok(())
    }

    fn can_recv_raw(&mut self, timeout: Timeout) -> Result<bool> {
        let Some(stdout) = self.stdout.as_ref() else {
            return Err(TubeError::EndOfStream);
        };
        let mut fds = [PollFd::new(stdout.as_fd(), PollFlags::POLLIN)];
        loop {
            match poll(&mut fds, poll_timeout(timeout)) {
                // n > 0 also covers POLLHUP at EOF; the subsequent read
                // observes it as a zero-length result.
                Ok(n) => return Ok(n > 0),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(TubeError::Io(io::Error::from(e))),
            }
        }
    }

    fn set_timeout_raw(&mut self, timeout: Timeout) {
        self.timeout = timeout;
    }

    fn connected(&mut self) -> bool {
        matches!(self.poll_exit(), Ok(None))
    }

    /// Close the channel, terminating the child if it is still running.
    ///
    /// Kill errors for an already-gone process are suppressed; repeated
    /// calls are no-ops. No live child survives this call.
    fn close(&mut self) -> Result<()> {
        if let Err(e) = self.poll_exit() {
            warn!(program = %self.program, error = %e, "liveness refresh failed during close");
        }

        if !self.exit_observed {
            let pid = Pid::from_raw(self.child.id() as i32);
            match kill(pid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) | Err(Errno::EPERM) => {}
                Err(e) => {
                    warn!(program = %self.program, error = %e, "failed to kill child process");
                }
            }
            match self.child.wait() {
                Ok(status) => self.record_exit(exit_code_of(&status)),
                Err(e) => {
                    warn!(program = %self.program, error = %e, "failed to reap child process");
                    self.exit_observed = true;
                }
            }
            self.reporter
                .info(&format!("Stopped program {:?}", self.program));
        }

        self.stdin = None;
        self.stdout = None;
        Ok(())
    }

    fn fileno(&mut self) -> Result<RawFd> {
        if !self.connected() {
            return Err(TubeError::Usage(
                "a stopped program has no descriptor".to_string(),
            ));
        }
        self.stdout
            .as_ref()
            .map(|file| file.as_raw_fd())
            .ok_or_else(|| TubeError::Usage("the read end has been closed".to_string()))
    }
}

impl std::fmt::Debug for ProcessTube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTube")
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .field("stdin_open", &self.stdin.is_some())
            .field("stdout_open", &self.stdout.is_some())
            .field("exit_observed", &self.exit_observed)
            .field("exit_code", &self.exit_code)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Exit code of a reaped child; signal deaths map to the negated signal
/// number, mirroring the usual Unix reporting convention
fn exit_code_of(status: &ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(0))
}

/// Translate a [`Timeout`] to the bound `poll(2)` expects
fn poll_timeout(timeout: Timeout) -> PollTimeout {
    match timeout {
        Timeout::Indefinite => PollTimeout::NONE,
        Timeout::Bounded(duration) => {
            let millis = duration.as_millis().min(i32::MAX as u128) as i32;
            PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX)
        }
    }
}

/// Switch a descriptor to non-blocking mode
fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // Safety: plain fcntl flag manipulation on a descriptor we own
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
