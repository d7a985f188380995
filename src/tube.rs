//! The raw-primitive contract every tube backend supplies
//!
//! A tube is a bidirectional byte stream. The generic layer that owns
//! buffering, line-based receive helpers and timeout defaults depends only on
//! this trait, so process-backed, socket-backed and pipe-pair backends are
//! interchangeable underneath it.

use crate::error::Result;
use crate::timeout::Timeout;
#[cfg(unix)]
use std::os::unix::io::RawFd;

/// Raw backend operations of a bidirectional byte-stream channel
///
/// Timeouts are never errors: a receive that sees no data before its bound
/// reports `Ok(None)`, distinct from [`TubeError::EndOfStream`] which marks a
/// channel that will never produce data again.
///
/// [`TubeError::EndOfStream`]: crate::error::TubeError::EndOfStream
pub trait Tube {
    /// Read up to `max` bytes, bounded by the channel's default timeout.
    ///
    /// Returns `Ok(None)` when no data became ready within the bound, and a
    /// non-empty chunk (possibly shorter than `max`) otherwise. Fails with
    /// `EndOfStream` on EOF or when the read end has been closed, and keeps
    /// failing that way on every subsequent call.
    fn recv_raw(&mut self, max: usize) -> Result<Option<Vec<u8>>>;

    /// Write the whole buffer and flush it immediately.
    ///
    /// Fails with `EndOfStream` when the write end is closed or the peer is
    /// gone (broken pipe); low-level write failures are not surfaced as raw
    /// I/O errors.
    fn send_raw(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the read side to become ready, at most `timeout` long.
    ///
    /// The sole suspension point of a backend: it blocks only the calling
    /// thread, and only up to the bound ([`Timeout::Indefinite`] blocks until
    /// readiness). Returns true iff the descriptor became ready in time.
    fn can_recv_raw(&mut self, timeout: Timeout) -> Result<bool>;

    /// Replace the default timeout used by [`Tube::recv_raw`]
    fn set_timeout_raw(&mut self, timeout: Timeout);

    /// True while the peer has not been observed to be gone
    fn connected(&mut self) -> bool;

    /// Release the channel's resources; safe to call repeatedly
    fn close(&mut self) -> Result<()>;

    /// OS descriptor backing the read side, for external multiplexers.
    ///
    /// The caller gets readiness *observation* only, not ownership. Fails
    /// with a usage error while the channel is not connected.
    #[cfg(unix)]
    fn fileno(&mut self) -> Result<RawFd>;
}
