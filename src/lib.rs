//! Bidirectional byte-stream channels ("tubes") over spawned processes
//!
//! This crate provides the raw-primitive contract of a tube backend
//! ([`Tube`]) and its process-backed implementation ([`ProcessTube`]): a
//! wrapper around a child process exposing stdin and merged stdout+stderr as
//! one duplex channel with non-blocking reads, timeout-bounded readiness
//! waits and explicit lifecycle control (half-close, termination, liveness
//! detection).
//!
//! Higher-level conveniences (buffering, line- or pattern-based receives)
//! belong to a generic layer built on top of the [`Tube`] trait and are out
//! of scope here.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tubing::{ProcessTube, Tube};
//!
//! let mut tube = ProcessTube::new(["cat"])?;
//! tube.send_raw(b"ping")?;
//! if let Some(data) = tube.recv_raw(4)? {
//!     assert_eq!(data, b"ping");
//! }
//! tube.close()?;
//! # Ok::<(), tubing::TubeError>(())
//! ```

pub mod error;
#[cfg(unix)]
pub mod process;
pub mod report;
pub mod timeout;
pub mod tube;

pub use error::{Result, TubeError};
#[cfg(unix)]
pub use process::{Direction, Invocation, ProcessSpec, ProcessTube};
pub use report::{NullReporter, Reporter, TracingReporter};
pub use timeout::Timeout;
pub use tube::Tube;
