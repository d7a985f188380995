//! Lifecycle notification sinks
//!
//! Channels report start/exit/stop events through an injected [`Reporter`]
//! rather than a process-wide logger, so the core carries no global mutable
//! state and tests can observe (or silence) notifications.

use tracing::{error, info, Level};

/// Sink for channel lifecycle notifications
pub trait Reporter {
    /// Routine lifecycle event (exit observed, channel stopped)
    fn info(&self, message: &str);

    /// Positive milestone (program started)
    fn success(&self, message: &str);

    /// Failure worth surfacing to an operator
    fn error(&self, message: &str);
}

/// Reporter that forwards notifications to `tracing` events
///
/// The configured level is a verbosity ceiling: notifications coarser than it
/// are emitted, the rest are dropped. `Level::ERROR` keeps only failures.
#[derive(Debug, Clone, Copy)]
pub struct TracingReporter {
    level: Level,
}

impl TracingReporter {
    /// Create a reporter that emits events up to the given verbosity
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl Reporter for TracingReporter {
    fn info(&self, message: &str) {
        if Level::INFO <= self.level {
            info!("{message}");
        }
    }

    fn success(&self, message: &str) {
        if Level::INFO <= self.level {
            info!("{message}");
        }
    }

    fn error(&self, message: &str) {
        if Level::ERROR <= self.level {
            error!("{message}");
        }
    }
}

/// Reporter that discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_reporter_is_silent() {
        let reporter = NullReporter;
        reporter.info("ignored");
        reporter.success("ignored");
        reporter.error("ignored");
    }

    #[test]
    fn test_tracing_reporter_levels() {
        // Emission is gated on the ceiling; no subscriber needed to exercise it.
        let quiet = TracingReporter::new(Level::ERROR);
        quiet.info("dropped");
        quiet.error("kept");

        let verbose = TracingReporter::default();
        verbose.success("kept");
    }
}
