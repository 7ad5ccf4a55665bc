//! Structured logging seam.
//!
//! Endpoint and pub/sub operations that fan out to multiple recipients log
//! and swallow per-recipient failures rather than aborting the whole
//! operation (see [`crate::pubsub::publish`]); this module is the trait they
//! log through, so tests can substitute a capturing logger instead of
//! depending on global `tracing` subscriber state.

/// A destination for the crate's internal diagnostic output.
pub trait Logger: Send + Sync {
    /// Unrecoverable or data-loss-risking condition.
    fn log_error(&self, message: &str);
    /// Recoverable condition worth the operator's attention, e.g. a single
    /// subscriber dropped during fan-out.
    fn log_warn(&self, message: &str);
    /// Routine operational detail.
    fn log_info(&self, message: &str);
    /// Verbose, developer-facing detail.
    fn log_debug(&self, message: &str);
    /// A tagged, higher-visibility event such as envelope tamper detection.
    fn log_highlight(&self, tag: &str, message: &str);
}

/// Reference [`Logger`] backed by the `tracing` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log_error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn log_warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn log_info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn log_debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn log_highlight(&self, tag: &str, message: &str) {
        tracing::info!(tag = %tag, "{message}");
    }
}
