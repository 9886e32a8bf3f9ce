use crate::error::BindError;
use thiserror::Error;

/// Errors returned by [`OptionsMonitor`](super::OptionsMonitor).
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum MonitorError {
    /// The initial bind failed and the monitor was not created.
    ///
    /// When the builder is configured with
    /// [`wait_for_initial_bind`](super::OptionsMonitorBuilder::wait_for_initial_bind),
    /// this is only returned if the source closes before a bind succeeds.
    #[error("initial bind failed: {0}")]
    InitialBind(#[source] BindError),

    /// The monitor was shut down.
    #[error("options monitor is closed")]
    Closed,

    /// Shutdown timeout exceeded.
    ///
    /// Returned by `shutdown_with_timeout()` when the background supervisor does not
    /// stop within the given timeout and has to be aborted.
    #[error("shutdown timeout exceeded")]
    ShutdownTimeout,
}

/// A re-bind that was rejected by a running monitor.
///
/// The monitor keeps serving its previous value; failures are only reported on the
/// side channel returned by
/// [`OptionsMonitor::reload_errors`](super::OptionsMonitor::reload_errors).
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadFailure {
    /// Revision of the configuration tree that failed to bind.
    pub revision: u64,
    /// Why the bind failed.
    pub error: BindError,
}
