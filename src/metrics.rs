//! Metrics hooks for binders, tiers and monitors.

use std::fmt;

/// The freshness tier a bind was performed for.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Tier {
    /// A direct call to [`Binder::bind`](crate::Binder::bind).
    Direct,
    /// [`OptionsCache`](crate::OptionsCache): bound once, frozen forever.
    Cached,
    /// [`ScopedOptions`](crate::ScopedOptions): bound once per operation.
    Scoped,
    /// [`OptionsMonitor`](crate::OptionsMonitor): re-bound on every change.
    Monitored,
}

impl Tier {
    /// Returns a stable string representation of the tier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Cached => "cached",
            Self::Scoped => "scoped",
            Self::Monitored => "monitored",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error kinds for structured metrics reporting.
///
/// Use these stable, low-cardinality labels when recording metrics.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MetricsErrorKind {
    /// A bind failed because the section is missing.
    SectionNotFound,
    /// A bind failed because the target type is not bindable.
    Shape,
    /// A bind failed because a value could not be coerced.
    TypeMismatch,
    /// A monitor re-bind was rejected and the previous value retained.
    ReloadRejected,
    /// A subscriber callback panicked.
    SubscriberPanicked,
    /// Failed to join a background task during shutdown.
    SupervisorJoinFailed,
}

impl MetricsErrorKind {
    /// Returns a string representation of the error kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SectionNotFound => "section_not_found",
            Self::Shape => "shape",
            Self::TypeMismatch => "type_mismatch",
            Self::ReloadRejected => "reload_rejected",
            Self::SubscriberPanicked => "subscriber_panicked",
            Self::SupervisorJoinFailed => "supervisor_join_failed",
        }
    }
}

impl fmt::Display for MetricsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for recording metrics.
///
/// Implement this trait to integrate with your metrics system (e.g., Prometheus, `StatsD`).
///
/// # Example
///
/// ```
/// use tiered_settings::metrics::{MetricsErrorKind, MetricsRecorder, Tier};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// #[derive(Default)]
/// struct BindCounter(AtomicU64);
///
/// impl MetricsRecorder for BindCounter {
///     fn record_bind(&self, _tier: Tier) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
///     fn record_publish(&self) {}
///     fn record_suppressed(&self) {}
///     fn record_error(&self, kind: MetricsErrorKind) {
///         println!("error: {}", kind.as_str());
///     }
/// }
/// ```
pub trait MetricsRecorder: Send + Sync {
    /// Records a successful bind performed on behalf of `tier`.
    fn record_bind(&self, tier: Tier);

    /// Records that a monitor published a new value.
    fn record_publish(&self);

    /// Records that a monitor re-bind produced an identical value and was suppressed.
    fn record_suppressed(&self);

    /// Records an error with a structured error kind.
    fn record_error(&self, kind: MetricsErrorKind);
}
