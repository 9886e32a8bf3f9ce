use super::errors::{MonitorError, ReloadFailure};
use super::source::Inner;
use crate::binder::{error_kind, Binder, BoundSettings, Settings};
use crate::error::BindError;
use crate::metrics::{MetricsErrorKind, Tier};
use crate::prelude::{debug, info, warn};
use crate::source::{ConfigChanges, SectionPath};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Consecutive identical rejections logged at WARN before dropping to DEBUG.
pub(super) const MAX_CONSECUTIVE_SAME_ERROR: u32 = 3;

/// Tracks repeated bind failures to suppress log noise.
///
/// The first [`MAX_CONSECUTIVE_SAME_ERROR`] failures of one kind are logged at WARN,
/// later ones at DEBUG. A different kind, or a successful bind, restarts the count.
#[derive(Debug)]
pub(super) struct RejectionTracker {
    last: Option<MetricsErrorKind>,
    consecutive: u32,
    max_consecutive: u32,
}

impl RejectionTracker {
    pub(super) fn new(max_consecutive: u32) -> Self {
        Self {
            last: None,
            consecutive: 0,
            max_consecutive,
        }
    }

    /// Records a failure and returns whether it should be logged at WARN.
    pub(super) fn record(&mut self, error: &BindError) -> bool {
        let kind = error_kind(error);
        let should_warn = self.last != Some(kind) || self.consecutive < self.max_consecutive;

        if self.last == Some(kind) {
            self.consecutive += 1;
        } else {
            self.consecutive = 1;
            self.last = Some(kind);
        }
        should_warn
    }

    pub(super) fn reset(&mut self) {
        self.consecutive = 0;
        self.last = None;
    }

    pub(super) fn consecutive_count(&self) -> u32 {
        self.consecutive
    }
}

/// Keeps retrying the initial bind on every source change.
///
/// Returns [`MonitorError::InitialBind`] with the last failure once the source closes.
pub(super) async fn wait_for_initial_bind<T: Settings>(
    binder: &Binder,
    section: &SectionPath,
    changes: &mut ConfigChanges,
    first_error: BindError,
) -> Result<BoundSettings<T>, MonitorError> {
    let mut tracker = RejectionTracker::new(MAX_CONSECUTIVE_SAME_ERROR);
    let mut last_error = first_error;

    loop {
        if tracker.record(&last_error) {
            warn!("Initial bind failed; waiting for a configuration change: section={section}, error={last_error}");
        } else {
            debug!(
                "Initial bind failed (repeated): section={}, error={}, consecutive_failures={}",
                section,
                last_error,
                tracker.consecutive_count()
            );
        }

        if changes.changed().await.is_err() {
            warn!("Configuration source closed before initial bind: section={section}");
            return Err(MonitorError::InitialBind(last_error));
        }

        match binder.bind_for::<T>(Tier::Monitored, section) {
            Ok(bound) => {
                info!(
                    "Initial bind succeeded after {} failures: section={}, revision={}",
                    tracker.consecutive_count(),
                    section,
                    bound.revision()
                );
                return Ok(bound);
            }
            Err(e) => last_error = e,
        }
    }
}

impl<T: Settings> Inner<T> {
    pub(super) async fn run_supervisor(
        self: Arc<Self>,
        mut changes: ConfigChanges,
        cancellation_token: CancellationToken,
    ) {
        let supervisor_id = fastrand::u64(..);
        info!(
            "Starting options monitor: id={}, section={}",
            supervisor_id,
            self.section()
        );

        let mut tracker = RejectionTracker::new(MAX_CONSECUTIVE_SAME_ERROR);

        loop {
            let changed = tokio::select! {
                () = cancellation_token.cancelled() => {
                    debug!("Cancellation signal received; stopping options monitor: id={supervisor_id}");
                    return;
                }
                v = changes.changed() => v,
            };

            match changed {
                Ok(revision) => {
                    debug!("Configuration changed: id={supervisor_id}, revision={revision}");
                    self.reload(&mut tracker);
                }
                Err(e) => {
                    info!("Stopping options monitor: id={supervisor_id}, reason={e}");
                    self.close_updates();
                    return;
                }
            }
        }
    }

    /// Re-binds against the latest snapshot and publishes the result if it differs.
    pub(super) fn reload(&self, tracker: &mut RejectionTracker) {
        let tree = self.binder().source().snapshot();

        match self
            .binder()
            .bind_tree_for::<T>(Tier::Monitored, &tree, self.section())
        {
            Ok(next) => {
                if tracker.consecutive_count() > 0 {
                    info!(
                        "Reload recovered after {} consecutive failures: section={}",
                        tracker.consecutive_count(),
                        self.section()
                    );
                    tracker.reset();
                }

                if self.publish(next) {
                    info!(
                        "Settings updated: section={}, revision={}",
                        self.section(),
                        tree.revision()
                    );
                } else {
                    debug!(
                        "Re-bind produced identical settings; not publishing: section={}, revision={}",
                        self.section(),
                        tree.revision()
                    );
                }
            }
            Err(error) => {
                self.record_error(MetricsErrorKind::ReloadRejected);
                if tracker.record(&error) {
                    warn!(
                        "Rejected settings reload; keeping previous value: section={}, revision={}, error={}",
                        self.section(),
                        tree.revision(),
                        error
                    );
                } else {
                    debug!(
                        "Rejected settings reload (repeated): section={}, revision={}, error={}, consecutive_rejections={}",
                        self.section(),
                        tree.revision(),
                        error,
                        tracker.consecutive_count()
                    );
                }
                // No receivers is fine.
                let _ = self.reload_errors().send(ReloadFailure {
                    revision: tree.revision(),
                    error,
                });
            }
        }
    }
}
