use super::errors::MonitorError;
use super::source::OptionsMonitor;
use crate::binder::{Binder, Settings};
use crate::metrics::MetricsRecorder;
use crate::source::SectionPath;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`OptionsMonitor`].
///
/// Defaults:
/// - section: [`Settings::SECTION`] of `T`, or the root
/// - initial bind: fail fast
/// - shutdown timeout: 30 seconds
#[must_use]
pub struct OptionsMonitorBuilder<T: Settings> {
    binder: Binder,
    section: Option<SectionPath>,
    wait_for_initial_bind: bool,
    shutdown_timeout: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Settings> Debug for OptionsMonitorBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsMonitorBuilder")
            .field("binder", &self.binder)
            .field("section", &self.section.as_ref().map(ToString::to_string))
            .field("wait_for_initial_bind", &self.wait_for_initial_bind)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl<T: Settings> OptionsMonitorBuilder<T> {
    /// Creates a builder with default settings.
    pub fn new(binder: Binder) -> Self {
        Self {
            binder,
            section: None,
            wait_for_initial_bind: false,
            shutdown_timeout: Some(DEFAULT_SHUTDOWN_TIMEOUT),
            _marker: PhantomData,
        }
    }

    /// Binds an explicit section instead of the well-known section of `T`.
    pub fn section(mut self, section: impl Into<SectionPath>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Attaches a metrics recorder to the monitor's binder.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.binder = self.binder.with_metrics(metrics);
        self
    }

    /// Keeps retrying a failed initial bind on every source change instead of failing.
    ///
    /// `build()` then completes on the first successful bind, or fails with
    /// [`MonitorError::InitialBind`] if the source closes first. Dropping the pending
    /// future abandons the wait.
    pub fn wait_for_initial_bind(mut self, wait: bool) -> Self {
        self.wait_for_initial_bind = wait;
        self
    }

    /// Sets the timeout used by [`OptionsMonitor::shutdown_configured`].
    ///
    /// `None` waits indefinitely.
    pub fn shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Performs the initial bind and starts following the source.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InitialBind`] if the initial bind fails.
    pub async fn build(self) -> Result<OptionsMonitor<T>, MonitorError> {
        let section = self.section.unwrap_or_else(T::section_path);
        OptionsMonitor::build_with(
            self.binder,
            section,
            self.wait_for_initial_bind,
            self.shutdown_timeout,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsErrorKind, Tier};
    use crate::source::MemorySource;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Cors {
        max_age: u32,
    }

    impl Settings for Cors {
        const SECTION: Option<&'static str> = Some("Http:Cors");
    }

    #[derive(Default)]
    struct Binds(AtomicUsize);

    impl MetricsRecorder for Binds {
        fn record_bind(&self, tier: Tier) {
            assert_eq!(tier, Tier::Monitored);
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn record_publish(&self) {}
        fn record_suppressed(&self) {}
        fn record_error(&self, _kind: MetricsErrorKind) {}
    }

    fn source() -> Arc<MemorySource> {
        let source = Arc::new(MemorySource::default());
        source.set("Http:Cors:MaxAge", 600i64);
        source.set("Admin:Cors:MaxAge", 60i64);
        source
    }

    #[test]
    fn test_defaults() {
        let builder = OptionsMonitorBuilder::<Cors>::new(Binder::new(source()));
        assert!(builder.section.is_none());
        assert!(!builder.wait_for_initial_bind);
        assert_eq!(builder.shutdown_timeout, Some(DEFAULT_SHUTDOWN_TIMEOUT));
    }

    #[tokio::test]
    async fn test_build_uses_well_known_section() {
        let monitor = OptionsMonitorBuilder::<Cors>::new(Binder::new(source()))
            .build()
            .await
            .unwrap();
        assert_eq!(monitor.section().to_string(), "Http:Cors");
        assert_eq!(monitor.current_value().max_age, 600);
    }

    #[tokio::test]
    async fn test_build_with_explicit_section_and_metrics() {
        let binds = Arc::new(Binds::default());
        let monitor = OptionsMonitorBuilder::<Cors>::new(Binder::new(source()))
            .section("Admin:Cors")
            .metrics(Arc::clone(&binds) as Arc<dyn MetricsRecorder>)
            .shutdown_timeout(None)
            .build()
            .await
            .unwrap();

        assert_eq!(monitor.current_value().max_age, 60);
        assert_eq!(binds.0.load(Ordering::SeqCst), 1);
        monitor.shutdown_configured().await.unwrap();
    }
}
