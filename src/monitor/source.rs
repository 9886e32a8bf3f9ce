use super::builder::OptionsMonitorBuilder;
use super::errors::{MonitorError, ReloadFailure};
use super::subscription::{Subscribers, Subscription};
use super::supervisor::wait_for_initial_bind;
use crate::binder::{Binder, BoundSettings, Settings};
use crate::metrics::{MetricsErrorKind, Tier};
use crate::options::SettingsSource;
use crate::prelude::{debug, warn};
use crate::source::SectionPath;
use arc_swap::ArcSwap;
use std::convert::Infallible;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const RELOAD_ERRORS_CAPACITY: usize = 16;

/// Handle for receiving publish notifications from an [`OptionsMonitor`].
///
/// Yields a monotonically increasing sequence number, bumped on every published
/// value. The initial bind is sequence 0 and is not notified.
///
/// Cloning this handle creates another receiver on the same stream. A slow receiver
/// observes only the latest sequence; intermediate numbers may be skipped.
#[derive(Clone, Debug)]
pub struct OptionsUpdates {
    rx: watch::Receiver<u64>,
}

impl OptionsUpdates {
    /// Waits for the next publish and returns its sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Closed`] once the monitor has been shut down, or once
    /// the configuration source has closed and no further values can be published.
    pub async fn changed(&mut self) -> Result<u64, MonitorError> {
        self.rx.changed().await.map_err(|_| MonitorError::Closed)?;
        Ok(*self.rx.borrow_and_update())
    }

    /// Returns the last sequence number without waiting.
    pub fn last(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Waits until the sequence number satisfies `f`.
    ///
    /// Returns immediately if the current sequence already does.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Closed`] if the monitor closes first.
    pub async fn wait_for<F>(&mut self, mut f: F) -> Result<u64, MonitorError>
    where
        F: FnMut(&u64) -> bool,
    {
        let current = self.last();
        if f(&current) {
            return Ok(current);
        }
        loop {
            let seq = self.changed().await?;
            if f(&seq) {
                return Ok(seq);
            }
        }
    }
}

/// Live settings of type `T`, re-bound on every configuration change.
///
/// Construction performs the initial bind. Afterwards a background supervisor follows
/// the source's change feed; published values are swapped in atomically and delivered
/// to subscribers registered with [`OptionsMonitor::on_change`].
///
/// The monitor is not `Clone`; share it behind an `Arc`. Dropping it cancels the
/// supervisor and all subscriptions. Use [`OptionsMonitor::shutdown`] or
/// [`OptionsMonitor::shutdown_configured`] to also wait for the supervisor to stop.
#[derive(Debug)]
pub struct OptionsMonitor<T: Settings> {
    inner: Arc<Inner<T>>,
}

pub(super) struct Inner<T: Settings> {
    // Atomically replaced, last successfully bound value.
    current: ArcSwap<BoundSettings<T>>,

    binder: Binder,
    section: SectionPath,
    subscribers: Subscribers<T>,
    reload_errors: broadcast::Sender<ReloadFailure>,

    // Lifecycle / shutdown.
    closed: AtomicBool,
    cancel: CancellationToken,
    shutdown_timeout: Option<Duration>,

    // Publish notifications. The sender is dropped when nothing more can be published.
    update_seq: AtomicU64,
    update_tx: parking_lot::Mutex<Option<watch::Sender<u64>>>,
    update_rx: watch::Receiver<u64>,

    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Settings> Debug for Inner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsMonitor")
            .field("current", &self.current.load_full())
            .field("binder", &self.binder)
            .field("section", &self.section.to_string())
            .field("subscribers", &self.subscribers)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("cancel", &self.cancel)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("update_seq", &self.update_seq)
            .field("update_tx", &"<watch::Sender<u64>>")
            .field("update_rx", &"<watch::Receiver<u64>>")
            .field("supervisor", &"<Mutex<Option<JoinHandle<()>>>>")
            .finish()
    }
}

impl<T: Settings> OptionsMonitor<T> {
    /// Creates a monitor for the well-known section of `T` with default options.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InitialBind`] if the initial bind fails.
    pub async fn new(binder: Binder) -> Result<Self, MonitorError> {
        OptionsMonitorBuilder::new(binder).build().await
    }

    /// Creates a builder for configuring an [`OptionsMonitor`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use serde::{Deserialize, Serialize};
    /// # use std::sync::Arc;
    /// # use std::time::Duration;
    /// # use tiered_settings::source::MemorySource;
    /// # use tiered_settings::{Binder, OptionsMonitor, Settings};
    /// # #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    /// # struct Limits { burst: u32 }
    /// # impl Settings for Limits {}
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let binder = Binder::new(Arc::new(MemorySource::default()));
    /// let monitor = OptionsMonitor::<Limits>::builder(binder)
    ///     .section("Api:Limits")
    ///     .wait_for_initial_bind(true)
    ///     .shutdown_timeout(Some(Duration::from_secs(5)))
    ///     .build()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(binder: Binder) -> OptionsMonitorBuilder<T> {
        OptionsMonitorBuilder::new(binder)
    }

    /// Returns the current value.
    ///
    /// Never blocks and never fails. After shutdown the last published value is
    /// still returned.
    pub fn current_value(&self) -> BoundSettings<T> {
        BoundSettings::clone(&self.inner.current.load())
    }

    /// Registers `callback` to be invoked with every newly published value.
    ///
    /// Callbacks are delivered on a per-subscriber task, in publish order, and never
    /// for re-binds that produced an identical value. Each value reaches subscribers
    /// in registration order; a callback that runs longer than a short handoff window
    /// keeps running while the next subscriber is notified. A panicking callback is
    /// logged and does not affect other subscribers or later deliveries.
    ///
    /// The returned [`Subscription`] cancels the registration when dropped.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&BoundSettings<T>) + Send + Sync + 'static,
    {
        self.inner
            .subscribers
            .subscribe(Arc::new(callback), &self.inner.cancel)
    }

    /// Returns a handle for receiving publish notifications.
    pub fn updated(&self) -> OptionsUpdates {
        OptionsUpdates {
            rx: self.inner.update_rx.clone(),
        }
    }

    /// Subscribes to rejected re-binds.
    ///
    /// Only failures that happen after this call are received. A slow receiver may
    /// observe [`broadcast::error::RecvError::Lagged`].
    pub fn reload_errors(&self) -> broadcast::Receiver<ReloadFailure> {
        self.inner.reload_errors.subscribe()
    }

    /// Returns the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Returns the section this monitor binds.
    pub fn section(&self) -> &SectionPath {
        &self.inner.section
    }

    /// Returns `true` once the monitor has been shut down or dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.cancel.is_cancelled()
    }

    /// Cancels the supervisor and all subscriptions, and waits for the supervisor to stop.
    ///
    /// Idempotent. May wait indefinitely if the supervisor does not respond; prefer
    /// [`OptionsMonitor::shutdown_with_timeout`] or
    /// [`OptionsMonitor::shutdown_configured`].
    pub async fn shutdown(&self) {
        if !self.begin_shutdown() {
            return;
        }

        if let Some(handle) = self.inner.supervisor.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Error joining supervisor task during shutdown: error={e}");
                self.inner.record_error(MetricsErrorKind::SupervisorJoinFailed);
            }
        }
    }

    /// Cancels background tasks and waits up to `timeout` for the supervisor to stop.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::ShutdownTimeout`] if the supervisor had to be aborted.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), MonitorError> {
        if !self.begin_shutdown() {
            return Ok(());
        }

        let Some(mut handle) = self.inner.supervisor.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Error joining supervisor task during shutdown: error={e}");
                self.inner.record_error(MetricsErrorKind::SupervisorJoinFailed);
                Ok(())
            }
            Err(_) => {
                warn!("Shutdown timeout exceeded; aborting supervisor task");
                handle.abort();
                let _ = handle.await;
                Err(MonitorError::ShutdownTimeout)
            }
        }
    }

    /// Shuts down using the timeout configured on the builder, or without a timeout
    /// if none was configured.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::ShutdownTimeout`] if the configured timeout is exceeded.
    pub async fn shutdown_configured(&self) -> Result<(), MonitorError> {
        if let Some(timeout) = self.inner.shutdown_timeout {
            self.shutdown_with_timeout(timeout).await
        } else {
            self.shutdown().await;
            Ok(())
        }
    }

    // Returns false if shutdown already began.
    fn begin_shutdown(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.cancel.cancel();
        self.inner.close_updates();
        debug!("Options monitor shut down: section={}", self.inner.section);
        true
    }

    pub(super) async fn build_with(
        binder: Binder,
        section: SectionPath,
        wait: bool,
        shutdown_timeout: Option<Duration>,
    ) -> Result<Self, MonitorError> {
        // Subscribe before the first bind so no change in between is missed.
        let mut changes = binder.source().watch();

        let initial = match binder.bind_for::<T>(Tier::Monitored, &section) {
            Ok(bound) => bound,
            Err(e) if wait => wait_for_initial_bind(&binder, &section, &mut changes, e).await?,
            Err(e) => return Err(MonitorError::InitialBind(e)),
        };

        let (update_tx, update_rx) = watch::channel(0u64);
        let (reload_errors, _) = broadcast::channel(RELOAD_ERRORS_CAPACITY);
        let cancel = CancellationToken::new();
        let runtime = Handle::current();

        let inner = Arc::new(Inner {
            current: ArcSwap::from_pointee(initial),
            subscribers: Subscribers::new(runtime.clone(), binder.metrics().cloned()),
            binder,
            section,
            reload_errors,
            closed: AtomicBool::new(false),
            cancel,
            shutdown_timeout,
            update_seq: AtomicU64::new(0),
            update_tx: parking_lot::Mutex::new(Some(update_tx)),
            update_rx,
            supervisor: Mutex::new(None),
        });

        let task_inner = Arc::clone(&inner);
        let token = inner.cancel.clone();
        let handle = runtime.spawn(task_inner.run_supervisor(changes, token));
        *inner.supervisor.lock().await = Some(handle);

        Ok(Self { inner })
    }
}

impl<T: Settings> Inner<T> {
    pub(super) fn binder(&self) -> &Binder {
        &self.binder
    }

    pub(super) fn section(&self) -> &SectionPath {
        &self.section
    }

    pub(super) fn reload_errors(&self) -> &broadcast::Sender<ReloadFailure> {
        &self.reload_errors
    }

    pub(super) fn record_error(&self, kind: MetricsErrorKind) {
        if let Some(metrics) = self.binder.metrics() {
            metrics.record_error(kind);
        }
    }

    /// Publishes `next` unless it equals the current value. Returns whether it did.
    pub(super) fn publish(&self, next: BoundSettings<T>) -> bool {
        let metrics = self.binder.metrics();

        if self.current.load().value() == next.value() {
            if let Some(m) = metrics {
                m.record_suppressed();
            }
            return false;
        }

        self.current.store(Arc::new(next.clone()));
        if let Some(m) = metrics {
            m.record_publish();
        }
        self.notify_update();
        self.subscribers.dispatch(&next);
        true
    }

    fn notify_update(&self) {
        let next = self.update_seq.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(tx) = self.update_tx.lock().as_ref() {
            tx.send_replace(next);
        }
    }

    pub(super) fn close_updates(&self) {
        self.update_tx.lock().take();
    }
}

impl<T: Settings> Drop for OptionsMonitor<T> {
    fn drop(&mut self) {
        // Best-effort cancellation. Do not block in Drop.
        self.inner.cancel.cancel();
    }
}

impl<T: Settings> SettingsSource for OptionsMonitor<T> {
    type Item = T;
    type Error = Infallible;

    fn settings(&self) -> Result<BoundSettings<T>, Infallible> {
        Ok(self.current_value())
    }
}
