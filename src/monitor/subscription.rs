use crate::binder::BoundSettings;
use crate::metrics::{MetricsErrorKind, MetricsRecorder};
use crate::prelude::{debug, error};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub(super) type Callback<T> = Arc<dyn Fn(&BoundSettings<T>) + Send + Sync + 'static>;

/// Handle to a change callback registered on an [`OptionsMonitor`](super::OptionsMonitor).
///
/// Dropping the handle cancels the subscription; use [`Subscription::detach`] to keep
/// the callback registered for the lifetime of the monitor instead.
///
/// Cancellation is immediate for notifications not yet started. A delivery already in
/// progress runs to completion.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    token: CancellationToken,
    detached: bool,
}

impl Subscription {
    /// Returns the registration identifier. Identifiers increase in registration order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the subscription. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` if the subscription was cancelled, explicitly or by monitor shutdown.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the cancellation token of this subscription.
    ///
    /// A callback can capture a clone of the token to unsubscribe itself.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Keeps the callback registered after this handle is dropped.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.token.cancel();
        }
    }
}

/// How long fan-out waits for one subscriber's callback before moving on to the next.
const DELIVERY_HANDOFF: Duration = Duration::from_millis(100);

struct Entry<T> {
    id: u64,
    tx: mpsc::UnboundedSender<Delivery<T>>,
    token: CancellationToken,
}

struct Delivery<T> {
    value: BoundSettings<T>,
    done: oneshot::Sender<()>,
}

/// Registered subscribers, in registration order.
///
/// Each subscriber owns a queue drained by its own delivery task, so a slow or
/// panicking callback only delays its own notifications. A single fan-out task hands
/// each published value to the subscribers one at a time, in registration order,
/// waiting up to [`DELIVERY_HANDOFF`] for each callback to return.
pub(super) struct Subscribers<T> {
    next_id: AtomicU64,
    entries: Arc<Mutex<Vec<Entry<T>>>>,
    fanout: mpsc::UnboundedSender<BoundSettings<T>>,
    runtime: Handle,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl<T> Debug for Subscribers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("next_id", &self.next_id)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Subscribers<T> {
    pub(super) fn new(runtime: Handle, metrics: Option<Arc<dyn MetricsRecorder>>) -> Self {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let (fanout, rx) = mpsc::unbounded_channel();
        runtime.spawn(fan_out(rx, Arc::clone(&entries)));
        Self {
            next_id: AtomicU64::new(1),
            entries,
            fanout,
            runtime,
            metrics,
        }
    }

    pub(super) fn subscribe(&self, callback: Callback<T>, parent: &CancellationToken) -> Subscription {
        let token = parent.child_token();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut entries = self.entries.lock();
        prune(&mut entries);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.runtime.spawn(deliver(
            id,
            rx,
            callback,
            token.clone(),
            self.metrics.clone(),
        ));
        entries.push(Entry {
            id,
            tx,
            token: token.clone(),
        });
        debug!("Subscriber registered: id={id}");

        Subscription {
            id,
            token,
            detached: false,
        }
    }

    /// Queues `value` for fan-out to every live subscriber.
    ///
    /// Never waits on a callback.
    pub(super) fn dispatch(&self, value: &BoundSettings<T>) {
        if self.fanout.send(value.clone()).is_err() {
            debug!(
                "Fan-out stopped; notification dropped: revision={}",
                value.revision()
            );
        }
    }

    pub(super) fn len(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| !entry.token.is_cancelled())
            .count()
    }
}

fn prune<T>(entries: &mut Vec<Entry<T>>) {
    entries.retain(|entry| {
        let live = !entry.token.is_cancelled() && !entry.tx.is_closed();
        if !live {
            debug!("Subscriber removed: id={}", entry.id);
        }
        live
    });
}

async fn fan_out<T: Send + Sync + 'static>(
    mut rx: mpsc::UnboundedReceiver<BoundSettings<T>>,
    entries: Arc<Mutex<Vec<Entry<T>>>>,
) {
    while let Some(value) = rx.recv().await {
        let targets: Vec<(u64, mpsc::UnboundedSender<Delivery<T>>)> = {
            let mut entries = entries.lock();
            prune(&mut entries);
            entries.iter().map(|e| (e.id, e.tx.clone())).collect()
        };

        for (id, tx) in targets {
            let (done, finished) = oneshot::channel();
            let delivery = Delivery {
                value: value.clone(),
                done,
            };
            if tx.send(delivery).is_err() {
                continue;
            }
            // A closed `done` means the callback returned, panicked or was cancelled.
            if timeout(DELIVERY_HANDOFF, finished).await.is_err() {
                debug!(
                    "Subscriber still busy, continuing fan-out: id={id}, revision={}",
                    value.revision()
                );
            }
        }
    }
}

async fn deliver<T: Send + Sync + 'static>(
    id: u64,
    mut rx: mpsc::UnboundedReceiver<Delivery<T>>,
    callback: Callback<T>,
    token: CancellationToken,
    metrics: Option<Arc<dyn MetricsRecorder>>,
) {
    loop {
        let Delivery { value, done } = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = rx.recv() => match next {
                Some(delivery) => delivery,
                None => break,
            },
        };

        // Callbacks are synchronous and may be slow; keep them off the async workers.
        let cb = Arc::clone(&callback);
        let revision = value.revision();
        if let Err(e) = tokio::task::spawn_blocking(move || cb(&value)).await {
            if e.is_panic() {
                error!("Subscriber callback panicked: id={id}, revision={revision}");
                if let Some(m) = metrics.as_deref() {
                    m.record_error(MetricsErrorKind::SubscriberPanicked);
                }
            }
        }
        let _ = done.send(());
    }
    debug!("Subscriber delivery stopped: id={id}");
}
