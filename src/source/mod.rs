//! Configuration sources: the raw tree and its change feed.
//!
//! A [`ConfigurationSource`] owns a mutable configuration tree and publishes
//! immutable [`ConfigTree`] snapshots, each stamped with a revision. Consumers never
//! mutate a source; they read snapshots and follow the revision feed returned by
//! [`ConfigurationSource::watch`].
//!
//! [`MemorySource`] is an in-process implementation suitable for tests and for
//! applications that load configuration themselves.
//!
//! # Example
//!
//! ```
//! use tiered_settings::source::{ConfigurationSource, MemorySource};
//!
//! let source = MemorySource::default();
//! source.set("Jwt:ExpiryMinutes", 30i64);
//!
//! let tree = source.snapshot();
//! assert_eq!(tree.revision(), 1);
//! assert!(source.read(&"jwt".into()).is_some());
//! ```

mod memory;
mod tree;

pub use memory::MemorySource;
pub use tree::{ConfigTree, ConfigValue, SectionPath, ENV_SEPARATOR, PATH_SEPARATOR};

pub(crate) use tree::{find_entry, normalize_key};

use crate::error::SourceError;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A shared, read-only view over a mutable configuration tree.
///
/// Implementations must publish each change as a new [`ConfigTree`] with a strictly
/// greater revision, then signal the new revision on every [`ConfigChanges`] handle.
pub trait ConfigurationSource: Send + Sync + 'static {
    /// Returns the current snapshot of the tree.
    fn snapshot(&self) -> Arc<ConfigTree>;

    /// Returns the subtree at `path` in the current snapshot, if present.
    fn read(&self, path: &SectionPath) -> Option<ConfigValue> {
        self.snapshot().section(path)
    }

    /// Returns a handle for following change notifications.
    ///
    /// The handle yields revisions published after it was created, until the source is closed.
    fn watch(&self) -> ConfigChanges;
}

/// Handle for receiving change notifications from a [`ConfigurationSource`].
///
/// Each notification carries the revision of the newly published tree. A slow
/// receiver observes only the latest revision; intermediate ones may be skipped.
#[derive(Clone, Debug)]
pub struct ConfigChanges {
    rx: watch::Receiver<u64>,
}

impl ConfigChanges {
    /// Wraps a revision channel. Source implementations send each new revision on the
    /// paired [`watch::Sender`] and drop it when the source closes.
    pub fn new(rx: watch::Receiver<u64>) -> Self {
        Self { rx }
    }

    /// Waits for the next change and returns its revision.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Closed`] once the source has been closed.
    pub async fn changed(&mut self) -> Result<u64, SourceError> {
        self.rx.changed().await.map_err(|_| SourceError::Closed)?;
        Ok(*self.rx.borrow_and_update())
    }

    /// Returns the last revision seen, without waiting.
    pub fn last(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Converts the handle into a lazy stream of revisions that ends when the source closes.
    pub fn into_stream(self) -> impl Stream<Item = u64> + Send + Unpin + 'static {
        WatchStream::from_changes(self.rx)
    }
}
