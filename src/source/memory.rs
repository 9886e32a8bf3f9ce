use super::tree::{ConfigTree, ConfigValue, SectionPath};
use super::{ConfigChanges, ConfigurationSource};
use crate::error::SourceError;
use crate::prelude::debug;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;

/// In-memory [`ConfigurationSource`].
///
/// Every mutation clones the current tree, applies the change, bumps the revision and
/// atomically publishes the result. Mutations are serialized; snapshots are lock-free.
///
/// After [`MemorySource::close`], mutations are still applied but no further
/// notifications are sent and every [`ConfigChanges`] handle reports
/// [`SourceError::Closed`].
pub struct MemorySource {
    tree: ArcSwap<ConfigTree>,
    notify: Mutex<Option<watch::Sender<u64>>>,
}

impl Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource")
            .field("revision", &self.revision())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new(ConfigTree::new())
    }
}

impl MemorySource {
    /// Creates a source serving `tree`. The tree's revision is kept as the starting revision.
    pub fn new(tree: ConfigTree) -> Self {
        let (tx, _rx) = watch::channel(tree.revision());
        Self {
            tree: ArcSwap::from_pointee(tree),
            notify: Mutex::new(Some(tx)),
        }
    }

    /// Creates a source from a JSON document whose root is an object.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidRoot`] if the document root is not an object.
    pub fn from_json(document: &serde_json::Value) -> Result<Self, SourceError> {
        Ok(Self::new(ConfigTree::from_json(document)?))
    }

    /// Returns the current revision.
    pub fn revision(&self) -> u64 {
        self.tree.load().revision()
    }

    /// Sets `value` at `path` and publishes a new revision.
    pub fn set(&self, path: impl Into<SectionPath>, value: impl Into<ConfigValue>) -> u64 {
        let path = path.into();
        let value = value.into();
        self.update(|tree| tree.set(&path, value))
    }

    /// Removes the value at `path` and publishes a new revision.
    pub fn remove(&self, path: impl Into<SectionPath>) -> u64 {
        let path = path.into();
        self.update(|tree| {
            tree.remove(&path);
        })
    }

    /// Replaces the whole tree and publishes a new revision.
    ///
    /// The revision of `tree` is ignored; the source assigns the next revision.
    pub fn replace(&self, tree: ConfigTree) -> u64 {
        self.update(move |current| *current = tree)
    }

    /// Publishes a new revision without changing any value, as when a file is
    /// rewritten with identical content.
    pub fn touch(&self) -> u64 {
        self.update(|_| {})
    }

    /// Applies `f` to a copy of the current tree and publishes the result.
    ///
    /// Returns the new revision.
    pub fn update<F>(&self, f: F) -> u64
    where
        F: FnOnce(&mut ConfigTree),
    {
        let notify = self.notify.lock();

        let current = self.tree.load_full();
        let revision = current.revision() + 1;
        let mut next = ConfigTree::clone(&current);
        f(&mut next);
        self.tree.store(Arc::new(next.with_revision(revision)));

        match notify.as_ref() {
            Some(tx) => {
                tx.send_replace(revision);
            }
            None => debug!("Configuration source closed; revision {revision} not announced"),
        }
        revision
    }

    /// Closes the change feed. Idempotent.
    pub fn close(&self) {
        self.notify.lock().take();
    }

    /// Returns `true` once [`MemorySource::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.notify.lock().is_none()
    }
}

impl ConfigurationSource for MemorySource {
    fn snapshot(&self) -> Arc<ConfigTree> {
        self.tree.load_full()
    }

    fn watch(&self) -> ConfigChanges {
        match self.notify.lock().as_ref() {
            Some(tx) => ConfigChanges::new(tx.subscribe()),
            None => {
                // The sender is dropped right away, so the handle reports Closed.
                let (_tx, rx) = watch::channel(self.revision());
                ConfigChanges::new(rx)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt as _;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_mutations_bump_revision() {
        let source = MemorySource::default();
        assert_eq!(source.revision(), 0);

        assert_eq!(source.set("Jwt:Key", "k1"), 1);
        assert_eq!(source.touch(), 2);
        assert_eq!(source.remove("Jwt:Key"), 3);
        assert_eq!(source.replace(ConfigTree::new().with_revision(100)), 4);
        assert_eq!(source.snapshot().revision(), 4);
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let source = MemorySource::from_json(&json!({ "Jwt": { "Key": "k1" } })).unwrap();
        let before = source.snapshot();
        source.set("Jwt:Key", "k2");

        assert_eq!(before.get(&"Jwt:Key".into()), Some(&ConfigValue::from("k1")));
        assert_eq!(
            source.snapshot().get(&"Jwt:Key".into()),
            Some(&ConfigValue::from("k2"))
        );
    }

    #[tokio::test]
    async fn test_watch_yields_new_revisions() {
        let source = Arc::new(MemorySource::default());
        let mut changes = source.watch();
        assert_eq!(changes.last(), 0);

        let writer = Arc::clone(&source);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.set("A", 1i64);
        });

        let revision = tokio::time::timeout(Duration::from_secs(1), changes.changed())
            .await
            .expect("should be notified")
            .unwrap();
        assert_eq!(revision, 1);
    }

    #[tokio::test]
    async fn test_close_ends_feed() {
        let source = MemorySource::default();
        let mut changes = source.watch();
        source.close();
        assert!(source.is_closed());
        assert_eq!(changes.changed().await, Err(SourceError::Closed));

        let mut late = source.watch();
        assert_eq!(late.changed().await, Err(SourceError::Closed));

        // Mutations still apply after close.
        source.set("A", true);
        assert_eq!(source.revision(), 1);
    }

    #[tokio::test]
    async fn test_into_stream_ends_on_close() {
        let source = MemorySource::default();
        let mut stream = source.watch().into_stream();
        source.set("A", 1i64);
        assert_eq!(stream.next().await, Some(1));
        source.close();
        assert_eq!(stream.next().await, None);
    }
}
