use super::SettingsSource;
use crate::binder::{Binder, BoundSettings, Settings};
use crate::error::BindError;
use crate::metrics::Tier;
use crate::prelude::debug;
use crate::source::{normalize_key, SectionPath};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Returns the numeric value of the identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

// Section segments are normalized so relaxed spellings share one memo entry.
type MemoKey = (TypeId, Vec<String>);

/// A logical operation (for example one request) that memoizes settings.
///
/// Each settings type and section is bound at most once per scope. Dropping the scope
/// releases everything it memoized.
pub struct Scope {
    id: ScopeId,
    memo: Mutex<HashMap<MemoKey, Box<dyn Any + Send + Sync>>>,
}

impl Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("memoized", &self.len())
            .finish()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Begins a new scope with a fresh identifier.
    pub fn new() -> Self {
        Self {
            id: ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the identifier of this scope.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Returns the number of settings values memoized in this scope.
    pub fn len(&self) -> usize {
        self.memo.lock().len()
    }

    /// Returns `true` if nothing has been memoized yet.
    pub fn is_empty(&self) -> bool {
        self.memo.lock().is_empty()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let released = self.memo.get_mut().len();
        if released > 0 {
            debug!("Scope ended: id={}, released={}", self.id, released);
        }
    }
}

/// Settings bound once per [`Scope`].
///
/// Repeated calls within one scope return the identical instance. Scopes begun on
/// either side of a source change may observe different values; nothing is shared
/// between scopes.
pub struct ScopedOptions<T: Settings> {
    binder: Binder,
    section: SectionPath,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Settings> Debug for ScopedOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedOptions")
            .field("section", &self.section.to_string())
            .finish()
    }
}

impl<T: Settings> Clone for ScopedOptions<T> {
    fn clone(&self) -> Self {
        Self {
            binder: self.binder.clone(),
            section: self.section.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Settings> ScopedOptions<T> {
    /// Creates scoped options for the well-known section of `T`.
    pub fn new(binder: Binder) -> Self {
        Self::with_section(binder, T::section_path())
    }

    /// Creates scoped options for an explicit section.
    pub fn with_section(binder: Binder, section: impl Into<SectionPath>) -> Self {
        Self {
            binder,
            section: section.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the settings memoized in `scope`, binding them on first use in that scope.
    ///
    /// # Errors
    ///
    /// Returns the [`BindError`] of a failed bind; nothing is memoized in that case.
    pub fn get_for_scope(&self, scope: &Scope) -> Result<BoundSettings<T>, BindError> {
        let key = (
            TypeId::of::<T>(),
            self.section
                .segments()
                .iter()
                .map(|segment| normalize_key(segment))
                .collect(),
        );

        // Holding the lock across the bind keeps it to one bind per scope.
        let mut memo = scope.memo.lock();
        if let Some(bound) = memo
            .get(&key)
            .and_then(|v| v.downcast_ref::<BoundSettings<T>>())
        {
            return Ok(bound.clone());
        }

        let bound = self.binder.bind_for::<T>(Tier::Scoped, &self.section)?;
        debug!(
            "Scoped settings bound: scope={}, section={}, revision={}",
            scope.id,
            self.section,
            bound.revision()
        );
        memo.insert(key, Box::new(bound.clone()));
        Ok(bound)
    }

    /// Returns a [`SettingsSource`] view of these options pinned to `scope`.
    pub fn in_scope<'a>(&'a self, scope: &'a Scope) -> ScopedView<'a, T> {
        ScopedView {
            options: self,
            scope,
        }
    }

    /// Returns the section these options bind.
    pub fn section(&self) -> &SectionPath {
        &self.section
    }
}

/// [`ScopedOptions`] pinned to one [`Scope`].
#[derive(Debug)]
pub struct ScopedView<'a, T: Settings> {
    options: &'a ScopedOptions<T>,
    scope: &'a Scope,
}

impl<T: Settings> SettingsSource for ScopedView<'_, T> {
    type Item = T;
    type Error = BindError;

    fn settings(&self) -> Result<BoundSettings<T>, BindError> {
        self.options.get_for_scope(self.scope)
    }
}
