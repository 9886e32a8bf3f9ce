use super::SettingsSource;
use crate::binder::{Binder, BoundSettings, Settings};
use crate::error::BindError;
use crate::metrics::Tier;
use crate::prelude::debug;
use crate::source::SectionPath;
use once_cell::sync::OnceCell;
use std::fmt::Debug;

/// Settings bound once and frozen for the lifetime of the cache.
///
/// The first call to [`OptionsCache::get`] performs exactly one bind; concurrent first
/// callers block on that bind instead of racing their own. A failed bind is returned to
/// the caller and nothing is cached, so the next call binds again.
///
/// There is no refresh: source changes are never observed. Rebuild the
/// cache (in practice, restart the process) to pick up new values.
pub struct OptionsCache<T: Settings> {
    binder: Binder,
    section: SectionPath,
    cell: OnceCell<BoundSettings<T>>,
}

impl<T: Settings> Debug for OptionsCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsCache")
            .field("section", &self.section.to_string())
            .field("value", &self.cell.get())
            .finish()
    }
}

impl<T: Settings> OptionsCache<T> {
    /// Creates a cache for the well-known section of `T`.
    pub fn new(binder: Binder) -> Self {
        Self::with_section(binder, T::section_path())
    }

    /// Creates a cache for an explicit section.
    pub fn with_section(binder: Binder, section: impl Into<SectionPath>) -> Self {
        Self {
            binder,
            section: section.into(),
            cell: OnceCell::new(),
        }
    }

    /// Returns the cached settings, binding them on first use.
    ///
    /// # Errors
    ///
    /// Returns the [`BindError`] of a failed first bind. Once a bind has succeeded this
    /// method never fails.
    pub fn get(&self) -> Result<BoundSettings<T>, BindError> {
        self.cell
            .get_or_try_init(|| {
                let bound = self.binder.bind_for::<T>(Tier::Cached, &self.section)?;
                debug!(
                    "Cached settings bound: section={}, revision={}",
                    self.section,
                    bound.revision()
                );
                Ok(bound)
            })
            .cloned()
    }

    /// Returns `true` once the settings have been bound.
    pub fn is_bound(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the section this cache binds.
    pub fn section(&self) -> &SectionPath {
        &self.section
    }
}

impl<T: Settings> SettingsSource for OptionsCache<T> {
    type Item = T;
    type Error = BindError;

    fn settings(&self) -> Result<BoundSettings<T>, BindError> {
        self.get()
    }
}
