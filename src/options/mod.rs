//! Frozen freshness tiers and the [`SettingsSource`] seam.
//!
//! - [`OptionsCache`] binds once and serves that instance forever.
//! - [`ScopedOptions`] binds once per [`Scope`] (a logical operation).
//!
//! The live tier is [`OptionsMonitor`](crate::OptionsMonitor). All three implement
//! [`SettingsSource`], so consumers such as the
//! [`TokenIssuer`](crate::token::TokenIssuer) are agnostic to the tier they are wired with.

mod cache;
mod scope;

pub use cache::OptionsCache;
pub use scope::{Scope, ScopeId, ScopedOptions, ScopedView};

use crate::binder::{BoundSettings, Settings};

/// A source of bound settings of one type.
pub trait SettingsSource {
    /// The settings type served.
    type Item: Settings;

    /// The error type returned when settings cannot be resolved.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the settings this source currently serves under its freshness contract.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the settings cannot be resolved.
    fn settings(&self) -> Result<BoundSettings<Self::Item>, Self::Error>;
}
