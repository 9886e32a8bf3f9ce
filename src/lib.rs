#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Typed settings served under three freshness contracts from one hot-reloadable
//! configuration source.
//!
//! A [`Binder`] turns a section of the raw configuration tree into an immutable
//! [`BoundSettings`] value. Consumers choose *when* a new value is produced:
//!
//! - [`OptionsCache`]: bound once, frozen for the lifetime of the cache.
//! - [`ScopedOptions`]: bound once per [`Scope`], for example per request.
//! - [`OptionsMonitor`]: re-bound on every source change, published atomically and
//!   delivered to subscribers.
//!
//! All tiers implement [`SettingsSource`], so a consumer such as the
//! [`TokenIssuer`] decides nothing about freshness itself: a rotated signing key
//! takes effect immediately, at the next operation, or never, depending on the tier
//! it was wired with.
//!
//! ## Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use tiered_settings::source::MemorySource;
//! use tiered_settings::{Binder, OptionsCache, OptionsMonitor, Scope, ScopedOptions, Settings};
//!
//! #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//! struct Features {
//!     beta: bool,
//! }
//!
//! impl Settings for Features {
//!     const SECTION: Option<&'static str> = Some("Features");
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(MemorySource::default());
//! source.set("Features:Beta", "false");
//! let binder = Binder::new(source.clone());
//!
//! let cache = OptionsCache::<Features>::new(binder.clone());
//! let scoped = ScopedOptions::<Features>::new(binder.clone());
//! let monitor = OptionsMonitor::<Features>::new(binder).await?;
//!
//! assert!(!cache.get()?.beta);
//! let mut updates = monitor.updated();
//! source.set("Features:Beta", "true");
//!
//! // Frozen forever.
//! assert!(!cache.get()?.beta);
//! // A new operation sees the change.
//! assert!(scoped.get_for_scope(&Scope::new())?.beta);
//! // The monitor follows once the change has propagated.
//! updates.changed().await?;
//! assert!(monitor.current_value().beta);
//!
//! monitor.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`logging`** (default): emit internal diagnostics through the `log` crate
//! - **`tracing`**: emit internal diagnostics as `tracing` events instead

mod observability;
mod prelude;

pub mod binder;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod options;
pub mod source;
pub mod token;

// -----------------------
// Re-exports
// -----------------------

pub use crate::{
    binder::{Binder, BoundSettings, Settings},
    error::{BindError, FieldKind, SourceError},
    monitor::{
        MonitorError, OptionsMonitor, OptionsMonitorBuilder, OptionsUpdates, ReloadFailure,
        Subscription,
    },
    options::{OptionsCache, Scope, ScopeId, ScopedOptions, SettingsSource},
    source::{ConfigTree, ConfigValue, ConfigurationSource, MemorySource, SectionPath},
    token::{JwtSettings, PrincipalClaims, TokenIssuer},
};
