//! Live settings: re-bound on every configuration change.
//!
//! [`OptionsMonitor`] binds its section once at construction, then follows the
//! source's change feed. Each change is re-bound against the new tree:
//!
//! - a failed bind keeps the previous value and is reported through
//!   [`OptionsMonitor::reload_errors`];
//! - a value structurally equal to the current one is dropped silently;
//! - any other value is published atomically and delivered to subscribers.
//!
//! Reads through [`OptionsMonitor::current_value`] never block and never fail.
//!
//! # Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use tiered_settings::source::MemorySource;
//! use tiered_settings::{Binder, OptionsMonitor, Settings};
//!
//! #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//! struct Pool {
//!     size: u32,
//! }
//!
//! impl Settings for Pool {
//!     const SECTION: Option<&'static str> = Some("Pool");
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(MemorySource::default());
//! source.set("Pool:Size", 4i64);
//!
//! let monitor = OptionsMonitor::<Pool>::new(Binder::new(source.clone())).await?;
//! let _subscription = monitor.on_change(|pool| println!("pool resized to {}", pool.size));
//!
//! source.set("Pool:Size", 8i64);
//! monitor.updated().changed().await?;
//! assert_eq!(monitor.current_value().size, 8);
//!
//! monitor.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod errors;
mod source;
mod subscription;
mod supervisor;

pub use builder::OptionsMonitorBuilder;
pub use errors::{MonitorError, ReloadFailure};
pub use source::{OptionsMonitor, OptionsUpdates};
pub use subscription::Subscription;
