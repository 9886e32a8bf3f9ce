//! Crate-internal observability macros.
//!
//! Precedence:
//! 1) `tracing` feature => emit `tracing` events
//! 2) `logging` feature => emit `log` records
//! 3) neither enabled => no-op (format args are still type-checked)

macro_rules! emit_event {
    ($tracing_level:ident, $log_level:ident; $($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        { tracing::event!(tracing::Level::$tracing_level, $($arg)*); }

        #[cfg(all(not(feature = "tracing"), feature = "logging"))]
        { log::log!(log::Level::$log_level, $($arg)*); }

        #[cfg(all(not(feature = "tracing"), not(feature = "logging")))]
        { let _ = format_args!($($arg)*); }
    }};
}

#[allow(unused_macros)]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::observability::emit_event!(DEBUG, Debug; $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::observability::emit_event!(INFO, Info; $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::observability::emit_event!(WARN, Warn; $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::observability::emit_event!(ERROR, Error; $($arg)*) };
}

pub(crate) use emit_event;
pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
