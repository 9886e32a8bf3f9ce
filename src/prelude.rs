// Internal logging facade.
// `debug!`, `info!`, `warn!` and `error!` route to `tracing`, `log`, or nothing
// depending on enabled features.

#[allow(unused_imports)]
pub(crate) use crate::observability::{
    log_debug as debug, log_error as error, log_info as info, log_warn as warn,
};
