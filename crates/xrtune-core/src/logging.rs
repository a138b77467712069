#![forbid(unsafe_code)]

//! Structured logging helpers.
//!
//! All crates in the workspace log through `tracing`. This module re-exports
//! the macros so engine code can `use xrtune_core::logging::debug;` without a
//! direct `tracing` dependency, and (behind `tracing-json`) installs a global
//! subscriber honouring `RUST_LOG`.
//!
//! Event naming follows `message = "component.action"`, e.g.
//! `registry.register`, `grab.start`, `anchor.lost`.

pub use tracing::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};

/// Output format for [`init_subscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Pretty,
    /// Newline-delimited JSON for log shippers.
    Json,
}

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install a process-wide subscriber.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one is left in place.
#[cfg(feature = "tracing-json")]
pub fn init_subscriber(format: LogFormat) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.is_ok()
}
