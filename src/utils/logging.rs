//! Conditional logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Chatty modules (like the navigation tracker) define
//! `const ENABLE_LOGS: bool = ...;` and use these instead of the raw `log`
//! macros, so per-module tracing can be switched off without touching the
//! global filter.

/// Conditional info logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Conditional warn logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Conditional error logging; requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
