//! Logging utilities
//!
//! Thin layer over the `log` facade plus the assertion macros used for
//! programmer-error invariants.

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Map a textual level (`trace`..`error`) to a filter, defaulting to `Info`.
pub fn level_from_str(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "none" | "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Initialize logging with millisecond timestamps
pub fn ogs_log_init(level: LevelFilter, no_color: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp_millis();
    if no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }
    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}

/// Fatal assertion: logs and aborts the task
#[macro_export]
macro_rules! ogs_assert {
    ($cond:expr) => {
        if !$cond {
            $crate::log::error!("Assertion failed: {}", stringify!($cond));
            std::process::abort();
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::log::error!("Assertion failed: {}: {}", stringify!($cond), format!($($arg)+));
            std::process::abort();
        }
    };
}

/// Non-fatal expectation: logs only
#[macro_export]
macro_rules! ogs_expect {
    ($cond:expr) => {
        if !$cond {
            $crate::log::error!("Expectation failed: {}", stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::log::error!("Expectation failed: {}: {}", stringify!($cond), format!($($arg)+));
        }
    };
}
