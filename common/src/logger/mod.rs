// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Structured logging, built on `slog`.
//!
//! Code that holds a [`Logger`] logs through the [`log`] macros. Code that has
//! no logger at hand (e.g. `extern "C"` entry points) logs through the
//! [`global_log`] macros, which write to whatever logger `slog_scope` has in
//! scope.

pub use slog::{o, Drain, FnValue, Key, Level, Logger, PushFnValue, Record, Serializer, Value};
pub use slog_scope;

/// Macros that take an explicit `Logger` as their first argument.
pub mod log {
    pub use slog::{crit, debug, error, info, trace, warn};
}

/// Macros that log to the scoped (or global) logger.
pub mod global_log {
    pub use slog_scope::{crit, debug, error, info, trace, warn};
}

cfg_if::cfg_if! {
    if #[cfg(feature = "loggers")] {
        mod loggers;
        pub use loggers::*;
    }
}
