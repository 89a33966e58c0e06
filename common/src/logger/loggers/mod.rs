// Copyright (c) 2018-2022 The MobileCoin Foundation

/// Sets chan_size for the stdout, stderr and JSON drains.
const STDOUT_CHANNEL_SIZE: usize = 100_000;
const STDERR_CHANNEL_SIZE: usize = 100_000;
const JSON_CHANNEL_SIZE: usize = 100_000;

/// Macro to ease with tests that require a Logger instance.
pub use mc_util_logger_macros::test_with_logger;

use super::*;

use chrono::{Local, Utc};
use slog_json::Json;
use std::{env, io};

/// Custom timestamp function for use with slog-term
fn custom_timestamp(io: &mut dyn io::Write) -> io::Result<()> {
    write!(io, "{}", Utc::now())
}

fn create_term_logger(
    decorator: slog_term::TermDecorator,
    thread_name: &str,
    chan_size: usize,
) -> slog::Fuse<slog_async::Async> {
    let drain = slog_envlogger::new(
        slog_term::FullFormat::new(decorator)
            .use_custom_timestamp(custom_timestamp)
            .build()
            .fuse(),
    );
    slog_async::Async::new(drain)
        .thread_name(thread_name.into())
        .chan_size(chan_size)
        .build()
        .fuse()
}

/// Create a JSON-lines logger on stderr, for hosts that collect structured
/// output from an embedded library.
fn create_json_logger() -> slog::Fuse<slog_async::Async> {
    let drain = Json::new(io::stderr())
        .set_newlines(true)
        .set_flush(true)
        .add_key_value(o!(
            "ts" => PushFnValue(move |_, ser| {
                ser.emit(Local::now().to_rfc3339())
            }),
            "level" => FnValue(move |record| {
                record.level().as_short_str()
            }),
            "message" => PushFnValue(move |record, ser| {
                ser.emit(format!("{}", record.msg()))
            }),
        ))
        .build()
        .fuse();

    slog_async::Async::new(slog_envlogger::new(drain))
        .thread_name("slog-json".into())
        .chan_size(JSON_CHANNEL_SIZE)
        .build()
        .fuse()
}

/// Create the root logger.
///
/// Output goes to stdout, or to stderr when `MC_LOG_STDERR=1`, or to stderr
/// as JSON lines when `MC_LOG_JSON=1`. Filtering follows `RUST_LOG`, with
/// `MC_LOG` accepted as an alias and `info` as the default.
pub fn create_root_logger() -> Logger {
    // MC_LOG lets us raise our own verbosity without affecting cargo's output.
    if env::var("RUST_LOG").is_err() {
        let level = env::var("MC_LOG").unwrap_or_else(|_| "info".to_string());
        env::set_var("RUST_LOG", level);
    }

    let extra_kv = o!(
        "mc.src" => FnValue(|record| format!("{}:{}", record.file(), record.line())),
        "mc.module" => FnValue(|record| record.module()),
    );

    if env::var("MC_LOG_JSON") == Ok("1".to_string()) {
        return Logger::root(create_json_logger(), extra_kv);
    }

    let drain = if env::var("MC_LOG_STDERR") == Ok("1".to_string()) {
        create_term_logger(
            slog_term::TermDecorator::new().stderr().build(),
            "slog-stderr",
            STDERR_CHANNEL_SIZE,
        )
    } else {
        create_term_logger(
            slog_term::TermDecorator::new().stdout().build(),
            "slog-stdout",
            STDOUT_CHANNEL_SIZE,
        )
    };
    Logger::root(drain, extra_kv)
}

/// Create a logger that is suitable for use during test execution.
pub fn create_test_logger(test_name: String) -> Logger {
    // Tests log to stderr unless told otherwise.
    if env::var("MC_LOG_STDERR").is_err() {
        env::set_var("MC_LOG_STDERR", "1");
    }
    create_root_logger().new(o!(
        "mc.test_name" => test_name,
    ))
}
