//! ui::logging
//!
//! Diagnostic logging for the `ymod` binary.
//!
//! The engine reports every scheduled change, phase transition and soft
//! failure through `tracing`. The binary installs one subscriber writing to
//! stderr, so command output on stdout stays clean.
//!
//! # Filter precedence
//!
//! 1. `--debug` forces `debug`
//! 2. `RUST_LOG`
//! 3. the configured `log_filter`
//! 4. `warn` under `--quiet`, otherwise `info`

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::output::Verbosity;

/// Pick the filter directive for a run.
pub fn filter_directive(rust_log: Option<&str>, configured: Option<&str>, verbosity: Verbosity) -> String {
    if verbosity == Verbosity::Debug {
        return "debug".to_string();
    }
    if let Some(env) = rust_log.filter(|s| !s.trim().is_empty()) {
        return env.to_string();
    }
    if let Some(f) = configured {
        return f.to_string();
    }
    match verbosity {
        Verbosity::Quiet => "warn".to_string(),
        _ => "info".to_string(),
    }
}

/// Install the global subscriber.
///
/// An unparsable directive falls back to `info`. Installing twice is a
/// no-op, which keeps in-process test harnesses working.
pub fn init_logging(configured: Option<&str>, verbosity: Verbosity) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), configured, verbosity);
    let env_filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity == Verbosity::Debug)
                .without_time()
                .with_ansi(std::env::var_os("NO_COLOR").is_none()),
        )
        .with(env_filter)
        .try_init();
}
