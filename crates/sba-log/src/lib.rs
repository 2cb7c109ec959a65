//! Logging bootstrap shared by the NF binaries.
//!
//! Every network function logs to stdout through a non-blocking writer so a
//! slow terminal never stalls a request handler. Nothing is persisted: the
//! fabric keeps no state across restarts, logs included.

use std::io;

use anyhow::Context as _;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Keep this alive for the duration of the process; dropping it flushes and
/// detaches the writer thread.
pub struct LoggerGuard {
    _stdio_guard: WorkerGuard,
}

/// Initialise the global subscriber.
///
/// `filter` uses the `tracing_subscriber::EnvFilter` directive syntax, e.g.
/// `info` or `info,sba_fabric::upf=debug`.
pub fn init(filter: &str) -> anyhow::Result<LoggerGuard> {
    let (stdio_writer, stdio_guard) = tracing_appender::non_blocking(io::stdout());
    let stdio_layer = fmt::layer().with_writer(stdio_writer);

    let env_filter = EnvFilter::try_new(filter).context("invalid log filtering directives")?;

    tracing_subscriber::registry()
        .with(stdio_layer)
        .with(env_filter)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(LoggerGuard {
        _stdio_guard: stdio_guard,
    })
}
