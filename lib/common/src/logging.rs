//! Logging bootstrap, in the manner of `flux::logging`: a small wrapper
//! around `slog` + `sloggers` that builds a root logger from a terse TOML
//! snippet rather than hand-assembling drains.

pub use slog::{debug, info, o, trace, warn, Logger};
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Builds a root logger whose level is derived from the CLI's repeated
/// `-v` flag count (§6 CLI surface): 0 = info, 1 = debug, >=2 = trace.
pub fn init(verbosity: u8) -> Logger {
    let severity = match verbosity {
        0 => Severity::Info,
        1 => Severity::Debug,
        _ => Severity::Trace,
    };

    let mut builder = TerminalLoggerBuilder::new();
    builder.level(severity);
    builder.destination(Destination::Stderr);

    builder
        .build()
        .expect("terminal logger construction cannot fail")
}

/// Root logger that discards everything, for tests and library callers that
/// haven't opted into logging.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
