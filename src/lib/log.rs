//! Root logger construction. A `slog::Logger` is threaded through component
//! constructors rather than reached for via a process-global logger.
//!
//! Every line goes to stderr: stdout is reserved for exactly one JSON
//! document per invocation (§4.7, invariant #6).

use slog::{o, Drain, Logger};

pub fn root_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stderr());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("component" => "depsolve"))
}
