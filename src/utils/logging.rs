//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr so streamed output on stdout stays clean.
//! `RUST_LOG` wins when set; otherwise `--verbose` selects `debug` for this
//! crate and the default is `warn`.

use tracing_subscriber::EnvFilter;

pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,chatpilot=debug"
    } else {
        "warn"
    }
}

/// Installs the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
