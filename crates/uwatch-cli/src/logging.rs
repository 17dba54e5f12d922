//! Diagnostic logging setup

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber.
///
/// Fatal diagnostics are always shown; `verbose` adds lifecycle events.
/// `RUST_LOG` overrides both.
pub fn init(verbose: bool) {
    let default = if verbose {
        "uwatch=debug,uwatch_core=debug"
    } else {
        "error"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
