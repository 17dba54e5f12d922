//! uwatch: run a command in its own process group and take the whole group
//! down with it.
//!
//! ```bash
//! uwatch -t 500ms -- ./server --port 8080
//! ```
//!
//! The first invocation re-executes itself once with `UWATCH_CHILD` set; see
//! `uwatch_core` for the reasoning behind the two instances.

mod args;
mod logging;

use clap::Parser;
use tracing::{Instrument, Level, error};
use uwatch_core::{Invocation, ParentWatch, Role, WatchResult, Watchdog};

use crate::args::Cli;

fn main() {
    // Captured before anything else so an early parent death is still seen.
    let parent = ParentWatch::capture();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    logging::init(cli.verbose);
    let role = Role::detect();

    let code = match run(cli, role, parent) {
        Ok(code) => code,
        Err(err) => {
            error!(role = %role, pid = std::process::id(), "{}", err);
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli, role: Role, parent: ParentWatch) -> WatchResult<i32> {
    let config = cli.config();
    let invocation = Invocation::from_env(cli.command)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| uwatch_core::WatchError::environment(format!("runtime: {}", e)))?;

    let span = tracing::span!(Level::ERROR, "uwatch", %role, pid = std::process::id());
    let watchdog = Watchdog::new(config, role, parent);
    let result = runtime.block_on(watchdog.run(invocation).instrument(span));

    // A relay blocked reading the terminal never returns; do not wait for it.
    runtime.shutdown_background();

    result.map(|outcome| outcome.exit_code())
}
