//! Error types for the supervisor
//!
//! Every variant here is fatal: the binary reports it and exits with status 1.
//! Runtime failures of the supervised command are not errors; they surface as
//! an [`ExitOutcome`](crate::monitor::ExitOutcome) instead.

use thiserror::Error;

/// Result type alias for supervisor operations
pub type WatchResult<T> = Result<T, WatchError>;

/// Errors that abort the supervisor
#[derive(Error, Debug)]
pub enum WatchError {
    /// Invalid command line
    #[error("invalid arguments: {0}")]
    Usage(String),

    /// The process environment could not be prepared for the launch
    #[error("environment: {0}")]
    Environment(String),

    /// Creating or joining a process group failed
    #[error("setpgid: {0}")]
    ProcessGroup(#[source] nix::Error),

    /// Allocating a relay pipe failed
    #[error("pipe: {0}")]
    Pipe(#[source] nix::Error),

    /// Spawning the child process failed
    #[error("spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Delivering a signal failed for a reason other than a missing process
    #[error("kill({pid}, {signal}): {source}")]
    Signal {
        pid: i32,
        signal: &'static str,
        #[source]
        source: nix::Error,
    },

    /// Changing the disposition of a signal failed
    #[error("signal disposition for {signal}: {source}")]
    Disposition {
        signal: &'static str,
        #[source]
        source: nix::Error,
    },

    /// Installing the signal listener failed
    #[error("signal setup: {0}")]
    SignalSetup(#[source] std::io::Error),

    /// Waiting on the child failed or the exit notification was lost
    #[error("wait: {0}")]
    Wait(String),
}

impl WatchError {
    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create an environment error
    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment(message.into())
    }

    /// Create a spawn error for the given command line
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    /// Process exit status used when this error terminates the supervisor
    pub fn exit_code(&self) -> i32 {
        1
    }
}
