//! OS signal intake and naming
//!
//! Hang-up, interrupt and terminate are routed into the event loop as typed
//! [`SignalKind`] values instead of raw numbers.

use futures::stream::{BoxStream, StreamExt};
use nix::sys::signal::Signal;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::fmt;

use crate::error::{WatchError, WatchResult};

/// Signals that drive the soft kill transition
pub const SOFT_KILL_TRIGGERS: [i32; 3] = [SIGHUP, SIGINT, SIGTERM];

/// Stream of signals delivered to this process
pub type SignalStream = BoxStream<'static, SignalKind>;

/// A received signal, resolved to the kinds the supervisor reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGHUP
    Hangup,
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Anything else; logged and otherwise ignored
    Other(i32),
}

impl SignalKind {
    /// Resolve a raw signal number
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            SIGHUP => Self::Hangup,
            SIGINT => Self::Interrupt,
            SIGTERM => Self::Terminate,
            other => Self::Other(other),
        }
    }

    /// Raw signal number
    pub fn raw(self) -> i32 {
        match self {
            Self::Hangup => SIGHUP,
            Self::Interrupt => SIGINT,
            Self::Terminate => SIGTERM,
            Self::Other(raw) => raw,
        }
    }

    /// Signal forwarded to the target group when this kind triggers a soft kill
    pub fn soft_kill_signal(self) -> Option<Signal> {
        match self {
            Self::Hangup => Some(Signal::SIGHUP),
            Self::Interrupt => Some(Signal::SIGINT),
            Self::Terminate => Some(Signal::SIGTERM),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(signal_name(self.raw()))
    }
}

/// Render a signal number as its conventional name, or `UNKNOWN`
pub fn signal_name(raw: i32) -> &'static str {
    Signal::try_from(raw)
        .map(Signal::as_str)
        .unwrap_or("UNKNOWN")
}

/// Start listening for the soft kill triggers.
///
/// Must be called from within a tokio runtime.
pub fn listen() -> WatchResult<SignalStream> {
    let signals = Signals::new(SOFT_KILL_TRIGGERS).map_err(WatchError::SignalSetup)?;
    Ok(signals.map(SignalKind::from_raw).boxed())
}
