//! Process control seam used by the supervisor's event loop

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::{self, Pid};
use tracing::{debug, info};

use crate::error::{WatchError, WatchResult};
use crate::monitor::TargetRecord;

/// Side effects the event loop performs on the operating system
pub trait ProcessControl {
    /// Send `signal` to the owned child and its process group.
    ///
    /// A target that no longer exists is not an error.
    fn signal_target(&self, signal: Signal) -> WatchResult<()>;

    /// Send `signal` to the process group only.
    ///
    /// Used once the child has been reaped, when its pid may already belong
    /// to an unrelated process.
    fn sweep_group(&self, signal: Signal) -> WatchResult<()>;

    /// Ignore further deliveries of `signal` to this process
    fn ignore(&self, signal: Signal) -> WatchResult<()>;

    /// Whether this process has lost its original parent
    fn is_orphaned(&self) -> bool;
}

/// Parent process id captured at startup, before the parent could have died
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentWatch {
    parent: Pid,
}

impl ParentWatch {
    /// Record the current parent
    pub fn capture() -> Self {
        Self {
            parent: unistd::getppid(),
        }
    }

    /// Watch for re-parenting away from `parent`
    pub fn of(parent: Pid) -> Self {
        Self { parent }
    }

    /// Whether the current parent differs from the recorded one.
    ///
    /// An orphan is re-parented to init (pid 1) or to the nearest sub-reaper;
    /// either way its parent id changes.
    pub fn is_orphaned(&self) -> bool {
        unistd::getppid() != self.parent
    }
}

/// [`ProcessControl`] backed by real system calls
#[derive(Debug, Clone)]
pub struct OsControl {
    child: Pid,
    group: Pid,
    parent: ParentWatch,
}

impl OsControl {
    /// Control the child and group recorded in `record`
    pub fn new(record: &TargetRecord, parent: ParentWatch) -> Self {
        Self {
            child: record.pid,
            group: record.pgid,
            parent,
        }
    }
}

impl ProcessControl for OsControl {
    fn signal_target(&self, sig: Signal) -> WatchResult<()> {
        info!("sending {} to pid {}", sig, self.child);
        delivered(self.child.as_raw(), sig, signal::kill(self.child, sig))?;
        self.sweep_group(sig)
    }

    fn sweep_group(&self, sig: Signal) -> WatchResult<()> {
        info!("sending {} to pid -{}", sig, self.group);
        delivered(-self.group.as_raw(), sig, signal::killpg(self.group, sig))
    }

    fn ignore(&self, sig: Signal) -> WatchResult<()> {
        // SAFETY: installing SIG_IGN does not run any code in signal context.
        unsafe { signal::signal(sig, SigHandler::SigIgn) }
            .map(|_| ())
            .map_err(|source| WatchError::Disposition {
                signal: sig.as_str(),
                source,
            })
    }

    fn is_orphaned(&self) -> bool {
        self.parent.is_orphaned()
    }
}

fn delivered(target: i32, sig: Signal, result: nix::Result<()>) -> WatchResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!("no process for {}, already gone", target);
            Ok(())
        }
        Err(source) => Err(WatchError::Signal {
            pid: target,
            signal: sig.as_str(),
            source,
        }),
    }
}
