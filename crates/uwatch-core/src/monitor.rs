//! Child process monitor
//!
//! Starts the child and reports its exit exactly once through an
//! [`ExitNotification`], which the supervisor's event loop selects on next to
//! signals and timers.

use nix::unistd::Pid;
use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::{WatchError, WatchResult};
use crate::signals::signal_name;

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with a status code
    Code(i32),
    /// Terminated by a signal
    Signaled(i32),
}

impl ExitOutcome {
    /// Classify a wait status
    pub fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Code(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Code(-1),
        }
    }

    /// Whether the child exited with status 0
    pub fn success(&self) -> bool {
        matches!(self, Self::Code(0))
    }

    /// Exit status the supervisor reports for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {}", code),
            Self::Signaled(signal) => write!(f, "killed by {}", signal_name(*signal)),
        }
    }
}

/// Bookkeeping for the one child an instance owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    /// Command line, for diagnostics
    pub command: String,
    /// Process id of the direct child
    pub pid: Pid,
    /// Process group this instance signals
    pub pgid: Pid,
    /// Set once the exit notification has been consumed
    pub exit: Option<ExitOutcome>,
}

impl TargetRecord {
    /// Whether the child has been reported as exited
    pub fn exited(&self) -> bool {
        self.exit.is_some()
    }

    /// Record the child's exit
    pub fn mark_exited(&mut self, outcome: ExitOutcome) {
        self.exit = Some(outcome);
    }
}

/// One-shot notification of the child's exit
#[derive(Debug)]
pub struct ExitNotification {
    rx: oneshot::Receiver<io::Result<ExitStatus>>,
}

impl ExitNotification {
    /// Wait for the child to exit
    pub async fn wait(self) -> WatchResult<ExitOutcome> {
        match self.rx.await {
            Ok(Ok(status)) => Ok(ExitOutcome::from_status(status)),
            Ok(Err(e)) => Err(WatchError::Wait(e.to_string())),
            Err(_) => Err(WatchError::Wait("exit notification dropped".to_string())),
        }
    }
}

/// A started child and its pending exit notification
#[derive(Debug)]
pub struct ChildHandle {
    pub record: TargetRecord,
    pub exited: ExitNotification,
}

/// Spawns children and watches for their exit
pub struct ChildMonitor;

impl ChildMonitor {
    /// Spawn `command` and start waiting for it in the background.
    ///
    /// `group` is the process group this instance signals; `None` means the
    /// group the child itself leads. The command is consumed so that the
    /// parent's copies of any descriptors handed to the child are closed
    /// right after the spawn.
    pub fn spawn(
        mut command: Command,
        description: String,
        group: Option<Pid>,
    ) -> WatchResult<ChildHandle> {
        info!("spawn: {}", description);
        let mut child = command
            .spawn()
            .map_err(|e| WatchError::spawn(description.clone(), e))?;
        drop(command);

        let pid = child
            .id()
            .map(|id| Pid::from_raw(id as i32))
            .ok_or_else(|| WatchError::Wait("child exited before its pid was read".to_string()))?;
        info!("spawn: child pid is {}", pid);

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let status = child.wait().await;
            debug!(%pid, "child reaped");
            let _ = tx.send(status);
        });

        Ok(ChildHandle {
            record: TargetRecord {
                command: description,
                pid,
                pgid: group.unwrap_or(pid),
                exit: None,
            },
            exited: ExitNotification { rx },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> (Command, String) {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        (cmd, format!("sh -c {}", script))
    }

    #[tokio::test]
    async fn test_reports_success() {
        let (cmd, description) = sh("exit 0");
        let handle = ChildMonitor::spawn(cmd, description, None).unwrap();
        assert_eq!(handle.record.pgid, handle.record.pid);
        assert!(!handle.record.exited());

        let outcome = handle.exited.wait().await.unwrap();
        assert_eq!(outcome, ExitOutcome::Code(0));
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_reports_nonzero_exit() {
        let (cmd, description) = sh("exit 3");
        let handle = ChildMonitor::spawn(cmd, description, None).unwrap();
        let outcome = handle.exited.wait().await.unwrap();
        assert_eq!(outcome, ExitOutcome::Code(3));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_reports_signal_death() {
        let (cmd, description) = sh("kill -KILL $$");
        let handle = ChildMonitor::spawn(cmd, description, None).unwrap();
        let outcome = handle.exited.wait().await.unwrap();
        assert_eq!(outcome, ExitOutcome::Signaled(9));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.to_string(), "killed by SIGKILL");
    }

    #[tokio::test]
    async fn test_explicit_group_is_recorded() {
        let (cmd, description) = sh("exit 0");
        let group = Pid::from_raw(4242);
        let mut handle = ChildMonitor::spawn(cmd, description, Some(group)).unwrap();
        assert_eq!(handle.record.pgid, group);

        let outcome = handle.exited.wait().await.unwrap();
        handle.record.mark_exited(outcome);
        assert!(handle.record.exited());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let cmd = Command::new("/nonexistent/uwatch-test-binary");
        let err = ChildMonitor::spawn(cmd, "/nonexistent/uwatch-test-binary".to_string(), None)
            .unwrap_err();
        assert!(matches!(err, WatchError::Spawn { .. }));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ExitOutcome::Code(2).to_string(), "exit code 2");
        assert_eq!(ExitOutcome::Signaled(15).to_string(), "killed by SIGTERM");
    }
}
