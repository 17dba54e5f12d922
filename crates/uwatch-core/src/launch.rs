//! Launch coordination across the re-exec hop
//!
//! The outer instance stays in the terminal's foreground group and re-invokes
//! the supervisor with [`ROLE_MARKER`] set. The inner instance removes the
//! marker from what it passes on, becomes leader of a new process group and
//! spawns the real target into that group.

use nix::unistd::{self, Pid};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use tokio::process::Command;

use crate::error::{WatchError, WatchResult};
use crate::relay::ChildStdio;

/// Environment variable distinguishing the inner instance from the outer one
pub const ROLE_MARKER: &str = "UWATCH_CHILD";

/// Which side of the re-exec hop this process is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Started by the user; re-invokes itself
    Outer,
    /// Started by the outer instance; leads the target's process group
    Inner,
}

impl Role {
    /// Decide the role from the inherited marker value
    pub fn from_marker(marker: Option<&OsStr>) -> Self {
        match marker {
            Some(_) => Self::Inner,
            None => Self::Outer,
        }
    }

    /// Decide the role from this process's environment
    pub fn detect() -> Self {
        Self::from_marker(std::env::var_os(ROLE_MARKER).as_deref())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outer => f.write_str("outer"),
            Self::Inner => f.write_str("inner"),
        }
    }
}

/// The supervisor's own command line, split around the target command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Path used to re-invoke the supervisor
    pub program: PathBuf,
    /// Every argument the supervisor received, unmodified
    pub args: Vec<OsString>,
    /// Target command followed by its arguments
    pub target: Vec<OsString>,
}

impl Invocation {
    /// Build an invocation, rejecting an empty target
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
        target: Vec<OsString>,
    ) -> WatchResult<Self> {
        if target.is_empty() {
            return Err(WatchError::usage("missing command"));
        }
        Ok(Self {
            program: program.into(),
            args,
            target,
        })
    }

    /// Invocation for the running process.
    ///
    /// Re-invokes the current executable, falling back to `argv[0]` when it
    /// cannot be resolved.
    pub fn from_env(target: Vec<OsString>) -> WatchResult<Self> {
        let mut argv = std::env::args_os();
        let argv0 = argv
            .next()
            .ok_or_else(|| WatchError::environment("empty argument vector"))?;
        let program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from(argv0));
        Self::new(program, argv.collect(), target)
    }
}

/// What to start next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlan {
    /// Re-invoke the supervisor with the marker set (outer path)
    ReExec { program: PathBuf, args: Vec<OsString> },
    /// Become a group leader, then spawn the target (inner path)
    Exec { program: OsString, args: Vec<OsString> },
}

impl LaunchPlan {
    /// Decide the launch for `role`. Pure; nothing is started or changed.
    pub fn new(role: Role, invocation: &Invocation) -> Self {
        match role {
            Role::Outer => Self::ReExec {
                program: invocation.program.clone(),
                args: invocation.args.clone(),
            },
            Role::Inner => {
                let (program, args) = invocation
                    .target
                    .split_first()
                    .map(|(program, args)| (program.clone(), args.to_vec()))
                    .unwrap_or_default();
                Self::Exec { program, args }
            }
        }
    }

    /// Whether this plan creates a new process group before spawning
    pub fn creates_group(&self) -> bool {
        matches!(self, Self::Exec { .. })
    }

    /// Human readable command line, for diagnostics
    pub fn command_line(&self) -> String {
        let (program, args): (&OsStr, &[OsString]) = match self {
            Self::ReExec { program, args } => (program.as_os_str(), args.as_slice()),
            Self::Exec { program, args } => (program.as_os_str(), args.as_slice()),
        };
        std::iter::once(program)
            .chain(args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the command for this plan with the given standard streams.
    ///
    /// The marker is set or removed on the child's environment only.
    pub fn command(&self, stdio: ChildStdio) -> Command {
        let mut cmd = match self {
            Self::ReExec { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args).env(ROLE_MARKER, "");
                cmd
            }
            Self::Exec { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args).env_remove(ROLE_MARKER);
                cmd
            }
        };
        cmd.stdin(stdio.stdin)
            .stdout(stdio.stdout)
            .stderr(stdio.stderr);
        cmd
    }
}

/// Make the calling process the leader of a new process group.
///
/// Returns the new group id, which equals the caller's pid.
pub fn become_group_leader() -> WatchResult<Pid> {
    unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(WatchError::ProcessGroup)?;
    Ok(unistd::getpid())
}
