//! uwatch core library
//!
//! Supervises a single command inside its own process group. The supervisor
//! re-invokes itself once so that the instance creating the new group is not
//! the one attached to the terminal:
//!
//! - the **outer** instance relays terminal streams through pipes and
//!   forwards termination signals to the inner instance's group;
//! - the **inner** instance leads a fresh process group, spawns the target
//!   into it, and escalates from a soft kill to `SIGKILL` after the death
//!   timeout.
//!
//! Both instances poll their parent id and treat losing their parent like a
//! termination signal.

pub mod config;
pub mod control;
pub mod error;
pub mod escalation;
pub mod launch;
pub mod monitor;
pub mod relay;
pub mod signals;
pub mod supervisor;
pub mod watchdog;

// Re-export commonly used types
pub use config::WatchConfig;
pub use control::{OsControl, ParentWatch, ProcessControl};
pub use error::{WatchError, WatchResult};
pub use escalation::{Escalation, EscalationState, EscalationTimer};
pub use launch::{Invocation, LaunchPlan, ROLE_MARKER, Role};
pub use monitor::{ChildHandle, ChildMonitor, ExitOutcome, TargetRecord};
pub use relay::{ChildStdio, TerminalRelay};
pub use signals::{SignalKind, SignalStream, signal_name};
pub use supervisor::{Event, Outcome, Supervisor};
pub use watchdog::Watchdog;
