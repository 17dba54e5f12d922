//! One supervisor instance, from launch to final outcome

use tracing::{debug, info};

use crate::config::WatchConfig;
use crate::control::{OsControl, ParentWatch};
use crate::error::WatchResult;
use crate::launch::{self, Invocation, LaunchPlan, Role};
use crate::monitor::ChildMonitor;
use crate::relay::{ChildStdio, RELAY_DRAIN_GRACE, TerminalRelay};
use crate::signals;
use crate::supervisor::{Outcome, Supervisor};

/// A supervisor instance in a fixed role
#[derive(Debug, Clone)]
pub struct Watchdog {
    config: WatchConfig,
    role: Role,
    parent: ParentWatch,
}

impl Watchdog {
    /// Create an instance.
    ///
    /// `parent` should be captured as early as possible at process startup so
    /// that a parent dying during setup is still noticed.
    pub fn new(config: WatchConfig, role: Role, parent: ParentWatch) -> Self {
        Self {
            config: config.for_role(role),
            role,
            parent,
        }
    }

    /// Effective configuration for this role
    #[cfg(test)]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Role of this instance
    #[cfg(test)]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Launch the next hop and supervise it until it is gone.
    ///
    /// Signal listening starts before the child exists so that a termination
    /// request arriving during the spawn is not lost.
    pub async fn run(self, invocation: Invocation) -> WatchResult<Outcome> {
        let signals = signals::listen()?;
        let plan = LaunchPlan::new(self.role, &invocation);
        if !self.config.escalates() {
            debug!("no death timeout, soft kill waits for the child");
        }

        let (relay, stdio) = match self.role {
            Role::Outer => {
                let (relay, stdio) = TerminalRelay::attach()?;
                (Some(relay), stdio)
            }
            Role::Inner => (None, ChildStdio::inherit()),
        };

        let group = if plan.creates_group() {
            let group = launch::become_group_leader()?;
            debug!("leading process group {}", group);
            Some(group)
        } else {
            None
        };

        let child = ChildMonitor::spawn(plan.command(stdio), plan.command_line(), group)?;
        let mut record = child.record;
        let control = OsControl::new(&record, self.parent);

        let outcome = Supervisor::new(&self.config, control)
            .run(signals, child.exited.wait())
            .await?;

        if let Outcome::Exited(exit) = outcome {
            record.mark_exited(exit);
        }
        debug!(?record, "supervision finished");

        if let Some(relay) = relay {
            relay.finish(RELAY_DRAIN_GRACE).await;
        }

        info!("exiting with code {}", outcome.exit_code());
        Ok(outcome)
    }
}
