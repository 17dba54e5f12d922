//! Supervisor event loop
//!
//! One loop per instance multiplexes four event sources: the child's exit,
//! OS signals, the orphan poll tick and the hard kill deadline. Events are
//! handled one at a time, so transitions never race each other. Every action
//! is a kill, which is safe to repeat against a group that is already gone.

use futures::stream::{Stream, StreamExt};
use nix::sys::signal::Signal;
use std::future::{self, Future};
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::control::ProcessControl;
use crate::error::WatchResult;
use crate::escalation::Escalation;
use crate::monitor::ExitOutcome;
use crate::signals::SignalKind;

/// Signal forwarded when orphan detection triggers the soft kill
pub const ORPHAN_SIGNAL: Signal = Signal::SIGHUP;

/// Signal swept over the group once the child has exited
pub const SWEEP_SIGNAL: Signal = Signal::SIGTERM;

/// Signal used for the hard kill
pub const HARD_KILL_SIGNAL: Signal = Signal::SIGKILL;

/// An input to the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The direct child exited
    ChildExited(ExitOutcome),
    /// A signal was delivered to this process
    Signal(SignalKind),
    /// The orphan poll interval elapsed
    PollTick,
    /// The hard kill deadline elapsed
    HardKillDeadline,
}

/// How the supervised run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The child exited on its own or after the soft kill
    Exited(ExitOutcome),
    /// The group was hard killed after the death timeout
    HardKilled,
}

impl Outcome {
    /// Exit status for the supervisor process
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exited(outcome) => outcome.exit_code(),
            Self::HardKilled => 1,
        }
    }
}

/// Event loop driving one instance's escalation state machine
pub struct Supervisor<C> {
    control: C,
    poll_interval: Option<Duration>,
    escalation: Escalation,
}

impl<C: ProcessControl> Supervisor<C> {
    /// Create a supervisor acting through `control`
    pub fn new(config: &WatchConfig, control: C) -> Self {
        Self {
            control,
            poll_interval: config.polls().then_some(config.poll_interval),
            escalation: Escalation::new(config.death_timeout),
        }
    }

    /// Current escalation state
    #[cfg(test)]
    pub fn state(&self) -> crate::escalation::EscalationState {
        self.escalation.state()
    }

    /// Run until the child exits or the group is hard killed
    pub async fn run<S, E>(mut self, mut signals: S, exited: E) -> WatchResult<Outcome>
    where
        S: Stream<Item = SignalKind> + Unpin,
        E: Future<Output = WatchResult<ExitOutcome>>,
    {
        let mut poll = self.poll_timer();
        tokio::pin!(exited);

        loop {
            let event = tokio::select! {
                outcome = &mut exited => Event::ChildExited(outcome?),
                Some(kind) = signals.next() => Event::Signal(kind),
                _ = tick(&mut poll) => Event::PollTick,
                _ = self.escalation.hard_kill_due() => Event::HardKillDeadline,
            };

            if let Some(outcome) = self.handle(event)? {
                return Ok(outcome);
            }
        }
    }

    /// Apply one event. Returns the final outcome when the loop must stop.
    pub fn handle(&mut self, event: Event) -> WatchResult<Option<Outcome>> {
        match event {
            Event::ChildExited(outcome) => {
                info!("child exited: {}", outcome);
                // The child is reaped; its pid may be reused, the group id is not
                self.control.ignore(SWEEP_SIGNAL)?;
                self.control.sweep_group(SWEEP_SIGNAL)?;
                Ok(Some(Outcome::Exited(outcome)))
            }
            Event::Signal(kind) => {
                info!("received {}", kind);
                match kind.soft_kill_signal() {
                    Some(sig) => self.soft_kill(sig)?,
                    None => warn!("ignoring unexpected {}", kind),
                }
                Ok(None)
            }
            Event::PollTick => {
                if self.escalation.is_running() && self.control.is_orphaned() {
                    info!("detected parent death");
                    self.soft_kill(ORPHAN_SIGNAL)?;
                }
                Ok(None)
            }
            Event::HardKillDeadline => {
                warn!("death timeout elapsed, hard killing");
                self.control.signal_target(HARD_KILL_SIGNAL)?;
                Ok(Some(Outcome::HardKilled))
            }
        }
    }

    fn soft_kill(&mut self, sig: Signal) -> WatchResult<()> {
        if !self.escalation.begin_soft_kill() {
            debug!("soft kill already sent, not forwarding {}", sig);
            return Ok(());
        }
        self.control.ignore(sig)?;
        self.control.signal_target(sig)?;
        if let Some(deadline) = self.escalation.schedule_hard_kill() {
            debug!(
                "hard kill in {:?}",
                deadline.saturating_duration_since(Instant::now())
            );
        }
        Ok(())
    }

    fn poll_timer(&self) -> Option<Interval> {
        let period = self.poll_interval?;
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(interval)
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
