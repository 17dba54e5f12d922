//! Two-stage kill escalation
//!
//! A soft kill moves the supervisor out of [`EscalationState::Running`]; when a
//! death timeout is configured, a one-shot [`EscalationTimer`] then schedules
//! the hard kill.

use std::future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

/// Escalation progress of a supervisor instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscalationState {
    /// No termination requested yet
    #[default]
    Running,
    /// The soft kill was sent; no hard kill is scheduled
    SoftKillSent,
    /// The soft kill was sent and the hard kill deadline is armed
    HardKillPending,
}

/// One-shot deadline for the hard kill
#[derive(Debug, Default)]
pub struct EscalationTimer {
    sleep: Option<Pin<Box<Sleep>>>,
    fired: bool,
}

impl EscalationTimer {
    /// Create an unarmed timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer for `deadline`.
    ///
    /// Returns `false` without touching the pending deadline if the timer was
    /// already armed or has fired.
    pub fn arm(&mut self, deadline: Instant) -> bool {
        if self.sleep.is_some() {
            return false;
        }
        self.sleep = Some(Box::pin(tokio::time::sleep_until(deadline)));
        true
    }

    /// Whether the timer is armed and has not fired yet
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.sleep.is_some() && !self.fired
    }

    /// Whether the deadline has been consumed
    #[cfg(test)]
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// The armed deadline, if any
    #[cfg(test)]
    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Resolve once the armed deadline passes.
    ///
    /// Never resolves while unarmed or after firing. Safe to drop and re-poll;
    /// the deadline lives in the timer, not in the returned future.
    pub async fn expired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) if !self.fired => {
                sleep.as_mut().await;
                self.fired = true;
            }
            _ => future::pending().await,
        }
    }
}

/// Escalation state machine shared by every event path of the supervisor
#[derive(Debug)]
pub struct Escalation {
    state: EscalationState,
    death_timeout: Duration,
    timer: EscalationTimer,
}

impl Escalation {
    /// Create the state machine; a zero `death_timeout` disables the hard kill
    pub fn new(death_timeout: Duration) -> Self {
        Self {
            state: EscalationState::Running,
            death_timeout,
            timer: EscalationTimer::new(),
        }
    }

    /// Current state
    #[cfg(test)]
    pub fn state(&self) -> EscalationState {
        self.state
    }

    /// Whether no termination has been requested yet
    pub fn is_running(&self) -> bool {
        self.state == EscalationState::Running
    }

    /// Record the soft kill. Returns `true` only for the first request.
    pub fn begin_soft_kill(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = EscalationState::SoftKillSent;
        true
    }

    /// Arm the hard kill deadline relative to now.
    ///
    /// No-op unless the soft kill was just sent and a death timeout is set.
    /// Returns the deadline when one was armed.
    pub fn schedule_hard_kill(&mut self) -> Option<Instant> {
        if self.state != EscalationState::SoftKillSent || self.death_timeout.is_zero() {
            return None;
        }
        let deadline = Instant::now() + self.death_timeout;
        if !self.timer.arm(deadline) {
            return None;
        }
        self.state = EscalationState::HardKillPending;
        Some(deadline)
    }

    /// Resolve when the hard kill is due
    pub async fn hard_kill_due(&mut self) {
        self.timer.expired().await
    }
}
