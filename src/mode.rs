// 🔁 Scan Mode - Add by default, Remove for one scan or until the dwell expires
//
//   Add ──trigger──▶ Remove ──dwell elapsed──▶ Add
//                       └────one scan──────────▶ Add
//
// The dwell is an explicit deadline checked on every poll tick; there is no
// timer thread. Callers pass `Instant`s in so the machine stays testable.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Add,
    Remove,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Add => "ADD",
            Mode::Remove => "REMOVE",
        }
    }
}

/// Observable mode change, used to drive feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTransition {
    /// Trigger armed remove mode
    Armed,
    /// Dwell elapsed with no scan
    Expired,
    /// A scan used up remove mode
    Consumed,
}

#[derive(Debug, Clone)]
pub struct ModeMachine {
    dwell: Duration,
    deadline: Option<Instant>,
}

impl ModeMachine {
    pub fn new(dwell: Duration) -> Self {
        ModeMachine {
            dwell,
            deadline: None,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.deadline.is_some() {
            Mode::Remove
        } else {
            Mode::Add
        }
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Time left before remove mode reverts, if armed
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// External trigger; ignored while already in Remove (the deadline is not extended)
    pub fn trigger(&mut self, now: Instant) -> Option<ModeTransition> {
        if self.deadline.is_some() {
            return None;
        }
        self.deadline = Some(now + self.dwell);
        tracing::info!(dwell_ms = self.dwell.as_millis() as u64, "remove mode armed");
        Some(ModeTransition::Armed)
    }

    /// Poll tick: revert to Add once the deadline has passed
    pub fn tick(&mut self, now: Instant) -> Option<ModeTransition> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                tracing::info!("remove mode expired");
                Some(ModeTransition::Expired)
            }
            _ => None,
        }
    }

    /// Mode to apply to the scan being processed. Remove mode is used up by
    /// exactly one scan, whatever the scan's outcome.
    pub fn consume(&mut self) -> (Mode, Option<ModeTransition>) {
        match self.deadline.take() {
            Some(_) => (Mode::Remove, Some(ModeTransition::Consumed)),
            None => (Mode::Add, None),
        }
    }
}
