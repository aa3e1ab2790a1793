// 🔔 Feedback - what the scanner node shows and sounds
//
// The core only produces these values. Driving an LCD, LED or buzzer (or a
// terminal) is the job of whatever implements `FeedbackSink`.

use crate::error::ScanError;
use crate::ledger::ScanOutcome;
use crate::mode::Mode;
use crate::protocol::format_amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Silent,
    /// Short beep
    Ok,
    /// Long low beep
    Error,
    /// Repeated beeps
    Alarm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Led {
    Off,
    Green,
    Blue,
    Yellow,
    Red,
}

/// One display update: two text lines plus a tone and an LED colour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub primary: String,
    pub secondary: String,
    pub tone: Tone,
    pub led: Led,
}

pub trait FeedbackSink {
    fn show(&mut self, feedback: &Feedback);
}

impl Feedback {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>, tone: Tone, led: Led) -> Self {
        Feedback {
            primary: primary.into(),
            secondary: secondary.into(),
            tone,
            led,
        }
    }

    /// Resting display between events
    pub fn idle(mode: Mode, total: Decimal) -> Self {
        let led = match mode {
            Mode::Add => Led::Off,
            Mode::Remove => Led::Blue,
        };
        Feedback::new(
            format!("Mode: {}", mode.as_str()),
            format!("Total: {}", format_amount(total)),
            Tone::Silent,
            led,
        )
    }

    pub fn scanned(outcome: &ScanOutcome) -> Self {
        let (verb, led) = match outcome.mode {
            Mode::Add => ("Added", Led::Green),
            Mode::Remove => ("Removed", Led::Blue),
        };
        Feedback::new(
            format!("{} {}", verb, outcome.item.name),
            format!("Qty {}  Total {}", outcome.quantity, format_amount(outcome.total)),
            Tone::Ok,
            led,
        )
    }

    pub fn rejected(error: &ScanError) -> Self {
        let detail = match error {
            ScanError::UnknownItem(tag) => tag.clone(),
            ScanError::EmptyRemoval(name) => name.clone(),
        };
        Feedback::new(error.headline(), detail, Tone::Error, Led::Red)
    }

    pub fn remove_armed(dwell: Duration) -> Self {
        Feedback::new(
            "Remove mode",
            format!("Scan within {}s", dwell.as_secs()),
            Tone::Ok,
            Led::Blue,
        )
    }

    pub fn remove_expired() -> Self {
        Feedback::new("Add mode", "Remove timed out", Tone::Silent, Led::Off)
    }

    pub fn budget_set(amount: Decimal) -> Self {
        Feedback::new("Budget set", format_amount(amount), Tone::Ok, Led::Green)
    }

    pub fn low_budget() -> Self {
        Feedback::new("Low budget", "Running low", Tone::Alarm, Led::Yellow)
    }

    pub fn no_budget() -> Self {
        Feedback::new("Budget used up", "Remove items", Tone::Alarm, Led::Red)
    }
}
