// 💰 Budget Classifier - remaining budget → threshold state
//
//   budget <= 0            → Normal (division guard)
//   percent <= 0           → Exhausted
//   0 < percent <= 20      → Low
//   otherwise              → Normal
//
// Thresholds are recomputed from scratch on every update and never stored.

use crate::protocol::Frame;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Remaining share of the budget at or below which the cart is "low"
pub const LOW_BUDGET_PERCENT: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdState {
    Normal,
    Low,
    Exhausted,
}

impl ThresholdState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdState::Normal => "normal",
            ThresholdState::Low => "low",
            ThresholdState::Exhausted => "exhausted",
        }
    }

    /// One-shot signal for the scanner node; Normal has none
    pub fn signal(&self) -> Option<Frame> {
        match self {
            ThresholdState::Normal => None,
            ThresholdState::Low => Some(Frame::LowBudget),
            ThresholdState::Exhausted => Some(Frame::NoBudget),
        }
    }
}

/// Percentage of the budget still available, or None when no budget is set
pub fn percent_remaining(remaining: Decimal, budget: Decimal) -> Option<Decimal> {
    if budget <= Decimal::ZERO {
        return None;
    }
    remaining
        .checked_div(budget)
        .and_then(|ratio| ratio.checked_mul(HUNDRED))
}

/// Classify remaining budget against the default 20% low mark.
/// Total and deterministic for every input.
pub fn classify(remaining: Decimal, budget: Decimal) -> ThresholdState {
    classify_with(remaining, budget, LOW_BUDGET_PERCENT)
}

/// Classify with an explicit low mark (percent of budget remaining)
pub fn classify_with(remaining: Decimal, budget: Decimal, low_percent: Decimal) -> ThresholdState {
    let Some(percent) = percent_remaining(remaining, budget) else {
        tracing::debug!(%budget, "no budget set, classifying as normal");
        return ThresholdState::Normal;
    };

    if percent <= Decimal::ZERO {
        ThresholdState::Exhausted
    } else if percent <= low_percent {
        ThresholdState::Low
    } else {
        ThresholdState::Normal
    }
}

// ============================================================================
// BUDGET STATUS
// ============================================================================

/// Budget view derived from a spent amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub budget: Decimal,
    pub spent: Decimal,
    /// May be negative when over budget
    pub remaining: Decimal,
    pub percent_remaining: Option<Decimal>,
    pub state: ThresholdState,
}

impl BudgetStatus {
    pub fn compute(budget: Decimal, spent: Decimal) -> Self {
        Self::compute_with(budget, spent, LOW_BUDGET_PERCENT)
    }

    pub fn compute_with(budget: Decimal, spent: Decimal, low_percent: Decimal) -> Self {
        let remaining = budget - spent;
        BudgetStatus {
            budget,
            spent,
            remaining,
            percent_remaining: percent_remaining(remaining, budget).map(|p| p.round_dp(1)),
            state: classify_with(remaining, budget, low_percent),
        }
    }

    pub fn is_set(&self) -> bool {
        self.budget > Decimal::ZERO
    }

    pub fn is_over_budget(&self) -> bool {
        self.is_set() && self.remaining < Decimal::ZERO
    }
}
