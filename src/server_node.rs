// 🖥️ Server Node - mirrors the scanner's cart and derives budget signals
//
// The mirror is whatever the last update frame said; nothing is merged.
// A threshold signal is only produced as a consequence of an update frame,
// and it is re-sent on every update while the state stays Low/Exhausted
// (no debouncing).
//
// Submitting a budget resets Remaining to the full amount. The cart is kept,
// and spending is counted against the new budget from the next update on.

use crate::budget::{BudgetStatus, LOW_BUDGET_PERCENT};
use crate::catalog::Catalog;
use crate::error::BudgetError;
use crate::ledger::LedgerSnapshot;
use crate::protocol::{decode, Frame};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

// ============================================================================
// WEB VIEW MODEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLineView {
    pub name: String,
    pub quantity: u32,
    /// Zero for names the server catalog does not know
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub known: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    /// Total as reported by the scanner node
    pub total: Decimal,
    /// Total recomputed from the server catalog
    pub priced_total: Decimal,
    pub drift: Decimal,
    pub budget: BudgetStatus,
    pub last_update: Option<DateTime<Utc>>,
    pub frames_received: u64,
}

// ============================================================================
// SERVER NODE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerNode {
    catalog: Catalog,
    mirror: LedgerSnapshot,
    budget: Decimal,
    low_percent: Decimal,
    /// Budget submitted since the last update: Remaining stays at the full amount
    fresh_budget: bool,
    last_update: Option<DateTime<Utc>>,
    frames_received: u64,
}

impl ServerNode {
    pub fn new(catalog: Catalog) -> Self {
        ServerNode {
            catalog,
            mirror: LedgerSnapshot::default(),
            budget: Decimal::ZERO,
            low_percent: LOW_BUDGET_PERCENT,
            fresh_budget: false,
            last_update: None,
            frames_received: 0,
        }
    }

    pub fn with_low_percent(mut self, low_percent: Decimal) -> Self {
        self.low_percent = low_percent;
        self
    }

    pub fn mirror(&self) -> &LedgerSnapshot {
        &self.mirror
    }

    pub fn budget(&self) -> Decimal {
        self.budget
    }

    pub fn status(&self) -> BudgetStatus {
        let spent = if self.fresh_budget {
            Decimal::ZERO
        } else {
            self.mirror.total
        };
        BudgetStatus::compute_with(self.budget, spent, self.low_percent)
    }

    /// Handle one inbound line; returns the frames to send back
    pub fn handle_line(&mut self, line: &str) -> Vec<Frame> {
        self.frames_received += 1;

        match decode(line) {
            Frame::Update(snapshot) => {
                self.mirror = snapshot;
                self.fresh_budget = false;
                self.last_update = Some(Utc::now());
                let status = self.status();
                tracing::info!(
                    total = %self.mirror.total,
                    items = self.mirror.item_count(),
                    state = status.state.as_str(),
                    "cart mirrored"
                );
                status.state.signal().into_iter().collect()
            }
            other => {
                tracing::warn!(kind = other.kind(), "unexpected frame from scanner");
                Vec::new()
            }
        }
    }

    /// Replace the session budget and reset Remaining to it. The mirrored
    /// cart is kept. Returns the one frame to send: a fresh budget is never
    /// Low or Exhausted, so there is no signal to go with it.
    pub fn submit_budget(&mut self, amount: Decimal) -> Result<Frame, BudgetError> {
        if amount < Decimal::ZERO {
            return Err(BudgetError::Negative(amount.to_string()));
        }

        self.budget = amount;
        self.fresh_budget = true;
        tracing::info!(
            budget = %amount,
            cart_total = %self.mirror.total,
            "budget submitted"
        );

        Ok(Frame::Budget(amount))
    }

    /// Σ quantity × server catalog price; unknown names count as zero
    pub fn priced_total(&self) -> Decimal {
        self.mirror
            .lines
            .iter()
            .map(|line| self.catalog.price_of(&line.name) * Decimal::from(line.quantity))
            .sum()
    }

    pub fn view(&self) -> CartView {
        let lines = self
            .mirror
            .lines
            .iter()
            .map(|line| {
                let item = self.catalog.find_by_name(&line.name);
                let unit_price = item.map(|item| item.unit_price).unwrap_or(Decimal::ZERO);
                CartLineView {
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price,
                    line_total: unit_price * Decimal::from(line.quantity),
                    known: item.is_some(),
                }
            })
            .collect();

        let priced_total = self.priced_total();
        CartView {
            lines,
            total: self.mirror.total,
            priced_total,
            drift: self.mirror.total - priced_total,
            budget: self.status(),
            last_update: self.last_update,
            frames_received: self.frames_received,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ThresholdState;
    use rust_decimal_macros::dec;

    #[test]
    fn test_update_replaces_mirror() {
        let mut server = ServerNode::new(Catalog::demo());

        server.handle_line("Update:Egg,3;Milk,1;Total,115.00");
        server.handle_line("Update:Milk,2;Total,80.00");

        assert_eq!(server.mirror().quantity_of("Egg"), 0);
        assert_eq!(server.mirror().quantity_of("Milk"), 2);
        assert_eq!(server.mirror().total, dec!(80));
    }

    #[test]
    fn test_no_budget_means_no_signal() {
        let mut server = ServerNode::new(Catalog::demo());
        assert!(server.handle_line("Update:Rice,10;Total,600.00").is_empty());
        assert_eq!(server.status().state, ThresholdState::Normal);
    }

    #[test]
    fn test_signal_repeats_on_every_update() {
        let mut server = ServerNode::new(Catalog::demo());
        server.submit_budget(dec!(100)).unwrap();

        assert_eq!(server.handle_line("Update:Egg,4;Total,100.00"), vec![Frame::NoBudget]);
        assert_eq!(server.handle_line("Update:Egg,4;Total,100.00"), vec![Frame::NoBudget]);
        assert_eq!(server.handle_line("Update:Egg,1;Total,25.00"), Vec::<Frame>::new());
    }

    #[test]
    fn test_budget_submission_resets_remaining() {
        let mut server = ServerNode::new(Catalog::demo());
        server.handle_line("Update:Egg,2;Total,50.00");

        let frame = server.submit_budget(dec!(60)).unwrap();
        assert_eq!(frame, Frame::Budget(dec!(60)));
        assert_eq!(server.mirror().quantity_of("Egg"), 2);

        let status = server.status();
        assert_eq!(status.remaining, dec!(60));
        assert_eq!(status.state, ThresholdState::Normal);

        // The next update counts the cart against the new budget
        assert_eq!(server.handle_line("Update:Egg,2;Total,50.00"), vec![Frame::LowBudget]);
        assert_eq!(server.status().remaining, dec!(10));
    }

    #[test]
    fn test_resubmitting_budget_resets_again() {
        let mut server = ServerNode::new(Catalog::demo());
        server.submit_budget(dec!(100)).unwrap();
        server.handle_line("Update:Egg,4;Total,100.00");
        assert_eq!(server.status().state, ThresholdState::Exhausted);

        assert_eq!(server.submit_budget(dec!(500)).unwrap(), Frame::Budget(dec!(500)));
        assert_eq!(server.status().remaining, dec!(500));
        assert_eq!(server.status().state, ThresholdState::Normal);
    }

    #[test]
    fn test_negative_budget_rejected() {
        let mut server = ServerNode::new(Catalog::demo());
        server.submit_budget(dec!(40)).unwrap();

        assert!(server.submit_budget(dec!(-1)).is_err());
        assert_eq!(server.budget(), dec!(40));
    }

    #[test]
    fn test_missing_total_degrades_to_zero() {
        let mut server = ServerNode::new(Catalog::demo());
        server.submit_budget(dec!(100)).unwrap();

        let replies = server.handle_line("Update:Egg,3");
        assert!(replies.is_empty());
        assert_eq!(server.mirror().total, Decimal::ZERO);
        assert_eq!(server.priced_total(), dec!(75));
    }

    #[test]
    fn test_view_prices_unknown_names_at_zero() {
        let mut server = ServerNode::new(Catalog::demo());
        server.handle_line("Update:Egg,2;Truffle,1;Total,250.00");

        let view = server.view();
        assert_eq!(view.lines.len(), 2);
        assert!(view.lines[0].known);
        assert_eq!(view.lines[0].line_total, dec!(50));
        assert!(!view.lines[1].known);
        assert_eq!(view.lines[1].unit_price, Decimal::ZERO);
        assert_eq!(view.priced_total, dec!(50));
        assert_eq!(view.drift, dec!(200));
        assert_eq!(view.frames_received, 1);
        assert!(view.last_update.is_some());
    }

    #[test]
    fn test_unexpected_frames_ignored() {
        let mut server = ServerNode::new(Catalog::demo());
        server.handle_line("Update:Egg,1;Total,25.00");

        assert!(server.handle_line("LowBudget").is_empty());
        assert!(server.handle_line("whatever").is_empty());
        assert_eq!(server.mirror().quantity_of("Egg"), 1);
    }

    #[test]
    fn test_view_json_shape() {
        let mut server = ServerNode::new(Catalog::demo());
        server.submit_budget(dec!(100)).unwrap();
        server.handle_line("Update:Egg,3;Total,75.00");

        let json = serde_json::to_value(server.view()).unwrap();
        assert_eq!(json["lines"][0]["name"], "Egg");
        assert_eq!(json["lines"][0]["quantity"], 3);
        assert_eq!(json["budget"]["state"], "Normal");
        assert!(json["last_update"].is_string());
    }
}
