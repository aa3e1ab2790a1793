// 🧾 Inventory Ledger - held quantity per catalog item
//
// One entry per catalog item, quantities never go below zero, and the cart
// total is recomputed by full summation on every call so repeated mutations
// cannot accumulate drift.

use crate::catalog::{Catalog, Item, TagId};
use crate::error::ScanError;
use crate::mode::Mode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// SNAPSHOT (what goes on the wire)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub name: String,
    pub quantity: u32,
}

/// Full cart state: non-zero lines in catalog order plus the total
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub lines: Vec<SnapshotLine>,
    pub total: Decimal,
}

impl LedgerSnapshot {
    pub fn quantity_of(&self, name: &str) -> u32 {
        self.lines
            .iter()
            .find(|line| line.name == name)
            .map(|line| line.quantity)
            .unwrap_or(0)
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

// ============================================================================
// SCAN OUTCOME
// ============================================================================

/// Result of a successful ledger mutation
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub item: Item,
    pub mode: Mode,
    /// Quantity held after the mutation
    pub quantity: u32,
    /// Cart total after the mutation
    pub total: Decimal,
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Ledger {
    catalog: Catalog,
    quantities: Vec<u32>,
}

impl Ledger {
    pub fn new(catalog: Catalog) -> Self {
        let quantities = vec![0; catalog.len()];
        Ledger {
            catalog,
            quantities,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn identify(&self, tag: &TagId) -> Result<usize, ScanError> {
        self.catalog
            .identify(tag)
            .ok_or_else(|| ScanError::UnknownItem(tag.to_string()))
    }

    /// Apply one scan of the item at `index`. An empty removal is reported
    /// and leaves the ledger unchanged.
    pub fn apply(&mut self, index: usize, mode: Mode) -> Result<ScanOutcome, ScanError> {
        let item = match self.catalog.get(index) {
            Some(item) => item.clone(),
            None => return Err(ScanError::UnknownItem(format!("#{}", index))),
        };

        let quantity = &mut self.quantities[index];
        match mode {
            Mode::Add => *quantity += 1,
            Mode::Remove if *quantity > 0 => *quantity -= 1,
            Mode::Remove => return Err(ScanError::EmptyRemoval(item.name)),
        }
        let quantity = *quantity;

        Ok(ScanOutcome {
            item,
            mode,
            quantity,
            total: self.total(),
        })
    }

    /// Identify then apply
    pub fn scan(&mut self, tag: &TagId, mode: Mode) -> Result<ScanOutcome, ScanError> {
        let index = self.identify(tag)?;
        self.apply(index, mode)
    }

    pub fn quantity(&self, index: usize) -> u32 {
        self.quantities.get(index).copied().unwrap_or(0)
    }

    /// Σ quantity × unit price over every entry
    pub fn total(&self) -> Decimal {
        self.catalog
            .items()
            .iter()
            .zip(&self.quantities)
            .map(|(item, quantity)| item.unit_price * Decimal::from(*quantity))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.iter().all(|quantity| *quantity == 0)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let lines = self
            .catalog
            .items()
            .iter()
            .zip(&self.quantities)
            .filter(|(_, quantity)| **quantity > 0)
            .map(|(item, quantity)| SnapshotLine {
                name: item.name.clone(),
                quantity: *quantity,
            })
            .collect();

        LedgerSnapshot {
            lines,
            total: self.total(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn egg_tag() -> TagId {
        TagId::new([0x93, 0x4A, 0x1F, 0x2C])
    }

    fn bread_tag() -> TagId {
        TagId::new([0xA3, 0x10, 0x7E, 0x05])
    }

    #[test]
    fn test_add_increments() {
        let mut ledger = Ledger::new(Catalog::demo());
        let outcome = ledger.scan(&egg_tag(), Mode::Add).unwrap();

        assert_eq!(outcome.item.name, "Egg");
        assert_eq!(outcome.quantity, 1);
        assert_eq!(outcome.total, dec!(25.00));
    }

    #[test]
    fn test_unknown_tag_leaves_ledger_alone() {
        let mut ledger = Ledger::new(Catalog::demo());
        let result = ledger.scan(&TagId::new([0, 0, 0, 0]), Mode::Add);

        assert_eq!(result, Err(ScanError::UnknownItem("00000000".to_string())));
        assert!(ledger.is_empty());
        assert_eq!(ledger.total(), Decimal::ZERO);
    }

    #[test]
    fn test_empty_removal_is_reported_and_harmless() {
        let mut ledger = Ledger::new(Catalog::demo());
        ledger.scan(&egg_tag(), Mode::Add).unwrap();
        let before = ledger.snapshot();

        let result = ledger.scan(&bread_tag(), Mode::Remove);

        assert_eq!(result, Err(ScanError::EmptyRemoval("Bread".to_string())));
        assert_eq!(ledger.snapshot(), before);
        assert_eq!(ledger.quantity(2), 0);
    }

    #[test]
    fn test_remove_floors_at_zero() {
        let mut ledger = Ledger::new(Catalog::demo());
        ledger.scan(&egg_tag(), Mode::Add).unwrap();

        let outcome = ledger.scan(&egg_tag(), Mode::Remove).unwrap();
        assert_eq!(outcome.quantity, 0);
        assert!(ledger.scan(&egg_tag(), Mode::Remove).is_err());
        assert_eq!(ledger.quantity(0), 0);
    }

    #[test]
    fn test_total_matches_weighted_sum_after_many_mutations() {
        let mut ledger = Ledger::new(Catalog::demo());
        let tags: Vec<TagId> = ledger.catalog().items().iter().map(|i| i.tag.clone()).collect();

        // Deterministic mix of adds and removes
        for step in 0..500usize {
            let tag = &tags[step % tags.len()];
            let mode = if step % 3 == 2 { Mode::Remove } else { Mode::Add };
            let _ = ledger.scan(tag, mode);
        }

        let expected: Decimal = ledger
            .catalog()
            .items()
            .iter()
            .enumerate()
            .map(|(index, item)| item.unit_price * Decimal::from(ledger.quantity(index)))
            .sum();
        assert_eq!(ledger.total(), expected);
    }

    #[test]
    fn test_fractional_prices_do_not_drift() {
        let mut ledger = Ledger::new(Catalog::demo());
        for _ in 0..1000 {
            ledger.scan(&bread_tag(), Mode::Add).unwrap();
        }
        for _ in 0..999 {
            ledger.scan(&bread_tag(), Mode::Remove).unwrap();
        }
        assert_eq!(ledger.total(), dec!(35.50));
    }

    #[test]
    fn test_snapshot_catalog_order_omits_zero() {
        let mut ledger = Ledger::new(Catalog::demo());
        ledger.scan(&bread_tag(), Mode::Add).unwrap();
        ledger.scan(&egg_tag(), Mode::Add).unwrap();
        ledger.scan(&egg_tag(), Mode::Add).unwrap();

        let snapshot = ledger.snapshot();
        let names: Vec<&str> = snapshot.lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Egg", "Bread"]);
        assert_eq!(snapshot.quantity_of("Egg"), 2);
        assert_eq!(snapshot.quantity_of("Milk"), 0);
        assert_eq!(snapshot.item_count(), 3);
        assert_eq!(snapshot.total, dec!(85.50));
    }
}
