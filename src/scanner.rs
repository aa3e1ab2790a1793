// 🛒 Scanner Node - cooperative poll loop around the ledger
//
// Each iteration first resends the cart if the link just came up, then
// checks, in order:
//   0. the remove-mode deadline
//   1. the trigger button
//   2. an inbound frame from the server node
//   3. the tag reader
// and handles at most one event. Nothing here blocks.

use crate::catalog::TagId;
use crate::feedback::Feedback;
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::mode::{Mode, ModeMachine, ModeTransition};
use crate::protocol::{decode, Frame};
use crate::transport::LineTransport;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

// ============================================================================
// INPUT SEAMS
// ============================================================================

pub trait TagReader {
    /// Fingerprint of a freshly presented tag, if any
    fn poll_tag(&mut self) -> Option<TagId>;
}

pub trait Trigger {
    /// True once per activation
    fn poll_trigger(&mut self) -> bool;
}

/// Trigger latched by whatever watches the physical (or simulated) button
#[derive(Debug, Default)]
pub struct ButtonLatch {
    pressed: bool,
}

impl ButtonLatch {
    pub fn press(&mut self) {
        self.pressed = true;
    }
}

impl Trigger for ButtonLatch {
    fn poll_trigger(&mut self) -> bool {
        std::mem::take(&mut self.pressed)
    }
}

/// Tags presented but not yet handled, oldest first
#[derive(Debug, Default)]
pub struct TagQueue {
    tags: VecDeque<TagId>,
}

impl TagQueue {
    pub fn push(&mut self, tag: TagId) {
        self.tags.push_back(tag);
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl TagReader for TagQueue {
    fn poll_tag(&mut self) -> Option<TagId> {
        self.tags.pop_front()
    }
}

/// Last budget signal received from the server node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetSignal {
    Low,
    Exhausted,
}

// ============================================================================
// SCANNER NODE
// ============================================================================

pub struct ScannerNode<T: LineTransport> {
    ledger: Ledger,
    mode: ModeMachine,
    transport: T,
    budget: Option<Decimal>,
    last_signal: Option<BudgetSignal>,
    send_failures: u64,
}

impl<T: LineTransport> ScannerNode<T> {
    pub fn new(ledger: Ledger, dwell: Duration, transport: T) -> Self {
        ScannerNode {
            ledger,
            mode: ModeMachine::new(dwell),
            transport,
            budget: None,
            last_signal: None,
            send_failures: 0,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mode(&self) -> Mode {
        self.mode.mode()
    }

    pub fn mode_remaining(&self, now: Instant) -> Option<Duration> {
        self.mode.remaining(now)
    }

    pub fn budget(&self) -> Option<Decimal> {
        self.budget
    }

    pub fn last_signal(&self) -> Option<BudgetSignal> {
        self.last_signal
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn idle_feedback(&self) -> Feedback {
        Feedback::idle(self.mode(), self.ledger.total())
    }

    /// Send the full cart so the server mirror matches it
    pub fn announce(&mut self) {
        let snapshot = self.ledger.snapshot();
        self.send_snapshot(snapshot);
    }

    /// One loop iteration
    pub fn poll(
        &mut self,
        now: Instant,
        trigger: &mut dyn Trigger,
        reader: &mut dyn TagReader,
    ) -> Option<Feedback> {
        // A peer that just (re)appeared has a stale or empty mirror
        if self.transport.take_reconnected() {
            tracing::info!("link up, resending cart");
            self.announce();
        }

        if let Some(ModeTransition::Expired) = self.mode.tick(now) {
            return Some(Feedback::remove_expired());
        }

        if trigger.poll_trigger() {
            return self
                .mode
                .trigger(now)
                .map(|_| Feedback::remove_armed(self.mode.dwell()));
        }

        match self.transport.poll_line() {
            Ok(Some(line)) => return self.handle_line(&line),
            Ok(None) => {}
            Err(error) => tracing::trace!(%error, "no inbound frame"),
        }

        reader.poll_tag().map(|tag| self.handle_scan(&tag))
    }

    /// Apply one scan in the current mode. Remove mode is used up whatever happens.
    pub fn handle_scan(&mut self, tag: &TagId) -> Feedback {
        let (mode, _) = self.mode.consume();

        match self.ledger.scan(tag, mode) {
            Ok(outcome) => {
                tracing::info!(
                    item = %outcome.item.name,
                    mode = mode.as_str(),
                    quantity = outcome.quantity,
                    total = %outcome.total,
                    "cart updated"
                );
                let snapshot = self.ledger.snapshot();
                self.send_snapshot(snapshot);
                Feedback::scanned(&outcome)
            }
            Err(error) => {
                tracing::warn!(%error, mode = mode.as_str(), "scan rejected");
                Feedback::rejected(&error)
            }
        }
    }

    /// React to a frame from the server node
    pub fn handle_line(&mut self, line: &str) -> Option<Feedback> {
        let frame = decode(line);
        tracing::debug!(kind = frame.kind(), "frame received");

        match frame {
            Frame::Budget(amount) => {
                tracing::info!(%amount, "budget received");
                self.budget = Some(amount);
                self.last_signal = None;
                Some(Feedback::budget_set(amount))
            }
            Frame::LowBudget => {
                self.last_signal = Some(BudgetSignal::Low);
                Some(Feedback::low_budget())
            }
            Frame::NoBudget => {
                self.last_signal = Some(BudgetSignal::Exhausted);
                Some(Feedback::no_budget())
            }
            Frame::Update(_) => {
                tracing::debug!("ignoring update frame on scanner node");
                None
            }
            Frame::Unknown(text) => {
                tracing::warn!(frame = %text, "unknown frame");
                None
            }
        }
    }

    fn send_snapshot(&mut self, snapshot: LedgerSnapshot) {
        if let Err(error) = self.transport.send_frame(&Frame::Update(snapshot)) {
            self.send_failures += 1;
            tracing::warn!(%error, "update not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ThresholdState;
    use crate::catalog::{Catalog, Item};
    use crate::server_node::ServerNode;
    use crate::protocol::LineBuffer;
    use crate::transport::{MemoryLink, TcpLineTransport};
    use rust_decimal_macros::dec;

    const DWELL: Duration = Duration::from_secs(5);

    fn egg() -> TagId {
        TagId::new([0x93, 0x4A, 0x1F, 0x2C])
    }

    fn node() -> (ScannerNode<MemoryLink>, MemoryLink) {
        let (scanner_end, server_end) = MemoryLink::pair();
        let node = ScannerNode::new(Ledger::new(Catalog::demo()), DWELL, scanner_end);
        (node, server_end)
    }

    #[test]
    fn test_scan_sends_full_snapshot() {
        let (mut node, mut server_end) = node();

        node.handle_scan(&egg());
        node.handle_scan(&egg());

        // Only the newest full-state frame matters
        assert_eq!(
            server_end.poll_line().unwrap().as_deref(),
            Some("Update:Egg,2;Total,50.00")
        );
    }

    #[test]
    fn test_rejected_scan_sends_nothing() {
        let (mut node, mut server_end) = node();

        let feedback = node.handle_scan(&TagId::new([9, 9, 9, 9]));
        assert_eq!(feedback.primary, "Unknown item");
        assert_eq!(server_end.poll_line().unwrap(), None);
    }

    #[test]
    fn test_poll_order_trigger_before_tag() {
        let (mut node, _server_end) = node();
        let now = Instant::now();
        let mut button = ButtonLatch::default();
        let mut reader = TagQueue::default();
        button.press();
        reader.push(egg());

        let first = node.poll(now, &mut button, &mut reader).unwrap();
        assert_eq!(first.primary, "Remove mode");
        assert_eq!(node.mode(), Mode::Remove);

        // Tag is handled on the next iteration, in remove mode, on an empty cart
        let second = node.poll(now, &mut button, &mut reader).unwrap();
        assert_eq!(second.primary, "Not in cart");
        assert_eq!(node.mode(), Mode::Add);
        assert!(node.poll(now, &mut button, &mut reader).is_none());
    }

    #[test]
    fn test_remove_mode_consumed_by_one_scan() {
        let (mut node, _server_end) = node();
        let now = Instant::now();
        let mut button = ButtonLatch::default();
        let mut reader = TagQueue::default();

        node.handle_scan(&egg());
        node.handle_scan(&egg());

        button.press();
        node.poll(now, &mut button, &mut reader);
        let removed = node.handle_scan(&egg());
        assert_eq!(removed.primary, "Removed Egg");
        assert_eq!(node.mode(), Mode::Add);

        let added = node.handle_scan(&egg());
        assert_eq!(added.primary, "Added Egg");
        assert_eq!(node.ledger().quantity(0), 2);
    }

    #[test]
    fn test_remove_mode_expires_on_poll() {
        let (mut node, _server_end) = node();
        let start = Instant::now();
        let mut button = ButtonLatch::default();
        let mut reader = TagQueue::default();
        button.press();

        node.poll(start, &mut button, &mut reader);
        assert!(node.poll(start + Duration::from_secs(4), &mut button, &mut reader).is_none());

        let expired = node.poll(start + DWELL, &mut button, &mut reader).unwrap();
        assert_eq!(expired, Feedback::remove_expired());
        assert_eq!(node.mode(), Mode::Add);
    }

    #[test]
    fn test_inbound_signals() {
        let (mut node, mut server_end) = node();
        let now = Instant::now();
        let mut button = ButtonLatch::default();
        let mut reader = TagQueue::default();

        server_end.send_frame(&Frame::Budget(dec!(100))).unwrap();
        let feedback = node.poll(now, &mut button, &mut reader).unwrap();
        assert_eq!(feedback.primary, "Budget set");
        assert_eq!(node.budget(), Some(dec!(100)));

        server_end.send_frame(&Frame::NoBudget).unwrap();
        node.poll(now, &mut button, &mut reader);
        assert_eq!(node.last_signal(), Some(BudgetSignal::Exhausted));

        server_end.send_line("Gibberish\n").unwrap();
        assert!(node.poll(now, &mut button, &mut reader).is_none());
    }

    #[test]
    fn test_end_to_end_budget_flow() {
        let (mut node, mut server_end) = node();
        let mut server = ServerNode::new(Catalog::demo());
        let now = Instant::now();
        let mut button = ButtonLatch::default();
        let mut reader = TagQueue::default();

        let frame = server.submit_budget(dec!(90)).unwrap();
        server_end.send_frame(&frame).unwrap();
        node.poll(now, &mut button, &mut reader);
        assert_eq!(node.budget(), Some(dec!(90)));

        for _ in 0..3 {
            node.handle_scan(&egg());
        }
        assert_eq!(node.ledger().total(), dec!(75));

        let line = server_end.poll_line().unwrap().unwrap();
        let replies = server.handle_line(&line);
        assert_eq!(server.mirror().quantity_of("Egg"), 3);
        assert_eq!(server.status().remaining, dec!(15));
        assert_eq!(server.status().state, ThresholdState::Low);
        assert_eq!(replies, vec![Frame::LowBudget]);

        for frame in replies {
            server_end.send_frame(&frame).unwrap();
        }
        let feedback = node.poll(now, &mut button, &mut reader).unwrap();
        assert_eq!(feedback, Feedback::low_budget());
        assert_eq!(node.last_signal(), Some(BudgetSignal::Low));
    }

    #[test]
    fn test_budget_on_full_cart_reaches_scanner() {
        let (mut node, mut server_end) = node();
        let mut server = ServerNode::new(Catalog::demo());
        let now = Instant::now();
        let mut button = ButtonLatch::default();
        let mut reader = TagQueue::default();

        node.handle_scan(&egg());
        node.handle_scan(&egg());
        let line = server_end.poll_line().unwrap().unwrap();
        assert!(server.handle_line(&line).is_empty());

        // Everything the submission produces lands in a single read
        let frame = server.submit_budget(dec!(60)).unwrap();
        server_end.send_frame(&frame).unwrap();

        let feedback = node.poll(now, &mut button, &mut reader).unwrap();
        assert_eq!(feedback, Feedback::budget_set(dec!(60)));
        assert_eq!(node.budget(), Some(dec!(60)));
        assert_eq!(node.last_signal(), None);

        // The signal follows the next update instead
        node.handle_scan(&egg());
        let line = server_end.poll_line().unwrap().unwrap();
        for frame in server.handle_line(&line) {
            server_end.send_frame(&frame).unwrap();
        }
        assert_eq!(server.status().remaining, dec!(-15));
        node.poll(now, &mut button, &mut reader);
        assert_eq!(node.last_signal(), Some(BudgetSignal::Exhausted));
        assert_eq!(node.budget(), Some(dec!(60)));
    }

    #[test]
    fn test_resends_cart_when_link_comes_up() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let transport = TcpLineTransport::new(listener.local_addr().unwrap()).unwrap();
        let mut node = ScannerNode::new(Ledger::new(Catalog::demo()), DWELL, transport);
        let mut button = ButtonLatch::default();
        let mut reader = TagQueue::default();

        // Scanned before the link is up: the update is lost
        node.handle_scan(&egg());
        node.handle_scan(&egg());

        for _ in 0..200 {
            node.poll(Instant::now(), &mut button, &mut reader);
            if node.transport().is_connected() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(node.transport().is_connected());
        node.poll(Instant::now(), &mut button, &mut reader);

        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut buffer = LineBuffer::new();
        let mut chunk = [0u8; 256];
        while !buffer.has_line() {
            let read = std::io::Read::read(&mut stream, &mut chunk).unwrap();
            assert!(read > 0);
            buffer.push(&chunk[..read]);
        }
        assert_eq!(buffer.take_latest().as_deref(), Some("Update:Egg,2;Total,50.00"));
    }

    #[test]
    fn test_end_to_end_with_quarter_low_mark() {
        // Budget 100, three items at 25: remaining 25 counts as low at a 25% mark
        let catalog = Catalog::new(vec![Item::new(egg(), "Egg", dec!(25))]);
        let (scanner_end, mut server_end) = MemoryLink::pair();
        let mut node = ScannerNode::new(Ledger::new(catalog.clone()), DWELL, scanner_end);
        let mut server = ServerNode::new(catalog).with_low_percent(dec!(25));

        server.submit_budget(dec!(100)).unwrap();
        for _ in 0..3 {
            node.handle_scan(&egg());
        }

        let line = server_end.poll_line().unwrap().unwrap();
        assert_eq!(line, "Update:Egg,3;Total,75.00");
        assert_eq!(server.handle_line(&line), vec![Frame::LowBudget]);
        assert_eq!(server.status().remaining, dec!(25));
    }
}
