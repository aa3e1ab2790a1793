// 📡 Line Protocol - single-line frames shared by both nodes
//
// Wire format (no escaping, no acknowledgment):
//
//   Update:<name>,<qty>;<name>,<qty>;...;Total,<amount>\n   scanner → server
//   Budget:<amount>\n                                       server → scanner
//   LowBudget\n | NoBudget\n                                server → scanner
//
// Ledger frames always carry the FULL cart so a lost frame is repaired by
// the next one. Decoding never fails: anything it cannot read degrades to a
// zero value and is reported as a `Token::Malformed`.

use crate::ledger::{LedgerSnapshot, SnapshotLine};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const UPDATE_PREFIX: &str = "Update:";
pub const BUDGET_PREFIX: &str = "Budget:";
pub const LOW_BUDGET: &str = "LowBudget";
pub const NO_BUDGET: &str = "NoBudget";

const TOTAL_KEY: &str = "Total";
const PAIR_SEPARATOR: char = ',';
const SEGMENT_SEPARATOR: char = ';';

/// Longest partial line kept while waiting for '\n'
pub const MAX_LINE_BYTES: usize = 4096;

// ============================================================================
// FRAMES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Full ledger snapshot
    Update(LedgerSnapshot),

    /// New session budget
    Budget(Decimal),

    /// Remaining budget is at or below the low mark
    LowBudget,

    /// Budget exhausted or exceeded
    NoBudget,

    /// Anything else; kept for logging
    Unknown(String),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Update(_) => "update",
            Frame::Budget(_) => "budget",
            Frame::LowBudget => "low-budget",
            Frame::NoBudget => "no-budget",
            Frame::Unknown(_) => "unknown",
        }
    }
}

// ============================================================================
// TOKENS
// ============================================================================

/// One `;`-separated segment of an update payload
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    ItemPair { name: String, quantity: u32 },
    TotalPair(Decimal),
    Malformed(String),
}

/// Split an update payload (text after `Update:`) into typed tokens.
/// Empty segments are skipped.
pub fn tokenize(payload: &str) -> Vec<Token> {
    payload
        .split(SEGMENT_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(tokenize_segment)
        .collect()
}

fn tokenize_segment(segment: &str) -> Token {
    // Names carry no commas, so the last comma is also the first one.
    let Some((key, value)) = segment.rsplit_once(PAIR_SEPARATOR) else {
        return Token::Malformed(segment.to_string());
    };

    if key == TOTAL_KEY {
        return match parse_amount(value) {
            Some(amount) => Token::TotalPair(amount),
            None => Token::Malformed(segment.to_string()),
        };
    }

    match value.trim().parse::<u32>() {
        Ok(quantity) if !key.is_empty() => Token::ItemPair {
            name: key.to_string(),
            quantity,
        },
        _ => Token::Malformed(segment.to_string()),
    }
}

fn parse_amount(text: &str) -> Option<Decimal> {
    Decimal::from_str(text.trim()).ok()
}

/// Amounts always go out with two fraction digits
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode a frame as one line, including the trailing '\n'
pub fn encode(frame: &Frame) -> String {
    match frame {
        Frame::Update(snapshot) => encode_update(snapshot),
        Frame::Budget(amount) => format!("{}{}\n", BUDGET_PREFIX, format_amount(*amount)),
        Frame::LowBudget => format!("{}\n", LOW_BUDGET),
        Frame::NoBudget => format!("{}\n", NO_BUDGET),
        Frame::Unknown(text) => format!("{}\n", text),
    }
}

fn encode_update(snapshot: &LedgerSnapshot) -> String {
    let mut line = String::from(UPDATE_PREFIX);

    for entry in snapshot.lines.iter().filter(|entry| entry.quantity > 0) {
        line.push_str(&entry.name);
        line.push(PAIR_SEPARATOR);
        line.push_str(&entry.quantity.to_string());
        line.push(SEGMENT_SEPARATOR);
    }

    line.push_str(TOTAL_KEY);
    line.push(PAIR_SEPARATOR);
    line.push_str(&format_amount(snapshot.total));
    line.push('\n');
    line
}

// ============================================================================
// DECODING
// ============================================================================

/// Decoded update plus whatever could not be read
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedUpdate {
    pub snapshot: LedgerSnapshot,
    pub has_total: bool,
    pub malformed: Vec<String>,
}

impl DecodedUpdate {
    pub fn is_clean(&self) -> bool {
        self.has_total && self.malformed.is_empty()
    }
}

/// Decode an update payload. A missing or unreadable total decodes as 0.
pub fn decode_update(payload: &str) -> DecodedUpdate {
    let mut decoded = DecodedUpdate::default();

    for token in tokenize(payload) {
        match token {
            Token::ItemPair { name, quantity } => {
                decoded.snapshot.lines.push(SnapshotLine { name, quantity });
            }
            Token::TotalPair(amount) => {
                decoded.snapshot.total = amount;
                decoded.has_total = true;
            }
            Token::Malformed(segment) => decoded.malformed.push(segment),
        }
    }

    decoded
}

/// Decode one line (with or without its '\n'). Never fails.
pub fn decode(line: &str) -> Frame {
    let line = line.trim_end_matches(['\r', '\n']).trim();

    if let Some(payload) = line.strip_prefix(UPDATE_PREFIX) {
        let decoded = decode_update(payload);
        if !decoded.is_clean() {
            tracing::warn!(
                has_total = decoded.has_total,
                malformed = ?decoded.malformed,
                "degraded update frame"
            );
        }
        return Frame::Update(decoded.snapshot);
    }

    if let Some(payload) = line.strip_prefix(BUDGET_PREFIX) {
        let amount = parse_amount(payload).unwrap_or_else(|| {
            tracing::warn!(payload, "unreadable budget amount, using 0");
            Decimal::ZERO
        });
        return Frame::Budget(amount);
    }

    match line {
        LOW_BUDGET => Frame::LowBudget,
        NO_BUDGET => Frame::NoBudget,
        other => Frame::Unknown(other.to_string()),
    }
}

// ============================================================================
// LINE REASSEMBLY
// ============================================================================

/// Collects bytes from a stream and hands back complete lines.
///
/// Only the newest complete line matters: older complete lines still waiting
/// in the buffer are dropped when a newer one is taken. A trailing partial
/// line is kept for the next read.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    complete: Option<String>,
    dropped: u64,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        if let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') {
            let rest = self.pending.split_off(last_newline + 1);
            let finished = std::mem::replace(&mut self.pending, rest);

            let mut lines = finished
                .split(|b| *b == b'\n')
                .map(|raw| String::from_utf8_lossy(raw).trim_end_matches('\r').to_string())
                .filter(|line| !line.trim().is_empty())
                .collect::<Vec<_>>();

            if let Some(newest) = lines.pop() {
                let superseded = lines.len() as u64 + u64::from(self.complete.is_some());
                self.dropped += superseded;
                self.complete = Some(newest);
            }
        }

        if self.pending.len() > MAX_LINE_BYTES {
            tracing::warn!(bytes = self.pending.len(), "partial line too long, discarding");
            self.pending.clear();
        }
    }

    pub fn has_line(&self) -> bool {
        self.complete.is_some()
    }

    /// Newest complete line, if any
    pub fn take_latest(&mut self) -> Option<String> {
        self.complete.take()
    }

    /// Complete lines superseded before they were read
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn partial_len(&self) -> usize {
        self.pending.len()
    }
}
