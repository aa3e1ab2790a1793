// Cartlink - Core Library
// Shared by the scanner node (cartlink) and the server node (cartlink-server)

pub mod budget;
pub mod catalog;
pub mod config;
pub mod error;
pub mod feedback;
pub mod ledger;
pub mod mode;
pub mod protocol;
pub mod scanner;
pub mod server_node;
pub mod transport;

// Re-export commonly used types
pub use budget::{
    classify, classify_with, percent_remaining,
    BudgetStatus, ThresholdState, LOW_BUDGET_PERCENT,
};
pub use catalog::{Catalog, Item, TagId};
pub use crate::config::{load_catalog, ScannerSettings, ServerSettings, Settings, DEFAULT_CONFIG_FILE};
pub use error::{BudgetError, ConfigError, ScanError};
pub use feedback::{Feedback, FeedbackSink, Led, Tone};
pub use ledger::{Ledger, LedgerSnapshot, ScanOutcome, SnapshotLine};
pub use mode::{Mode, ModeMachine, ModeTransition};
pub use protocol::{
    decode, decode_update, encode, format_amount, tokenize,
    DecodedUpdate, Frame, LineBuffer, Token,
};
pub use scanner::{BudgetSignal, ButtonLatch, ScannerNode, TagQueue, TagReader, Trigger};
pub use server_node::{CartLineView, CartView, ServerNode};
pub use transport::{LineTransport, MemoryLink, TcpLineTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
