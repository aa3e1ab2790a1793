// ⚠️ Error Taxonomy - every condition is local and non-fatal
//
// Scan conditions become feedback on the scanner node. Malformed frames are
// not errors at all: they degrade to zero values inside the codec (see
// `protocol::Token::Malformed`). Only configuration loading can fail hard.

use thiserror::Error;

/// Conditions reported by a scan that leave the ledger untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// Tag fingerprint is not in the catalog
    #[error("unknown item tag {0}")]
    UnknownItem(String),

    /// Remove requested for an item whose quantity is already 0
    #[error("cannot remove {0}: none in cart")]
    EmptyRemoval(String),
}

impl ScanError {
    /// Short label for the display's primary line
    pub fn headline(&self) -> &'static str {
        match self {
            ScanError::UnknownItem(_) => "Unknown item",
            ScanError::EmptyRemoval(_) => "Not in cart",
        }
    }
}

/// Rejected budget submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    #[error("budget must not be negative (got {0})")]
    Negative(String),
}

/// Failures while building settings or loading a catalog file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("failed to read catalog {path}: {source}")]
    Catalog {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("catalog row {row}: invalid tag '{tag}'")]
    InvalidTag { row: usize, tag: String },

    #[error("catalog row {row}: invalid price '{price}'")]
    InvalidPrice { row: usize, price: String },

    #[error("catalog row {row}: negative price for '{name}'")]
    NegativePrice { row: usize, name: String },
}
