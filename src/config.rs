// ⚙️ Settings - optional TOML file layered under CARTLINK_* environment variables
//
//   CARTLINK_SCANNER__SERVER_ADDR=10.0.0.2:7878
//   CARTLINK_SERVER__LOW_BUDGET_PERCENT=25

use crate::budget::LOW_BUDGET_PERCENT;
use crate::catalog::Catalog;
use crate::error::ConfigError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "cartlink.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scanner: ScannerSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Where the server node listens for the link
    pub server_addr: String,

    /// How long remove mode waits for a scan
    pub dwell_ms: u64,

    pub poll_interval_ms: u64,

    /// How long an event message stays on the display
    pub feedback_hold_ms: u64,

    /// CSV catalog; the built-in demo catalog when unset
    pub catalog_path: Option<PathBuf>,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        ScannerSettings {
            server_addr: "127.0.0.1:7878".to_string(),
            dwell_ms: 5000,
            poll_interval_ms: 20,
            feedback_hold_ms: 1500,
            catalog_path: None,
        }
    }
}

impl ScannerSettings {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn feedback_hold(&self) -> Duration {
        Duration::from_millis(self.feedback_hold_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Node link listener
    pub link_addr: String,

    /// Web view listener
    pub http_addr: String,

    /// CSV catalog used to price mirrored items
    pub catalog_path: Option<PathBuf>,

    /// Percent of budget remaining at or below which the cart is low
    pub low_budget_percent: Decimal,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            link_addr: "0.0.0.0:7878".to_string(),
            http_addr: "0.0.0.0:3000".to_string(),
            catalog_path: None,
            low_budget_percent: LOW_BUDGET_PERCENT,
        }
    }
}

impl Settings {
    /// Load from `path` (missing file is fine) then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("CARTLINK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Catalog from a CSV file, or the demo catalog when no path is configured
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog, ConfigError> {
    match path {
        Some(path) => Catalog::from_csv_path(path),
        None => Ok(Catalog::demo()),
    }
}
