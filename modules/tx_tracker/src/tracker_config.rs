//! Tracker configuration

use std::fmt::{self, Display, Formatter};

use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::info;

pub const CONFIG_KEY_SETTLEMENT_MODE: &str = "settlement_mode";

/// How settlements on blocks that lose a fork are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Revert to pending at the original arrival position and re-test.
    #[default]
    Provisional,
    /// Keep the first settlement; drop it silently if its fork is abandoned.
    Permanent,
}

impl SettlementMode {
    /// Read the mode, defaulting when the key is absent. A value that is
    /// present but not a known mode is an error.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        match config.get::<SettlementMode>(CONFIG_KEY_SETTLEMENT_MODE) {
            Ok(mode) => Ok(mode),
            Err(ConfigError::NotFound(_)) => Ok(SettlementMode::default()),
            Err(e) => Err(e),
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, SettlementMode::Provisional)
    }
}

impl Display for SettlementMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SettlementMode::Provisional => write!(f, "provisional"),
            SettlementMode::Permanent => write!(f, "permanent"),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    pub settlement_mode: SettlementMode,
}

impl TrackerConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let settlement_mode = SettlementMode::from_config(config)?;
        info!("Settlement mode {settlement_mode}");
        Ok(Self { settlement_mode })
    }
}
