use std::path::PathBuf;

use config::{Config, ConfigError};
use lifecycle_module_tx_tracker::TrackerConfig;
use tracing::info;

const DEFAULT_INPUT: (&str, &str) = ("input", "input.json");
const DEFAULT_EXPECTED: (&str, &str) = ("expected", "output.json");

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub input: PathBuf,
    pub expected: PathBuf,
    pub tracker: TrackerConfig,
}

impl EvaluatorConfig {
    fn conf(config: &Config, keydef: (&str, &str)) -> PathBuf {
        let actual = config.get_string(keydef.0).unwrap_or(keydef.1.to_string());
        info!("Using '{}' for {}", actual, keydef.0);
        PathBuf::from(actual)
    }

    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            input: Self::conf(config, DEFAULT_INPUT),
            expected: Self::conf(config, DEFAULT_EXPECTED),
            tracker: TrackerConfig::from_config(config)?,
        })
    }
}
