use serde::Deserialize;

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::rs::{PeerUniverse, PoolKind};

fn default_rs_lookback_days() -> usize {
    PeerUniverse::DEFAULT_LOOKBACK_DAYS
}

/// Settings for the `screen` binary. Any format the `config` crate
/// recognizes by extension works (TOML, JSON, YAML).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScreenConfig {
    /// Directory holding one `<SYMBOL>.csv` per symbol.
    pub data_dir: PathBuf,
    pub symbols: Vec<String>,
    /// Index compared against for the RS line, e.g. `SPY`.
    #[serde(default)]
    pub benchmark: Option<String>,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub peer_pool: PoolKind,
    #[serde(default = "default_rs_lookback_days")]
    pub rs_lookback_days: usize,
    /// Summary CSV; printed to stdout when unset.
    #[serde(default)]
    pub output_csv: Option<PathBuf>,
}

impl ScreenConfig {
    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let filename = path
            .into_os_string()
            .into_string()
            .map_err(|_| ConfigError::FilePathIntoString)?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(&filename))
            .build()
            .map_err(|err| ConfigError::SettingsInit(err.to_string()))?
            .try_deserialize()
            .map_err(|err| ConfigError::Deserialize(err.to_string()))?;
        Ok(config)
    }
}
