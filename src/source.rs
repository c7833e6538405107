use std::path::PathBuf;

use tracing::debug;

use crate::data::{Bar, get_bars_from_input_file};
use crate::error::SourceError;

/// Supplier of daily bars for a symbol, oldest first.
///
/// Implementations must keep "no data" apart from a rejected symbol and from
/// throttling so callers can react to each.
pub trait BarSource: Sync {
    fn daily_bars(&self, symbol: &str) -> Result<Vec<Bar>, SourceError>;
}

/// Ticker symbols: letters, digits and the `.`, `-`, `^` separators.
pub fn normalize_symbol(symbol: &str) -> Result<String, SourceError> {
    let trimmed = symbol.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));
    if !valid {
        return Err(SourceError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Reads `<dir>/<SYMBOL>.csv` exports.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }
}

impl BarSource for CsvDirectorySource {
    fn daily_bars(&self, symbol: &str) -> Result<Vec<Bar>, SourceError> {
        let symbol = normalize_symbol(symbol)?;
        let path = self.path_for(&symbol);
        if !path.is_file() {
            debug!(%symbol, path = %path.display(), "source: no csv for symbol");
            return Err(SourceError::NoData(symbol));
        }

        let bars = get_bars_from_input_file(&path).map_err(|source| SourceError::Load {
            symbol: symbol.clone(),
            source,
        })?;
        if bars.is_empty() {
            return Err(SourceError::NoData(symbol));
        }
        Ok(bars)
    }
}
