use thiserror::Error;

/// Input-validation failures. These are the only errors that abort a whole
/// analysis call; everything else degrades to an absent sub-result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("series is empty")]
    EmptySeries,

    #[error("invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("bar at index {index} is not after the previous bar's date")]
    OutOfOrder { index: usize },
}

/// Failures reported by a daily-bar source. "No data" is kept distinct from
/// a bad symbol and from throttling so callers can react differently.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("rate limited while fetching {0}")]
    RateLimited(String),

    #[error("no daily bars available for {0}")]
    NoData(String),

    #[error("failed to load bars for {symbol}")]
    Load {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Why one symbol of a screen produced no report.
#[derive(Debug, Error)]
pub enum ScreenError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("analysis rejected the series: {0}")]
    Analysis(#[from] AnalysisError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file path is not valid UTF-8")]
    FilePathIntoString,

    #[error("failed to read settings: {0}")]
    SettingsInit(String),

    #[error("failed to deserialize settings: {0}")]
    Deserialize(String),
}
