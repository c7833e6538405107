pub mod atr;
pub mod sma;
pub mod trend;

pub use atr::{atr_percent, average_true_range, true_range};
pub use sma::{moving_average, simple_moving_average, trailing_mean};
pub use trend::{consecutive_rising_count, percentile_rank, period_return};
