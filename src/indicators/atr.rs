use crate::data::Bar;

/// TR = max(high - low, |high - prev_close|, |low - prev_close|)
pub fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

/// Simple (non-smoothed) ATR over the trailing `period` bars of `bars`.
///
/// Bar `i` contributes its true range against `bars[i - 1].close`, so the
/// first bar of the slice never contributes. When the slice is shorter than
/// `period + 1`, every available pair is averaged instead.
/// Returns None if no true range can be formed.
pub fn average_true_range(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < 2 {
        return None;
    }

    let n = bars.len();
    let start = n.saturating_sub(period).max(1);
    let mut sum_tr = 0.0;

    for i in start..n {
        sum_tr += true_range(&bars[i], bars[i - 1].close);
    }

    Some(sum_tr / (n - start) as f64)
}

/// ATR as a fraction of the last close (e.g. 0.02 = 2%).
pub fn atr_percent(bars: &[Bar], period: usize) -> Option<f64> {
    let atr_val = average_true_range(bars, period)?;
    let last_close = bars.last()?.close;
    if last_close <= 0.0 || !last_close.is_finite() || !atr_val.is_finite() {
        return None;
    }
    Some(atr_val / last_close)
}
