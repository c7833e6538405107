/// Moving-average series over `values`.
///
/// Element `k` is the mean of `values[k..k + period]`, so the output has
/// `max(0, len - period + 1)` elements. Uses a running sum (O(n)).
/// Returns an empty vec if there isn't enough data or `period == 0`.
pub fn moving_average(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut window_sum = 0.0;

    for (i, &v) in values.iter().enumerate() {
        window_sum += v;
        if i >= period {
            window_sum -= values[i - period];
        }
        if i + 1 >= period {
            out.push(window_sum / period as f64);
        }
    }
    out
}

/// Compute the simple moving average over the last `window` values.
/// Returns None if there isn't enough data.
pub fn simple_moving_average(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }

    let start = prices.len() - window;
    let slice = &prices[start..];
    let sum: f64 = slice.iter().copied().sum();
    Some(sum / window as f64)
}

/// Mean of the trailing `n` values, or of all of them when fewer exist.
/// Returns None only for an empty input or `n == 0`.
pub fn trailing_mean(values: &[f64], n: usize) -> Option<f64> {
    if n == 0 || values.is_empty() {
        return None;
    }
    let slice = &values[values.len().saturating_sub(n)..];
    Some(slice.iter().sum::<f64>() / slice.len() as f64)
}
