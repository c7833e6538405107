/// Number of strictly rising adjacent pairs at the end of `series`,
/// counted backwards until the first non-increase.
pub fn consecutive_rising_count(series: &[f64]) -> usize {
    series
        .windows(2)
        .rev()
        .take_while(|w| w[1] > w[0])
        .count()
}

/// Percentile rank of `value` within `population`, as an integer in [1, 99].
///
/// Non-finite members of the population are ignored. Returns None when the
/// population is empty or `value` is not finite.
pub fn percentile_rank(value: f64, population: &[f64]) -> Option<u8> {
    if !value.is_finite() {
        return None;
    }
    let mut sorted: Vec<f64> = population.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let count = sorted.iter().take_while(|&&v| v <= value).count();
    let pct = count as f64 / sorted.len() as f64;
    Some((pct * 100.0).round().clamp(1.0, 99.0) as u8)
}

/// `last / first - 1` over the trailing `lookback_days + 1` closes.
/// Returns None with insufficient history or a zero/non-finite endpoint.
pub fn period_return(closes: &[f64], lookback_days: usize) -> Option<f64> {
    if closes.len() < lookback_days + 1 {
        return None;
    }
    let first = closes[closes.len() - lookback_days - 1];
    let last = *closes.last()?;
    if first == 0.0 || last == 0.0 || !first.is_finite() || !last.is_finite() {
        return None;
    }
    Some(last / first - 1.0)
}
