//! Synthetic series builders shared by the unit tests.

use chrono::{Days, NaiveDate};

use crate::data::Bar;

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date") + Days::new(i as u64)
}

/// Zero-width bars (open = high = low = close) for each close.
pub fn bars_from_closes(closes: &[f64], volume: u64) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            date: day(i),
            open: c,
            high: c,
            low: c,
            close: c,
            volume,
        })
        .collect()
}

pub fn flat_series(len: usize, close: f64, volume: u64) -> Vec<Bar> {
    bars_from_closes(&vec![close; len], volume)
}

/// Piecewise-linear closes through `(index, value)` anchors.
/// Anchors must be sorted by index and start at 0.
pub fn zigzag(anchors: &[(usize, f64)]) -> Vec<f64> {
    let mut out = Vec::new();
    for pair in anchors.windows(2) {
        let (i0, v0) = pair[0];
        let (i1, v1) = pair[1];
        let steps = (i1 - i0) as f64;
        for i in i0..i1 {
            out.push(v0 + (v1 - v0) * (i - i0) as f64 / steps);
        }
    }
    if let Some(&(_, last)) = anchors.last() {
        out.push(last);
    }
    out
}

pub fn approx_eq(a: f64, b: f64, eps: f64) {
    assert!(
        (a - b).abs() <= eps,
        "expected {b}, got {a} (diff = {})",
        (a - b).abs()
    );
}

/// Three contractions of 30%, 20% and 10% off a 100 peak, inside 76 bars.
/// Swing highs sit at 20, 40, 60 and swing lows at 30, 50, 70.
pub fn three_leg_vcp_closes() -> Vec<f64> {
    zigzag(&[
        (0, 60.0),
        (20, 100.0),
        (30, 70.0),
        (40, 100.0),
        (50, 80.0),
        (60, 100.0),
        (70, 90.0),
        (75, 95.0),
    ])
}
