use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::data::{Bar, tail};

/// The detector only looks at the most recent trading year.
pub const VCP_LOOKBACK: usize = 252;
/// Hard floor: shorter windows are never scanned.
pub const MIN_WINDOW_BARS: usize = 60;

const SWING_LEFT: usize = 3;
const SWING_RIGHT: usize = 3;
const MIN_CONTRACTIONS: usize = 3;
/// Each contraction must be at most 70% as deep as the one before it.
const DECREASE_RATIO: f64 = 0.7;
const MAX_LAST_DEPTH_PCT: f64 = 15.0;

/// A swing-high to swing-low decline inside the VCP window.
/// `start_bar` / `end_bar` index into the window, not the full series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractionLeg {
    pub start_bar: usize,
    pub end_bar: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bars: usize,
    pub depth_pct: f64,
    pub high_price: f64,
    pub low_price: f64,
}

/// The rightmost run of contractions that satisfies the decreasing-depth rule.
/// `start` / `end` index into `VcpResult::contractions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestRun {
    #[serde(rename = "isVCP")]
    pub is_vcp: bool,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub depths: Vec<f64>,
    pub widths_bars: Vec<usize>,
    pub total_bars: usize,
    pub count: usize,
}

/// `is_vcp` is the strict check over *every* contraction in the window while
/// `best.is_vcp` only asks for one qualifying trailing run, so the two can
/// disagree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VcpResult {
    #[serde(rename = "isVCP")]
    pub is_vcp: bool,
    pub base_bars: usize,
    pub contractions: Vec<ContractionLeg>,
    pub best: BestRun,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swing {
    pub idx: usize,
    pub price: f64,
    pub is_high: bool,
}

/// Scan the trailing year of `bars` for a volatility contraction pattern.
///
/// Never fails: short windows and degenerate prices give the zero result.
pub fn detect_vcp(bars: &[Bar]) -> VcpResult {
    let window = tail(bars, VCP_LOOKBACK);
    if window.len() < MIN_WINDOW_BARS {
        debug!(bars = window.len(), "vcp: window below {MIN_WINDOW_BARS} bars");
        return VcpResult::default();
    }

    match scan_window(window) {
        Some(result) => {
            debug!(
                contractions = result.contractions.len(),
                is_vcp = result.is_vcp,
                best = result.best.count,
                "vcp: window scanned"
            );
            result
        }
        None => {
            debug!("vcp: degenerate window");
            VcpResult::default()
        }
    }
}

fn scan_window(window: &[Bar]) -> Option<VcpResult> {
    let (highs, lows) = find_swings(window, SWING_LEFT, SWING_RIGHT);
    let pivots = merge_swings(&highs, &lows);

    let contractions = pivots
        .windows(2)
        .filter(|p| p[0].is_high && !p[1].is_high)
        .map(|p| contraction_leg(window, p[0], p[1]))
        .collect::<Option<Vec<_>>>()?;

    let base_bars = match (contractions.first(), contractions.last()) {
        (Some(first), Some(last)) => last.end_bar - first.start_bar,
        _ => 0,
    };

    let is_vcp = contractions.len() >= MIN_CONTRACTIONS
        && contractions
            .windows(2)
            .all(|w| shallower_enough(w[1].depth_pct, w[0].depth_pct))
        && contractions
            .last()
            .is_some_and(|c| c.depth_pct <= MAX_LAST_DEPTH_PCT);

    let best = best_trailing_run(&contractions);

    Some(VcpResult {
        is_vcp,
        base_bars,
        contractions,
        best,
    })
}

fn shallower_enough(newer: f64, older: f64) -> bool {
    newer <= older * DECREASE_RATIO
}

fn contraction_leg(window: &[Bar], high: Swing, low: Swing) -> Option<ContractionLeg> {
    if !(high.price.is_finite() && high.price > 0.0 && low.price.is_finite()) {
        return None;
    }
    Some(ContractionLeg {
        start_bar: high.idx,
        end_bar: low.idx,
        start_date: window[high.idx].date,
        end_date: window[low.idx].date,
        bars: low.idx.saturating_sub(high.idx).max(1),
        depth_pct: ((high.price - low.price) / high.price * 100.0).max(0.0),
        high_price: high.price,
        low_price: low.price,
    })
}

/// Swing highs and lows: a bar whose high (low) is strictly above (below)
/// every bar within `left` bars before and `right` bars after it.
/// Ties disqualify, so flat tops and bottoms produce no swing.
pub fn find_swings(window: &[Bar], left: usize, right: usize) -> (Vec<Swing>, Vec<Swing>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();

    for i in left..window.len().saturating_sub(right) {
        let neighbours = (i - left..i).chain(i + 1..=i + right);
        let bar = &window[i];

        if neighbours.clone().all(|k| bar.high > window[k].high) {
            highs.push(Swing {
                idx: i,
                price: bar.high,
                is_high: true,
            });
        }
        if neighbours.clone().all(|k| bar.low < window[k].low) {
            lows.push(Swing {
                idx: i,
                price: bar.low,
                is_high: false,
            });
        }
    }
    (highs, lows)
}

/// Merge both swing lists into one index-ordered sequence.
/// When a high and a low share an index the high goes first.
pub fn merge_swings(highs: &[Swing], lows: &[Swing]) -> Vec<Swing> {
    let mut merged = Vec::with_capacity(highs.len() + lows.len());
    let (mut i, mut j) = (0, 0);

    while i < highs.len() || j < lows.len() {
        let take_high = j >= lows.len() || (i < highs.len() && highs[i].idx <= lows[j].idx);
        if take_high {
            merged.push(highs[i]);
            i += 1;
        } else {
            merged.push(lows[j]);
            j += 1;
        }
    }
    merged
}

/// Greedy search for the most recent qualifying run.
///
/// Candidate end points are tried from the newest contraction backwards;
/// the first one at most 15% deep whose leftward extension reaches
/// three contractions wins. Ties always go to the most recent run.
pub fn best_trailing_run(contractions: &[ContractionLeg]) -> BestRun {
    for end in (0..contractions.len()).rev() {
        if contractions[end].depth_pct > MAX_LAST_DEPTH_PCT {
            continue;
        }

        let mut start = end;
        while start > 0
            && shallower_enough(contractions[start].depth_pct, contractions[start - 1].depth_pct)
        {
            start -= 1;
        }

        let count = end - start + 1;
        if count >= MIN_CONTRACTIONS {
            let run = &contractions[start..=end];
            return BestRun {
                is_vcp: true,
                start: Some(start),
                end: Some(end),
                depths: run.iter().map(|c| c.depth_pct).collect(),
                widths_bars: run.iter().map(|c| c.bars).collect(),
                total_bars: run.iter().map(|c| c.bars).sum(),
                count,
            };
        }
    }
    BestRun::default()
}
