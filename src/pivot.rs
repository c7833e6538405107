use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::data::{Bar, DateRange, highest_high, tail, volumes};
use crate::indicators::{atr_percent, trailing_mean};
use crate::vcp::{VCP_LOOKBACK, VcpResult};

/// Chase allowance above the pivot, as a fraction.
const BUY_ZONE_CHASE: f64 = 0.03;
/// Dry-up: 10-bar average volume below 70% of the 50-bar average.
pub const DRY_FACTOR: f64 = 0.7;
/// Extreme-low volume: at most 35% of the 50-bar average.
const EXTREME_FACTOR: f64 = 0.35;
const EXTREME_WINDOW: usize = 10;
pub const ATR_LEN: usize = 14;
/// Tight: ATR(14) / close at most 3%.
pub const MAX_ATR_PCT: f64 = 0.03;
/// Advisory breakout volume: 1.8x the 10-bar average.
pub const BREAKOUT_VOL_MULT: f64 = 1.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyZone {
    pub from: f64,
    pub to: f64,
    pub max_chase_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeQuality {
    #[serde(rename = "volSMA10")]
    pub vol_sma10: Option<f64>,
    #[serde(rename = "volSMA50")]
    pub vol_sma50: Option<f64>,
    pub dry_ok: Option<bool>,
    pub extreme_low_days: usize,
    pub extreme_factor: f64,
    pub dry_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tightness {
    pub atr_pct: Option<f64>,
    pub max_atr_pct: f64,
    pub tight_ok: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakoutVolume {
    pub vol_mult: f64,
    pub vol_needed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotResult {
    pub pivot: f64,
    pub pivot_date: NaiveDate,
    pub range: DateRange,
    pub buy_zone: BuyZone,
    pub last_close: f64,
    pub is_above_pivot: bool,
    pub volume: VolumeQuality,
    pub tightness: Tightness,
    pub breakout: BreakoutVolume,
}

/// 10- and 50-bar average volume at the end of `vols` and whether the
/// shorter one has dried up below `DRY_FACTOR` of the longer.
pub(crate) fn volume_dry_up(vols: &[f64]) -> (Option<f64>, Option<f64>, Option<bool>) {
    let sma10 = trailing_mean(vols, 10);
    let sma50 = trailing_mean(vols, 50);
    let dry_ok = match (sma10, sma50) {
        (Some(v10), Some(v50)) => Some(v10 < v50 * DRY_FACTOR),
        _ => None,
    };
    (sma10, sma50, dry_ok)
}

/// ATR(14) / close at the end of `bars` and whether it is tight enough.
pub(crate) fn tightness(bars: &[Bar]) -> (Option<f64>, Option<bool>) {
    let atr_pct = atr_percent(bars, ATR_LEN);
    (atr_pct, atr_pct.map(|p| p <= MAX_ATR_PCT))
}

/// Locate the breakout trigger of a qualifying VCP.
///
/// The pivot is the highest high across the best contraction run; volume
/// and tightness are measured at the end of that run. Returns None unless
/// `vcp.best` qualifies.
pub fn estimate_pivot(bars: &[Bar], vcp: &VcpResult) -> Option<PivotResult> {
    if !vcp.best.is_vcp {
        return None;
    }

    // Same window the detector indexed into.
    let window = tail(bars, VCP_LOOKBACK);
    let start_bar = vcp.contractions.get(vcp.best.start?)?.start_bar;
    let end_bar = vcp.contractions.get(vcp.best.end?)?.end_bar;
    let seg = window.get(start_bar..=end_bar)?;

    let (pivot_idx, pivot) = highest_high(seg)?;
    if !pivot.is_finite() {
        return None;
    }

    let up_to_end = &window[..=end_bar];
    let (vol_sma10, vol_sma50, dry_ok) = volume_dry_up(&volumes(up_to_end));

    let extreme_low_days = vol_sma50.map_or(0, |v50| {
        tail(seg, EXTREME_WINDOW)
            .iter()
            .filter(|b| b.volume as f64 <= v50 * EXTREME_FACTOR)
            .count()
    });

    let (atr_pct, tight_ok) = tightness(up_to_end);

    let last_close = bars.last()?.close;

    debug!(pivot, ?dry_ok, ?tight_ok, "pivot: estimated from best contraction run");

    Some(PivotResult {
        pivot,
        pivot_date: seg[pivot_idx].date,
        range: DateRange::of(seg)?,
        buy_zone: BuyZone {
            from: pivot,
            to: pivot * (1.0 + BUY_ZONE_CHASE),
            max_chase_pct: BUY_ZONE_CHASE * 100.0,
        },
        last_close,
        is_above_pivot: last_close >= pivot,
        volume: VolumeQuality {
            vol_sma10,
            vol_sma50,
            dry_ok,
            extreme_low_days,
            extreme_factor: EXTREME_FACTOR,
            dry_factor: DRY_FACTOR,
        },
        tightness: Tightness {
            atr_pct,
            max_atr_pct: MAX_ATR_PCT,
            tight_ok,
        },
        breakout: BreakoutVolume {
            vol_mult: BREAKOUT_VOL_MULT,
            vol_needed: vol_sma10.map(|v| v * BREAKOUT_VOL_MULT),
        },
    })
}
