use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::data::{Bar, highest_high, lowest_low};
use crate::indicators::atr_percent;

pub const MIN_BARS: usize = 120;

const SCAN_DAYS: usize = 80;
const EXPLOSIVE_DAYS: usize = 40;
const EXPLOSIVE_PCT_MIN: f64 = 100.0;
const EXPLOSIVE_VOL_MULT: f64 = 2.0;
const PRE_VOLUME_DAYS: usize = 50;
const PRE_QUIET_DAYS: usize = 20;
const PRE_QUIET_ATR_PCT_MAX: f64 = 0.03;
/// Base lengths tried in order: three to six weeks first, then the short ones.
const BASE_LENGTHS: [usize; 6] = [15, 20, 25, 30, 12, 10];
const BASE_MAX_LOOK: usize = 40;
/// Three weeks is the textbook base; 10 to 12 sessions still count.
const BASE_MIN_DAYS: usize = 15;
const BASE_MIN_ALT_DAYS: usize = 10;
const BASE_MAX_DAYS: usize = 30;
const CORRECTION_MAX_PCT: f64 = 20.0;
const CORRECTION_MAX_PCT_LOW_PRICE: f64 = 25.0;
const LOW_PRICE_THRESHOLD: f64 = 20.0;
/// Bases correcting at most this much skip the tightness requirement.
const NO_TIGHT_NEEDED_PCT: f64 = 10.0;
const TIGHT_ATR_PCT_MAX: f64 = 0.03;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerPlayThresholds {
    pub explosive_pct_min: f64,
    pub explosive_lookback_days: usize,
    pub explosive_vol_mult: f64,
    pub base_min_days: usize,
    pub base_min_alt_days: usize,
    pub base_max_days: usize,
    pub correction_max_pct: f64,
    pub correction_max_pct_low_price: f64,
    pub low_price_threshold: f64,
    pub no_tight_needed_pct: f64,
    pub tight_atr_pct_max: f64,
    pub pre_quiet_atr_pct_max: f64,
    pub pre_quiet_days: usize,
}

impl Default for PowerPlayThresholds {
    fn default() -> Self {
        Self {
            explosive_pct_min: EXPLOSIVE_PCT_MIN,
            explosive_lookback_days: EXPLOSIVE_DAYS,
            explosive_vol_mult: EXPLOSIVE_VOL_MULT,
            base_min_days: BASE_MIN_DAYS,
            base_min_alt_days: BASE_MIN_ALT_DAYS,
            base_max_days: BASE_MAX_DAYS,
            correction_max_pct: CORRECTION_MAX_PCT,
            correction_max_pct_low_price: CORRECTION_MAX_PCT_LOW_PRICE,
            low_price_threshold: LOW_PRICE_THRESHOLD,
            no_tight_needed_pct: NO_TIGHT_NEEDED_PCT,
            tight_atr_pct_max: TIGHT_ATR_PCT_MAX,
            pre_quiet_atr_pct_max: PRE_QUIET_ATR_PCT_MAX,
            pre_quiet_days: PRE_QUIET_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplosiveMove {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub return_pct: f64,
    pub vol_mult: Option<f64>,
    pub pre_quiet: Option<bool>,
    #[serde(skip)]
    end_idx: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerPlayBase {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: usize,
    pub correction_pct: f64,
    pub is_low_price: bool,
    pub tight_ok: bool,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub breakout: bool,
    pub last_close: f64,
    pub base_high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerPlayPattern {
    pub qualifies: bool,
    pub reasons: Vec<String>,
    pub thresholds: PowerPlayThresholds,
    pub explosive: ExplosiveMove,
    pub base: PowerPlayBase,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PowerPlayCheck {
    Return(f64),
    Volume(Option<f64>),
    BaseTooShort(usize),
    BaseTooLong(usize),
    Correction { pct: f64, limit: f64 },
}

impl fmt::Display for PowerPlayCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerPlayCheck::Return(pct) => write!(
                f,
                "explosive move {pct:.1}% below {EXPLOSIVE_PCT_MIN}%"
            ),
            PowerPlayCheck::Volume(mult) => write!(
                f,
                "explosive volume too light ({:.2}x < {EXPLOSIVE_VOL_MULT}x)",
                mult.unwrap_or(0.0)
            ),
            PowerPlayCheck::BaseTooShort(days) => {
                write!(f, "base too short ({days} < {BASE_MIN_ALT_DAYS} days)")
            }
            PowerPlayCheck::BaseTooLong(days) => {
                write!(f, "base too long ({days} > {BASE_MAX_DAYS} days)")
            }
            PowerPlayCheck::Correction { pct, limit } => {
                write!(f, "base correction {pct:.1}% over the limit (>{limit}%)")
            }
        }
    }
}

/// Maximum base correction: 20%, or 25% for stocks under $20.
pub fn correction_limit(last_close: f64) -> f64 {
    if last_close < LOW_PRICE_THRESHOLD {
        CORRECTION_MAX_PCT_LOW_PRICE
    } else {
        CORRECTION_MAX_PCT
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> Option<f64> {
    let n = values.len();
    (n > 0).then(|| values.sum::<f64>() / n as f64)
}

/// Recognize a power play: a 100%+ move in eight weeks followed by a
/// shallow, short sideways base.
///
/// Returns None with fewer than 120 bars, without an explosive window in
/// the last 80 bars, or without a base that fits after it.
pub fn analyze_power_play(bars: &[Bar]) -> Option<PowerPlayPattern> {
    if bars.len() < MIN_BARS {
        debug!(bars = bars.len(), "power play: not enough history");
        return None;
    }

    let Some(explosive) = find_explosive_move(bars) else {
        debug!("power play: no explosive window");
        return None;
    };
    let Some(base) = find_base(bars, explosive.end_idx + 1) else {
        debug!("power play: no base after the explosive move");
        return None;
    };

    let last_close = bars.last()?.close;
    let limit = if base.is_low_price {
        CORRECTION_MAX_PCT_LOW_PRICE
    } else {
        CORRECTION_MAX_PCT
    };

    let checks = [
        (
            explosive.return_pct >= EXPLOSIVE_PCT_MIN,
            PowerPlayCheck::Return(explosive.return_pct),
        ),
        (
            explosive.vol_mult.is_none_or(|m| m >= EXPLOSIVE_VOL_MULT),
            PowerPlayCheck::Volume(explosive.vol_mult),
        ),
        (
            base.days >= BASE_MIN_ALT_DAYS,
            PowerPlayCheck::BaseTooShort(base.days),
        ),
        (
            base.days <= BASE_MAX_DAYS,
            PowerPlayCheck::BaseTooLong(base.days),
        ),
        (
            base.correction_pct <= limit,
            PowerPlayCheck::Correction {
                pct: base.correction_pct,
                limit,
            },
        ),
    ];
    let qualifies = checks.iter().all(|(ok, _)| *ok);
    let reasons = checks
        .iter()
        .filter(|(ok, _)| !ok)
        .map(|(_, check)| check.to_string())
        .collect();

    debug!(
        qualifies,
        return_pct = explosive.return_pct,
        base_days = base.days,
        "power play: located"
    );

    Some(PowerPlayPattern {
        qualifies,
        reasons,
        thresholds: PowerPlayThresholds::default(),
        trigger: Trigger {
            breakout: last_close > base.high,
            last_close,
            base_high: base.high,
        },
        explosive,
        base,
    })
}

/// The earliest 40-bar window in the last 80 bars that at least doubled.
fn find_explosive_move(bars: &[Bar]) -> Option<ExplosiveMove> {
    let start = bars.len().saturating_sub(SCAN_DAYS);
    let last_start = bars.len().checked_sub(EXPLOSIVE_DAYS)?;

    for i in start..=last_start {
        let j = i + EXPLOSIVE_DAYS - 1;
        let (first, last) = (bars[i].close, bars[j].close);
        if !(first.is_finite() && last.is_finite()) || first <= 0.0 {
            continue;
        }
        let return_pct = (last / first - 1.0) * 100.0;
        if return_pct < EXPLOSIVE_PCT_MIN {
            continue;
        }

        let window_vol = mean(bars[i..=j].iter().map(|b| b.volume as f64));
        let pre_vol = mean(
            bars[i.saturating_sub(PRE_VOLUME_DAYS)..i]
                .iter()
                .map(|b| b.volume as f64),
        );
        let vol_mult = match (window_vol, pre_vol) {
            (Some(w), Some(p)) if p > 0.0 => Some(w / p),
            _ => None,
        };

        let pre_quiet = atr_percent(&bars[..i.max(1)], PRE_QUIET_DAYS)
            .map(|pct| pct <= PRE_QUIET_ATR_PCT_MAX);

        return Some(ExplosiveMove {
            start_date: bars[i].date,
            end_date: bars[j].date,
            return_pct,
            vol_mult,
            pre_quiet,
            end_idx: j,
        });
    }
    None
}

/// First base length, in preference order, whose correction fits.
fn find_base(bars: &[Bar], post_start: usize) -> Option<PowerPlayBase> {
    let max_look = bars.len().saturating_sub(post_start).min(BASE_MAX_LOOK);
    if max_look == 0 {
        return None;
    }

    for len in BASE_LENGTHS.into_iter().filter(|&len| len <= max_look) {
        let seg = &bars[post_start..post_start + len];
        let (_, hi) = highest_high(seg)?;
        let (_, lo) = lowest_low(seg)?;
        if !hi.is_finite() || hi <= 0.0 || !lo.is_finite() {
            continue;
        }

        let correction_pct = (hi - lo) / hi * 100.0;
        let seg_close = seg[seg.len() - 1].close;
        let is_low_price = seg_close < LOW_PRICE_THRESHOLD;
        let corr_ok = correction_pct <= correction_limit(seg_close);

        // Deeper bases must at least be tight; unknown tightness passes.
        let tight_ok = correction_pct <= NO_TIGHT_NEEDED_PCT
            || atr_percent(seg, seg.len()).is_none_or(|pct| pct <= TIGHT_ATR_PCT_MAX);

        if corr_ok && tight_ok {
            return Some(PowerPlayBase {
                start_date: seg[0].date,
                end_date: seg[len - 1].date,
                days: len,
                correction_pct,
                is_low_price,
                tight_ok,
                high: hi,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{approx_eq, bars_from_closes, flat_series, zigzag};

    /// 50 quiet bars, a 120% run over bars 50..=89 on triple volume, a spike
    /// to 112, a 24% flush and a flat base at 86.
    fn explosive_then_base(scale: f64) -> Vec<Bar> {
        let closes: Vec<f64> = zigzag(&[
            (0, 50.0),
            (50, 50.0),
            (89, 110.0),
            (90, 112.0),
            (91, 85.12),
            (92, 86.0),
            (129, 86.0),
        ])
        .into_iter()
        .map(|c| c * scale)
        .collect();
        let mut bars = bars_from_closes(&closes, 1_000);
        for bar in &mut bars[50..=89] {
            bar.volume = 3_000;
        }
        bars
    }

    #[test]
    fn test_correction_limit_low_price_carve_out() {
        approx_eq(correction_limit(19.99), 25.0, 1e-12);
        approx_eq(correction_limit(20.0), 20.0, 1e-12);
        approx_eq(correction_limit(150.0), 20.0, 1e-12);
    }

    #[test]
    fn test_power_play_requires_120_bars() {
        let bars = explosive_then_base(1.0);
        assert!(analyze_power_play(&bars[..119]).is_none());
    }

    #[test]
    fn test_power_play_flat_series_has_no_explosive_move() {
        assert!(analyze_power_play(&flat_series(200, 50.0, 1_000)).is_none());
    }

    #[test]
    fn test_power_play_24pct_base_fails_above_20_dollars() {
        // every base length contains the 112 -> 85.12 flush
        assert!(analyze_power_play(&explosive_then_base(1.0)).is_none());
    }

    #[test]
    fn test_power_play_24pct_base_qualifies_below_20_dollars() {
        let bars = explosive_then_base(0.1);
        let pp = analyze_power_play(&bars).expect("low-price base fits");

        assert!(pp.qualifies, "reasons: {:?}", pp.reasons);
        assert_eq!(pp.base.days, 15);
        assert!(pp.base.is_low_price);
        approx_eq(pp.base.correction_pct, 24.0, 1e-9);
        assert!(pp.base.tight_ok);
        approx_eq(pp.base.high, 11.2, 1e-9);
        assert_eq!(pp.base.start_date, bars[90].date);
        assert_eq!(pp.base.end_date, bars[104].date);

        approx_eq(pp.explosive.vol_mult.unwrap(), 3.0, 1e-9);
        assert_eq!(pp.explosive.pre_quiet, Some(true));

        assert!(!pp.trigger.breakout);
        approx_eq(pp.trigger.last_close, 8.6, 1e-9);
    }

    #[test]
    fn test_thresholds_report_both_base_minimums() {
        let pp = analyze_power_play(&explosive_then_base(0.1)).unwrap();
        let thresholds = serde_json::to_value(&pp.thresholds).unwrap();

        assert_eq!(thresholds["baseMinDays"], serde_json::json!(15));
        assert_eq!(thresholds["baseMinAltDays"], serde_json::json!(10));
        assert_eq!(thresholds["baseMaxDays"], serde_json::json!(30));
    }

    #[test]
    fn test_power_play_takes_earliest_explosive_window() {
        // windows starting at 50 and 51 both double; the scan keeps the first
        let bars = explosive_then_base(0.1);
        let pp = analyze_power_play(&bars).unwrap();
        assert_eq!(pp.explosive.start_date, bars[50].date);
        assert_eq!(pp.explosive.end_date, bars[89].date);
        approx_eq(pp.explosive.return_pct, 120.0, 1e-9);
    }

    #[test]
    fn test_power_play_light_explosive_volume_is_reported() {
        let mut bars = explosive_then_base(0.1);
        for bar in &mut bars[50..=89] {
            bar.volume = 1_500;
        }
        let pp = analyze_power_play(&bars).unwrap();
        assert!(!pp.qualifies);
        assert_eq!(pp.reasons.len(), 1);
        assert!(pp.reasons[0].contains("1.50x"));
    }

    #[test]
    fn test_power_play_trigger_on_close_above_base_high() {
        let mut bars = explosive_then_base(0.1);
        let last = bars.len() - 1;
        bars[last].close = 11.5;
        bars[last].high = 11.5;
        let pp = analyze_power_play(&bars).unwrap();
        assert!(pp.trigger.breakout);
    }
}
