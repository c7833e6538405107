use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::data::{Bar, DateRange, closes, highest_high, lowest_low, tail, volumes};
use crate::indicators::{consecutive_rising_count, moving_average};
use crate::pivot::{BREAKOUT_VOL_MULT, DRY_FACTOR, MAX_ATR_PCT, tightness, volume_dry_up};
use crate::trend_template::MA200_UP_DAYS_MIN;

/// Roughly one year: shorter series are never scanned.
pub const MIN_BARS: usize = 220;
/// Cup search window, about 45 weeks.
const CUP_LOOKBACK: usize = 225;
/// The low point is searched away from both window edges.
const LOW_SKIP_HEAD: usize = 10;
const LOW_SKIP_TAIL: usize = 5;

const DEPTH_MIN_PCT: f64 = 15.0;
const DEPTH_MAX_PCT: f64 = 50.0;
const DEPTH_TOO_DEEP_PCT: f64 = 60.0;
const DURATION_MIN_WEEKS: i64 = 3;
const DURATION_MAX_WEEKS: i64 = 45;
const RUNUP_LOOKBACK_MIN: usize = 63;
const RUNUP_LOOKBACK_MAX: usize = 756;
const PRIOR_RUNUP_MIN_PCT: f64 = 25.0;
const PLATEAU_WIDTH_MIN_PCT: f64 = 5.0;
const PLATEAU_WIDTH_MAX_PCT: f64 = 10.0;
const RECOUP_MIN: f64 = 0.3;
const RECOUP_MAX: f64 = 0.7;
const CHEAT_FALLBACK_BARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CupVariant {
    /// Early entry from a plateau in the middle third of the cup.
    Cheat,
    /// Early entry from a plateau in the lower third of the cup.
    LowCheat,
}

impl CupVariant {
    fn plateau_len(self) -> usize {
        match self {
            CupVariant::Cheat => 12,
            CupVariant::LowCheat => 15,
        }
    }

    fn region(self) -> &'static str {
        match self {
            CupVariant::Cheat => "middleThird",
            CupVariant::LowCheat => "lowerThird",
        }
    }

    fn in_zone(self, price: f64, levels: &CupLevels) -> bool {
        match self {
            CupVariant::Cheat => price >= levels.mid_line && price < levels.left_peak,
            CupVariant::LowCheat => price <= levels.lower_third,
        }
    }

    fn breakout_needs_volume(self) -> bool {
        matches!(self, CupVariant::Cheat)
    }
}

impl fmt::Display for CupVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CupVariant::Cheat => f.write_str("cheat"),
            CupVariant::LowCheat => f.write_str("low cheat"),
        }
    }
}

struct CupLevels {
    left_peak: f64,
    mid_line: f64,
    lower_third: f64,
}

/// One check behind `qualifies`; its Display is the failure reason.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CupCheck {
    Depth(f64),
    TooDeep(f64),
    Duration(i64),
    PriorRunup(Option<f64>),
    Above200Ma,
    Ma200Rising,
    Pivot(CupVariant),
}

impl fmt::Display for CupCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CupCheck::Depth(d) => write!(
                f,
                "cup depth {d:.1}% outside {DEPTH_MIN_PCT}%-{DEPTH_MAX_PCT}%"
            ),
            CupCheck::TooDeep(d) => {
                write!(f, "cup depth {d:.1}% too deep (>{DEPTH_TOO_DEEP_PCT}%)")
            }
            CupCheck::Duration(w) => write!(
                f,
                "base duration {w} weeks outside {DURATION_MIN_WEEKS}-{DURATION_MAX_WEEKS} weeks"
            ),
            CupCheck::PriorRunup(p) => write!(
                f,
                "prior run-up too small ({:.1}% < {PRIOR_RUNUP_MIN_PCT}%)",
                p.unwrap_or(0.0)
            ),
            CupCheck::Above200Ma => f.write_str("price not above the 200-day MA"),
            CupCheck::Ma200Rising => f.write_str("200-day MA not rising for at least a month"),
            CupCheck::Pivot(CupVariant::Cheat) => {
                f.write_str("no early-entry pivot in the middle third of the cup")
            }
            CupCheck::Pivot(CupVariant::LowCheat) => {
                f.write_str("no early-entry pivot in the lower third of the cup")
            }
        }
    }
}

pub fn depth_ok(depth_pct: f64) -> bool {
    (DEPTH_MIN_PCT..=DEPTH_MAX_PCT).contains(&depth_pct)
}

pub fn too_deep(depth_pct: f64) -> bool {
    depth_pct > DEPTH_TOO_DEEP_PCT
}

fn duration_ok(weeks: i64) -> bool {
    (DURATION_MIN_WEEKS..=DURATION_MAX_WEEKS).contains(&weeks)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthThresholds {
    pub min: f64,
    pub max: f64,
    pub too_deep: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CupThresholds {
    pub depth_pct: DepthThresholds,
    pub duration_weeks: Range<i64>,
    pub prior_runup_pct_min: f64,
    pub ma200_up_days_min: usize,
    pub plateau_width_pct: Range<f64>,
    pub atr_pct_max: f64,
    pub dry_factor: f64,
    pub breakout_vol_mult: Option<f64>,
    pub region: &'static str,
}

impl CupThresholds {
    fn for_variant(variant: CupVariant) -> Self {
        Self {
            depth_pct: DepthThresholds {
                min: DEPTH_MIN_PCT,
                max: DEPTH_MAX_PCT,
                too_deep: DEPTH_TOO_DEEP_PCT,
            },
            duration_weeks: Range {
                min: DURATION_MIN_WEEKS,
                max: DURATION_MAX_WEEKS,
            },
            prior_runup_pct_min: PRIOR_RUNUP_MIN_PCT,
            ma200_up_days_min: MA200_UP_DAYS_MIN,
            plateau_width_pct: Range {
                min: PLATEAU_WIDTH_MIN_PCT,
                max: PLATEAU_WIDTH_MAX_PCT,
            },
            atr_pct_max: MAX_ATR_PCT,
            dry_factor: DRY_FACTOR,
            breakout_vol_mult: variant
                .breakout_needs_volume()
                .then_some(BREAKOUT_VOL_MULT),
            region: variant.region(),
        }
    }
}

/// A cup landmark; `index` points into the cup window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CupPoint {
    pub price: f64,
    pub index: usize,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CupShape {
    pub left_peak: CupPoint,
    pub low_point: CupPoint,
    pub right_high: CupPoint,
    pub depth_pct: f64,
    pub base_bars: usize,
    pub duration_weeks: i64,
    pub mid_line: f64,
    pub upper_third: f64,
    pub lower_third: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CupTrend {
    pub above_200ma: bool,
    pub ma200_slope_up: bool,
    pub ma200_up_days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorRunup {
    pub prior_runup_pct: Option<f64>,
    pub lookback_days: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub price: Option<f64>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyPoints {
    /// Early entry for the variant's zone.
    pub pivot: PricePoint,
    /// Classic handle entry at the left peak.
    pub standard_pivot: PricePoint,
    /// Highest high of the plateau.
    pub reference_high: PricePoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plateau {
    pub length_bars: usize,
    pub high: f64,
    pub low: f64,
    /// Plateau high before the last bar; `steps.breakout` needs a close above it.
    pub breakout_level: Option<f64>,
    pub width_pct: Option<f64>,
    pub width_ok: bool,
    pub shakeout: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndMetrics {
    #[serde(rename = "volSMA10")]
    pub vol_sma10: Option<f64>,
    #[serde(rename = "volSMA50")]
    pub vol_sma50: Option<f64>,
    pub dry_ok: Option<bool>,
    pub atr_pct: Option<f64>,
    pub tight_ok: Option<bool>,
    pub breakout_vol_mult: f64,
    pub breakout_vol_needed: Option<f64>,
    pub last_volume: u64,
}

/// The four-step cup lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CupSteps {
    pub downtrend: bool,
    pub uptrend: bool,
    pub pause: bool,
    pub breakout: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CupPattern {
    pub variant: CupVariant,
    pub qualifies: bool,
    pub reasons: Vec<String>,
    pub thresholds: CupThresholds,
    pub window: DateRange,
    pub cup: CupShape,
    pub trend: CupTrend,
    pub prior: PriorRunup,
    pub buy_points: BuyPoints,
    pub plateau: Plateau,
    pub end_metrics: EndMetrics,
    pub steps: CupSteps,
}

/// Recognize a cup whose right side is forming an early-entry plateau.
///
/// Returns None with fewer than 220 bars or when no left peak / low /
/// right high triple can be located. A located cup that fails its checks
/// is still returned, with `qualifies == false` and the reasons.
pub fn analyze_cup(bars: &[Bar], variant: CupVariant) -> Option<CupPattern> {
    if bars.len() < MIN_BARS {
        debug!(bars = bars.len(), %variant, "cup: not enough history");
        return None;
    }

    let ma200 = moving_average(&closes(bars), 200);
    let last_ma200 = ma200.last().copied();
    let ma200_up_days = consecutive_rising_count(&ma200);
    let ma200_slope_up = ma200_up_days >= MA200_UP_DAYS_MIN;
    let last = bars.last()?;
    let above_200ma = last_ma200.is_some_and(|ma| last.close > ma);

    let start_idx = bars.len().saturating_sub(CUP_LOOKBACK);
    let window = &bars[start_idx..];

    // L, then P to its left and R to its right
    let low_range = window.get(LOW_SKIP_HEAD..window.len().saturating_sub(LOW_SKIP_TAIL))?;
    let (l_off, l_val) = lowest_low(low_range)?;
    let l_idx = LOW_SKIP_HEAD + l_off;
    let (p_idx, p_val) = highest_high(&window[..l_idx])?;
    let (r_off, r_val) = highest_high(&window[l_idx + 1..])?;
    let r_idx = l_idx + 1 + r_off;

    if !(p_val.is_finite() && l_val.is_finite() && r_val.is_finite()) || p_val <= l_val {
        debug!(%variant, "cup: no left peak above the low");
        return None;
    }

    let depth_pct = (p_val - l_val) / p_val * 100.0;
    let base_bars = r_idx.saturating_sub(p_idx).max(1);
    let duration_weeks = (base_bars as f64 / 5.0).round() as i64;

    // Lowest low 3 to 36 months before the left peak.
    let left_global = start_idx + p_idx;
    let runup_start = left_global.saturating_sub(RUNUP_LOOKBACK_MAX);
    let runup_end = left_global.saturating_sub(RUNUP_LOOKBACK_MIN);
    let prior_runup_pct = lowest_low(&bars[runup_start..=runup_end])
        .map(|(_, low)| low)
        .filter(|low| *low > 0.0)
        .map(|low| (p_val / low - 1.0) * 100.0);
    let prior_runup_ok = prior_runup_pct.is_some_and(|p| p >= PRIOR_RUNUP_MIN_PCT);

    let span = p_val - l_val;
    let levels = CupLevels {
        left_peak: p_val,
        mid_line: l_val + span * 0.5,
        lower_third: l_val + span / 3.0,
    };
    let upper_third = l_val + span * 2.0 / 3.0;

    let plateau_len = variant.plateau_len();
    let plateau_bars = tail(window, plateau_len);
    let (plateau_high_idx, plateau_high) = highest_high(plateau_bars)?;
    let (_, plateau_low) = lowest_low(plateau_bars)?;
    let plateau_width_pct =
        (plateau_high > 0.0).then(|| (plateau_high - plateau_low) / plateau_high * 100.0);
    let plateau_width_ok = plateau_width_pct
        .is_some_and(|w| (PLATEAU_WIDTH_MIN_PCT..=PLATEAU_WIDTH_MAX_PCT).contains(&w));

    // The last bar breaks out of the plateau formed before it.
    let breakout_level = plateau_bars
        .split_last()
        .and_then(|(_, before)| highest_high(before))
        .map(|(_, high)| high);

    let pivot = find_pivot(window, plateau_bars, variant, &levels);

    let pre_start = window.len().saturating_sub((plateau_len * 2).max(24));
    let pre_end = window.len().saturating_sub(plateau_len);
    let shakeout = window
        .get(pre_start..pre_end)
        .and_then(lowest_low)
        .is_some_and(|(_, pre_low)| plateau_low < pre_low);

    let (vol_sma10, vol_sma50, dry_ok) = volume_dry_up(&volumes(window));
    let (atr_pct, tight_ok) = tightness(window);
    let breakout_vol_needed = vol_sma10.map(|v| v * BREAKOUT_VOL_MULT);
    let volume_ok = breakout_vol_needed.map(|needed| last.volume as f64 >= needed);

    let recoup = (r_val - l_val) / span;
    let steps = CupSteps {
        downtrend: p_idx < l_idx && depth_pct > 0.0 && ma200_slope_up,
        uptrend: (RECOUP_MIN..=RECOUP_MAX).contains(&recoup),
        pause: plateau_width_ok && dry_ok != Some(false) && tight_ok != Some(false),
        breakout: breakout_level.is_some_and(|h| last.close > h)
            && (!variant.breakout_needs_volume() || volume_ok != Some(false)),
    };

    let checks = [
        (depth_ok(depth_pct), CupCheck::Depth(depth_pct)),
        (!too_deep(depth_pct), CupCheck::TooDeep(depth_pct)),
        (duration_ok(duration_weeks), CupCheck::Duration(duration_weeks)),
        (prior_runup_ok, CupCheck::PriorRunup(prior_runup_pct)),
        (above_200ma, CupCheck::Above200Ma),
        (ma200_slope_up, CupCheck::Ma200Rising),
        (pivot.is_some(), CupCheck::Pivot(variant)),
    ];
    let qualifies = checks.iter().all(|(ok, _)| *ok);
    let reasons = checks
        .iter()
        .filter(|(ok, _)| !ok)
        .map(|(_, check)| check.to_string())
        .collect();

    debug!(%variant, qualifies, depth_pct, duration_weeks, "cup: located");

    let point = |index: usize, price: f64| CupPoint {
        price,
        index,
        date: window[index].date,
    };

    Some(CupPattern {
        variant,
        qualifies,
        reasons,
        thresholds: CupThresholds::for_variant(variant),
        window: DateRange::of(window)?,
        cup: CupShape {
            left_peak: point(p_idx, p_val),
            low_point: point(l_idx, l_val),
            right_high: point(r_idx, r_val),
            depth_pct,
            base_bars,
            duration_weeks,
            mid_line: levels.mid_line,
            upper_third,
            lower_third: levels.lower_third,
        },
        trend: CupTrend {
            above_200ma,
            ma200_slope_up,
            ma200_up_days,
        },
        prior: PriorRunup {
            prior_runup_pct,
            lookback_days: Range {
                min: RUNUP_LOOKBACK_MIN,
                max: RUNUP_LOOKBACK_MAX,
            },
        },
        buy_points: BuyPoints {
            pivot: PricePoint {
                price: pivot.map(|(price, _)| price),
                date: pivot.map(|(_, date)| date),
            },
            standard_pivot: PricePoint {
                price: Some(p_val),
                date: Some(window[p_idx].date),
            },
            reference_high: PricePoint {
                price: Some(plateau_high),
                date: Some(plateau_bars[plateau_high_idx].date),
            },
        },
        plateau: Plateau {
            length_bars: plateau_bars.len(),
            high: plateau_high,
            low: plateau_low,
            breakout_level,
            width_pct: plateau_width_pct,
            width_ok: plateau_width_ok,
            shakeout,
        },
        end_metrics: EndMetrics {
            vol_sma10,
            vol_sma50,
            dry_ok,
            atr_pct,
            tight_ok,
            breakout_vol_mult: BREAKOUT_VOL_MULT,
            breakout_vol_needed,
            last_volume: last.volume,
        },
        steps,
    })
}

/// Highest plateau high inside the variant's zone, else the variant's
/// fallback candidate when that lands in the zone.
fn find_pivot(
    window: &[Bar],
    plateau: &[Bar],
    variant: CupVariant,
    levels: &CupLevels,
) -> Option<(f64, NaiveDate)> {
    let mut best: Option<&Bar> = None;
    for bar in plateau {
        if variant.in_zone(bar.high, levels) && best.is_none_or(|b| bar.high > b.high) {
            best = Some(bar);
        }
    }
    if let Some(bar) = best {
        return Some((bar.high, bar.date));
    }

    let candidates = match variant {
        CupVariant::Cheat => tail(window, CHEAT_FALLBACK_BARS),
        CupVariant::LowCheat => plateau,
    };
    let (idx, high) = highest_high(candidates)?;
    variant
        .in_zone(high, levels)
        .then(|| (high, candidates[idx].date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{approx_eq, bars_from_closes, flat_series, zigzag};
    use proptest::prelude::*;

    /// Rise into a 100 left peak, 20% cup, recovery into a plateau
    /// around 91-96 in the middle third.
    fn middle_third_cup() -> Vec<Bar> {
        let closes = zigzag(&[
            (0, 40.0),
            (150, 85.0),
            (330, 90.0),
            (340, 100.0),
            (360, 80.0),
            (399, 96.0),
        ]);
        bars_from_closes(&closes, 1_000)
    }

    /// Same cup depth, but the right side stalls near 86, inside the lower third.
    fn lower_third_cup() -> Vec<Bar> {
        let closes = zigzag(&[
            (0, 20.0),
            (185, 81.0),
            (300, 82.0),
            (320, 100.0),
            (345, 80.0),
            (370, 85.0),
            (399, 86.0),
        ]);
        bars_from_closes(&closes, 1_000)
    }

    #[test]
    fn test_depth_thresholds_at_boundaries() {
        assert!(depth_ok(15.0));
        assert!(!depth_ok(14.999));
        assert!(depth_ok(50.0));
        assert!(!depth_ok(50.001));
        assert!(!too_deep(60.0));
        assert!(too_deep(60.001));
        // between 50 and 60: not ok, yet not flagged too deep
        assert!(!depth_ok(55.0) && !too_deep(55.0));
    }

    #[test]
    fn test_analyze_cup_requires_220_bars() {
        let bars = flat_series(219, 100.0, 1_000);
        assert!(analyze_cup(&bars, CupVariant::Cheat).is_none());
        assert!(analyze_cup(&bars, CupVariant::LowCheat).is_none());
    }

    #[test]
    fn test_analyze_cup_flat_series_is_none() {
        let bars = flat_series(300, 100.0, 1_000);
        assert!(analyze_cup(&bars, CupVariant::Cheat).is_none());
        assert!(analyze_cup(&bars, CupVariant::LowCheat).is_none());
    }

    #[test]
    fn test_analyze_cup_steady_rise_has_no_left_peak() {
        let closes: Vec<f64> = (0..300).map(|i| 50.0 + i as f64 * 0.2).collect();
        let bars = bars_from_closes(&closes, 1_000);
        assert!(analyze_cup(&bars, CupVariant::Cheat).is_none());
    }

    #[test]
    fn test_cheat_qualifies_on_middle_third_plateau() {
        let bars = middle_third_cup();
        let cup = analyze_cup(&bars, CupVariant::Cheat).expect("cup located");

        assert!(cup.qualifies, "reasons: {:?}", cup.reasons);
        assert!(cup.reasons.is_empty());

        // window starts at bar 175
        assert_eq!(cup.cup.left_peak.index, 165);
        assert_eq!(cup.cup.low_point.index, 185);
        assert_eq!(cup.cup.right_high.index, 224);
        approx_eq(cup.cup.depth_pct, 20.0, 1e-9);
        assert_eq!(cup.cup.base_bars, 59);
        assert_eq!(cup.cup.duration_weeks, 12);
        approx_eq(cup.cup.mid_line, 90.0, 1e-9);

        // lowest low 63..756 bars before the peak is the 40 start
        approx_eq(cup.prior.prior_runup_pct.unwrap(), 150.0, 1e-9);
        assert!(cup.trend.above_200ma);
        assert!(cup.trend.ma200_slope_up);

        let pivot = cup.buy_points.pivot.price.expect("finite pivot");
        approx_eq(pivot, 96.0, 1e-9);
        assert_eq!(cup.buy_points.pivot.date, Some(bars[399].date));
        approx_eq(cup.buy_points.standard_pivot.price.unwrap(), 100.0, 1e-12);

        assert_eq!(cup.plateau.length_bars, 12);
        assert!(!cup.plateau.shakeout);
        // recovered 80% of the decline: past the uptrend step band
        assert!(cup.steps.downtrend);
        assert!(!cup.steps.uptrend);
    }

    #[test]
    fn test_low_cheat_rejects_middle_third_plateau() {
        let cup = analyze_cup(&middle_third_cup(), CupVariant::LowCheat).expect("cup located");
        assert!(!cup.qualifies);
        assert_eq!(cup.buy_points.pivot.price, None);
        assert_eq!(
            cup.reasons,
            vec![CupCheck::Pivot(CupVariant::LowCheat).to_string()]
        );
        assert_eq!(cup.plateau.length_bars, 15);
    }

    #[test]
    fn test_low_cheat_qualifies_on_lower_third_plateau() {
        let bars = lower_third_cup();
        let low = analyze_cup(&bars, CupVariant::LowCheat).expect("cup located");
        assert!(low.qualifies, "reasons: {:?}", low.reasons);
        approx_eq(low.buy_points.pivot.price.unwrap(), 86.0, 1e-9);
        assert!(low.buy_points.pivot.price.unwrap() <= low.cup.lower_third);
        assert_eq!(low.cup.duration_weeks, 16);

        // the same plateau sits below the cheat zone
        let cheat = analyze_cup(&bars, CupVariant::Cheat).expect("cup located");
        assert!(!cheat.qualifies);
        assert_eq!(
            cheat.reasons,
            vec![CupCheck::Pivot(CupVariant::Cheat).to_string()]
        );
    }

    #[test]
    fn test_cheat_breakout_needs_volume_low_cheat_does_not() {
        let mut bars = middle_third_cup();
        // last bar clears the earlier plateau high (about 95.6) on ordinary volume
        let last = bars.len() - 1;
        bars[last].close = 97.0;
        bars[last].high = 97.0;

        let cheat = analyze_cup(&bars, CupVariant::Cheat).unwrap();
        let low = analyze_cup(&bars, CupVariant::LowCheat).unwrap();
        // 1000 < 1.8 x 1000
        assert!(!cheat.steps.breakout);
        assert!(low.steps.breakout);

        // 10-bar average becomes 1100, so 1980 is needed
        bars[last].volume = 2_000;
        let cheat = analyze_cup(&bars, CupVariant::Cheat).unwrap();
        assert!(cheat.steps.breakout);
        approx_eq(cheat.end_metrics.breakout_vol_needed.unwrap(), 1_980.0, 1e-9);
    }

    #[test]
    fn test_breakout_level_excludes_the_breakout_bar() {
        let mut bars = middle_third_cup();
        let last = bars.len() - 1;
        bars[last].close = 97.0;
        bars[last].high = 97.0;

        let low = analyze_cup(&bars, CupVariant::LowCheat).unwrap();
        assert!(low.steps.breakout);
        // the plateau high now includes the breakout bar itself
        approx_eq(low.plateau.high, 97.0, 1e-12);
        approx_eq(low.buy_points.reference_high.price.unwrap(), 97.0, 1e-12);
        let level = low.plateau.breakout_level.expect("plateau longer than one bar");
        approx_eq(level, 96.0 - 16.0 / 39.0, 1e-9);
        assert!(bars[last].close > level);

        let json = serde_json::to_value(&low.plateau).unwrap();
        approx_eq(json["breakoutLevel"].as_f64().unwrap(), level, 1e-12);
    }

    /// 100 peak, 80 low, recovery to 88 and a 12-bar plateau between 86 and
    /// 92 that undercuts the 88 floor before it, on 300-share volume.
    fn paused_cup(plateau: &[f64]) -> Vec<Bar> {
        let mut closes = zigzag(&[(0, 50.0), (30, 90.0), (120, 100.0), (160, 80.0), (236, 88.0)]);
        closes.extend([89.0; 11]);
        closes.extend_from_slice(plateau);
        let mut bars = bars_from_closes(&closes, 1_000);
        let n = bars.len();
        for bar in &mut bars[n - 10..] {
            bar.volume = 300;
        }
        bars
    }

    #[test]
    fn test_uptrend_pause_and_shakeout_on_quiet_plateau() {
        let plateau = [90.0, 90.0, 92.0, 90.0, 90.0, 90.0, 86.0, 90.0, 90.0, 90.0, 90.0, 90.0];
        let bars = paused_cup(&plateau);
        assert_eq!(bars.len(), 260);
        let cup = analyze_cup(&bars, CupVariant::Cheat).expect("cup located");

        approx_eq(cup.cup.left_peak.price, 100.0, 1e-12);
        approx_eq(cup.cup.low_point.price, 80.0, 1e-12);
        approx_eq(cup.cup.right_high.price, 92.0, 1e-12);
        // (92 - 80) / (100 - 80) = 0.6
        assert!(cup.steps.uptrend);

        approx_eq(cup.plateau.width_pct.unwrap(), 6.0 / 92.0 * 100.0, 1e-9);
        assert!(cup.plateau.width_ok);
        // 86 undercuts the 88 low of the 12 bars before the plateau
        assert!(cup.plateau.shakeout);

        // 10-bar 300 vs 50-bar 860
        assert_eq!(cup.end_metrics.dry_ok, Some(true));
        let metrics = serde_json::to_value(&cup.end_metrics).unwrap();
        assert_eq!(metrics["volSMA10"], serde_json::json!(300.0));
        assert_eq!(metrics["volSMA50"], serde_json::json!(860.0));
        // TRs over the last 14 bars: 1 + 2 + 2 + 4 + 4 = 13
        approx_eq(cup.end_metrics.atr_pct.unwrap(), 13.0 / 14.0 / 90.0, 1e-9);
        assert_eq!(cup.end_metrics.tight_ok, Some(true));
        assert!(cup.steps.pause);
        assert!(!cup.steps.breakout);
    }

    #[test]
    fn test_wide_atr_blocks_pause() {
        // same 86-92 range, but every bar swings across it
        let plateau: Vec<f64> = (0..12).map(|i| if i % 2 == 0 { 86.0 } else { 92.0 }).collect();
        let cup = analyze_cup(&paused_cup(&plateau), CupVariant::Cheat).expect("cup located");

        assert!(cup.plateau.width_ok);
        assert!(cup.plateau.shakeout);
        assert_eq!(cup.end_metrics.dry_ok, Some(true));
        assert_eq!(cup.end_metrics.tight_ok, Some(false));
        assert!(!cup.steps.pause);
    }

    #[test]
    fn test_synthetic_cup_depth_boundaries() {
        let cup_with_low = |low: f64| {
            let closes = zigzag(&[
                (0, 40.0),
                (150, 85.0),
                (330, 90.0),
                (340, 100.0),
                (360, low),
                (399, 96.0),
            ]);
            analyze_cup(&bars_from_closes(&closes, 1_000), CupVariant::Cheat).expect("cup located")
        };
        let depth_reason = |cup: &CupPattern| cup.reasons.iter().any(|r| r.contains("outside 15%"));
        let too_deep_reason = |cup: &CupPattern| cup.reasons.iter().any(|r| r.contains("too deep"));

        let shallow = cup_with_low(85.0);
        approx_eq(shallow.cup.depth_pct, 15.0, 1e-12);
        assert!(!depth_reason(&shallow));
        assert!(!too_deep_reason(&shallow));

        let deep = cup_with_low(39.999);
        approx_eq(deep.cup.depth_pct, 60.001, 1e-9);
        assert!(!deep.qualifies);
        assert!(depth_reason(&deep));
        assert!(too_deep_reason(&deep));
    }

    #[test]
    fn test_reasons_list_every_failing_check_in_order() {
        // 70% deep cup that only recovers to 60, below a falling MA200
        let closes = zigzag(&[
            (0, 40.0),
            (150, 85.0),
            (330, 90.0),
            (340, 100.0),
            (360, 30.0),
            (399, 60.0),
        ]);
        let cup = analyze_cup(&bars_from_closes(&closes, 1_000), CupVariant::Cheat).unwrap();

        assert!(!cup.qualifies);
        assert_eq!(
            cup.reasons,
            vec![
                CupCheck::Depth(70.0).to_string(),
                CupCheck::TooDeep(70.0).to_string(),
                CupCheck::Above200Ma.to_string(),
                CupCheck::Ma200Rising.to_string(),
                CupCheck::Pivot(CupVariant::Cheat).to_string(),
            ]
        );
        assert!(cup.reasons[0].contains("70.0%"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn prop_qualifying_cup_has_finite_pivot(
            closes in prop::collection::vec(20.0f64..200.0, 220..260),
        ) {
            let bars = bars_from_closes(&closes, 1_000);
            for variant in [CupVariant::Cheat, CupVariant::LowCheat] {
                if let Some(cup) = analyze_cup(&bars, variant) {
                    if cup.qualifies {
                        prop_assert!(cup.buy_points.pivot.price.is_some_and(f64::is_finite));
                        prop_assert!(depth_ok(cup.cup.depth_pct));
                    }
                    prop_assert_eq!(cup.qualifies, cup.reasons.is_empty());
                    if cup.steps.breakout {
                        let last_close = closes[closes.len() - 1];
                        prop_assert!(cup.plateau.breakout_level.is_some_and(|h| last_close > h));
                    }
                }
            }
        }
    }
}
