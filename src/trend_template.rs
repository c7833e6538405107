use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::data::{Bar, closes, highest_high, lowest_low, tail, volumes};
use crate::indicators::{consecutive_rising_count, moving_average, simple_moving_average};

/// Bars in a trading year, used for the 52-week range.
pub const LOOKBACK_52W: usize = 252;
/// "At least one month" of MA200 rise, in sessions.
pub const MA200_UP_DAYS_MIN: usize = 21;
const ABOVE_LOW_MIN_PCT: f64 = 25.0;
const BELOW_HIGH_MAX_PCT: f64 = 25.0;

/// Full moving-average series of the closes. Each series is empty when the
/// history is shorter than its period.
#[derive(Debug, Clone, Default)]
pub struct MovingAverages {
    pub ma20: Vec<f64>,
    pub ma50: Vec<f64>,
    pub ma150: Vec<f64>,
    pub ma200: Vec<f64>,
}

impl MovingAverages {
    pub fn from_closes(closes: &[f64]) -> Self {
        Self {
            ma20: moving_average(closes, 20),
            ma50: moving_average(closes, 50),
            ma150: moving_average(closes, 150),
            ma200: moving_average(closes, 200),
        }
    }

    pub fn last20(&self) -> Option<f64> {
        self.ma20.last().copied()
    }

    pub fn last50(&self) -> Option<f64> {
        self.ma50.last().copied()
    }

    pub fn last150(&self) -> Option<f64> {
        self.ma150.last().copied()
    }

    pub fn last200(&self) -> Option<f64> {
        self.ma200.last().copied()
    }

    /// Sessions the MA200 has risen in a row, counting back from today.
    pub fn ma200_up_days(&self) -> usize {
        consecutive_rising_count(&self.ma200)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicators {
    pub last_close: Option<f64>,
    pub ma20: Option<f64>,
    pub ma50: Option<f64>,
    pub ma150: Option<f64>,
    pub ma200: Option<f64>,
    pub avg_vol20: Option<f64>,
    pub high_52w: Option<f64>,
    pub low_52w: Option<f64>,
}

impl Indicators {
    pub fn compute(bars: &[Bar], mas: &MovingAverages) -> Self {
        let year = tail(bars, LOOKBACK_52W);
        Self {
            last_close: bars.last().map(|b| b.close),
            ma20: mas.last20(),
            ma50: mas.last50(),
            ma150: mas.last150(),
            ma200: mas.last200(),
            avg_vol20: simple_moving_average(&volumes(bars), 20),
            high_52w: highest_high(year).map(|(_, v)| v),
            low_52w: lowest_low(year).map(|(_, v)| v),
        }
    }

    /// How far the close sits above the 52-week low, in percent.
    pub fn above_low_pct(&self) -> Option<f64> {
        match (self.last_close, self.low_52w) {
            (Some(close), Some(low)) if low != 0.0 => Some((close - low) / low * 100.0),
            _ => None,
        }
    }

    /// How far the close sits below the 52-week high, in percent.
    pub fn below_high_pct(&self) -> Option<f64> {
        match (self.last_close, self.high_52w) {
            (Some(close), Some(high)) if high != 0.0 => Some((high - close) / high * 100.0),
            _ => None,
        }
    }
}

/// One trend-template check. `detail` carries the inputs behind `pass`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    pub id: u8,
    pub title: &'static str,
    pub pass: bool,
    pub detail: Map<String, Value>,
}

impl Criterion {
    fn new(id: u8, title: &'static str, pass: bool, detail: Value) -> Self {
        let detail = match detail {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id,
            title,
            pass,
            detail,
        }
    }
}

pub const RS_CRITERION_ID: u8 = 7;

/// Evaluate the eight trend-template criteria in their fixed order.
///
/// Every criterion is independent: a missing moving average (short history)
/// only fails the criteria that need it. Criterion 7 is a placeholder that
/// the relative-strength merge fills in later.
pub fn evaluate_criteria(ind: &Indicators, mas: &MovingAverages) -> Vec<Criterion> {
    let close = ind.last_close;
    let (ma50, ma150, ma200) = (ind.ma50, ind.ma150, ind.ma200);
    let up_days = mas.ma200_up_days();
    let above_low_pct = ind.above_low_pct();
    let below_high_pct = ind.below_high_pct();

    let above_both_long = matches!(
        (close, ma150, ma200),
        (Some(c), Some(m150), Some(m200)) if c > m150 && c > m200
    );
    let ma150_over_ma200 = matches!((ma150, ma200), (Some(a), Some(b)) if a > b);
    let ma50_over_long = matches!(
        (ma50, ma150, ma200),
        (Some(m50), Some(m150), Some(m200)) if m50 > m150 && m50 > m200
    );
    let above_ma50 = matches!((close, ma50), (Some(c), Some(m)) if c > m);

    vec![
        Criterion::new(
            1,
            "Price above the 150-day and 200-day moving averages",
            above_both_long,
            json!({ "lastClose": close, "ma150": ma150, "ma200": ma200 }),
        ),
        Criterion::new(
            2,
            "150-day moving average above the 200-day",
            ma150_over_ma200,
            json!({ "ma150": ma150, "ma200": ma200 }),
        ),
        Criterion::new(
            3,
            "200-day moving average rising for at least 1 month",
            up_days >= MA200_UP_DAYS_MIN,
            json!({ "upDays": up_days }),
        ),
        Criterion::new(
            4,
            "50-day moving average above the 150-day and 200-day",
            ma50_over_long,
            json!({ "ma50": ma50, "ma150": ma150, "ma200": ma200 }),
        ),
        Criterion::new(
            5,
            "Price at least 25% above the 52-week low",
            above_low_pct.is_some_and(|p| p >= ABOVE_LOW_MIN_PCT),
            json!({ "low52w": ind.low_52w, "aboveLowPct": above_low_pct }),
        ),
        Criterion::new(
            6,
            "Price at most 25% below the 52-week high",
            below_high_pct.is_some_and(|p| p <= BELOW_HIGH_MAX_PCT),
            json!({ "high52w": ind.high_52w, "belowHighPct": below_high_pct }),
        ),
        Criterion::new(
            RS_CRITERION_ID,
            "Relative strength rank at least 70 with a rising RS line",
            false,
            json!({ "rsRating": null, "rsTrendWeeks": null }),
        ),
        Criterion::new(
            8,
            "Price above the 50-day moving average (out of the base)",
            above_ma50,
            json!({ "lastClose": close, "ma50": ma50 }),
        ),
    ]
}

/// Convenience wrapper: moving averages, indicators and criteria for `bars`.
pub fn evaluate(bars: &[Bar]) -> (MovingAverages, Indicators, Vec<Criterion>) {
    let mas = MovingAverages::from_closes(&closes(bars));
    let indicators = Indicators::compute(bars, &mas);
    let criteria = evaluate_criteria(&indicators, &mas);
    (mas, indicators, criteria)
}
