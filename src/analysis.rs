use serde::Serialize;
use tracing::debug;

use crate::cup::{CupPattern, CupVariant, analyze_cup};
use crate::data::{Bar, validate_series};
use crate::error::AnalysisError;
use crate::pivot::{PivotResult, estimate_pivot};
use crate::power_play::{PowerPlayPattern, analyze_power_play};
use crate::rs::RelativeStrength;
use crate::signal::{Signal, classify};
use crate::trend_template::{Criterion, Indicators, evaluate};
use crate::vcp::{VcpResult, detect_vcp};

/// Everything the engine derives from one series. Absent patterns
/// serialize as `null`; no key is ever dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub indicators: Indicators,
    pub signal: Signal,
    pub reasons: Vec<String>,
    pub criteria: Vec<Criterion>,
    pub rs: RelativeStrength,
    pub vcp: VcpResult,
    pub pivot: Option<PivotResult>,
    pub cheat: Option<CupPattern>,
    pub cheat_low: Option<CupPattern>,
    pub power_play: Option<PowerPlayPattern>,
}

/// Run every analyzer over `bars`.
///
/// Only a malformed series is an error. Short histories are fine: each
/// analyzer that lacks data reports its empty result instead.
pub fn analyze(bars: &[Bar]) -> Result<Report, AnalysisError> {
    validate_series(bars)?;

    let (_, indicators, criteria) = evaluate(bars);
    let (signal, reasons) = classify(indicators.ma20, indicators.ma50);

    let vcp = detect_vcp(bars);
    let pivot = estimate_pivot(bars, &vcp);
    let cheat = analyze_cup(bars, CupVariant::Cheat);
    let cheat_low = analyze_cup(bars, CupVariant::LowCheat);
    let power_play = analyze_power_play(bars);

    debug!(
        bars = bars.len(),
        %signal,
        vcp = vcp.is_vcp,
        pivot = pivot.is_some(),
        cheat = cheat.as_ref().is_some_and(|c| c.qualifies),
        cheat_low = cheat_low.as_ref().is_some_and(|c| c.qualifies),
        power_play = power_play.as_ref().is_some_and(|p| p.qualifies),
        "analysis complete"
    );

    Ok(Report {
        indicators,
        signal,
        reasons,
        criteria,
        rs: RelativeStrength::default(),
        vcp,
        pivot,
        cheat,
        cheat_low,
        power_play,
    })
}
