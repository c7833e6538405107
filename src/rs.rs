//! Relative-strength merge.
//!
//! Ratings come from up to three places, consulted in priority order: a
//! direct rating from an external provider, a percentile rank against a peer
//! pool, and a comparison with a benchmark index. Fetching those inputs is
//! the caller's job; this module only folds already-obtained data into a
//! [`Report`], filling the `rs` slot and trend-template criterion 7.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::analysis::Report;
use crate::data::{Bar, closes};
use crate::indicators::{consecutive_rising_count, percentile_rank, period_return};
use crate::trend_template::{Criterion, RS_CRITERION_ID};

const RS_RATING_MIN: f64 = 70.0;
const RS_TREND_WEEKS_MIN: usize = 6;
/// Trading days per week when turning a rising streak into weeks.
const DAYS_PER_WEEK: usize = 5;
/// Returns needed (symbol included) before a peer rank means anything.
const MIN_POOL_RETURNS: usize = 5;
const MIN_ALIGNED_DATES: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RsSource {
    Direct,
    ProxyPeers,
    ProxyPool,
    FallbackBenchmark,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelativeStrength {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<RsSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rs_rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rs_trend_weeks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rs_approx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rs_outperformance_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
}

/// A provider's rating plus its RS line, oldest value first.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectRating {
    pub rating: f64,
    pub rs_line: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolKind {
    /// Symbols picked by the caller.
    #[default]
    Peers,
    /// Members of a broad index.
    IndexPool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerUniverse {
    pub kind: PoolKind,
    /// Daily closes per peer, oldest first. The analyzed symbol is not included.
    pub closes: Vec<Vec<f64>>,
    pub lookback_days: usize,
}

impl PeerUniverse {
    /// About six months of sessions.
    pub const DEFAULT_LOOKBACK_DAYS: usize = 126;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    pub name: String,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RsInputs {
    pub direct: Option<DirectRating>,
    pub peers: Option<PeerUniverse>,
    pub benchmark: Option<Benchmark>,
}

fn rs_criterion(criteria: &mut [Criterion]) -> Option<&mut Criterion> {
    criteria.iter_mut().find(|c| c.id == RS_CRITERION_ID)
}

fn merge_detail(criterion: &mut Criterion, fields: Value) {
    if let Value::Object(map) = fields {
        criterion.detail.extend(map);
    }
}

fn replace_detail(criterion: &mut Criterion, fields: Value) {
    criterion.detail.clear();
    merge_detail(criterion, fields);
}

fn rising_weeks(series: &[f64]) -> usize {
    consecutive_rising_count(series) / DAYS_PER_WEEK
}

fn rs_passes(rating: f64, weeks: usize) -> bool {
    rating >= RS_RATING_MIN && weeks >= RS_TREND_WEEKS_MIN
}

/// Fold relative-strength inputs into `report`.
///
/// Tiers run in order: direct rating, then (only while no rating exists)
/// the peer rank, then the benchmark comparison whenever a benchmark is
/// given. Inputs that are missing or too thin leave the report untouched.
pub fn apply_relative_strength(report: &mut Report, bars: &[Bar], inputs: &RsInputs) {
    if let Some(direct) = &inputs.direct {
        apply_direct(report, direct);
    }
    if let Some(peers) = &inputs.peers {
        if report.rs.rs_rating.is_none() {
            apply_peer_rank(report, bars, peers);
        }
    }
    if let Some(benchmark) = &inputs.benchmark {
        apply_benchmark(report, bars, benchmark);
    }
}

fn apply_direct(report: &mut Report, direct: &DirectRating) {
    if !direct.rating.is_finite() {
        debug!("rs: ignoring non-finite direct rating");
        return;
    }
    let rating = direct.rating.round().clamp(0.0, 99.0) as u8;
    let line: Vec<f64> = direct
        .rs_line
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    let weeks = rising_weeks(&line);

    report.rs = RelativeStrength {
        source: Some(RsSource::Direct),
        rs_rating: Some(rating),
        rs_trend_weeks: Some(weeks),
        ..RelativeStrength::default()
    };
    if let Some(c7) = rs_criterion(&mut report.criteria) {
        c7.pass = rs_passes(rating.into(), weeks);
        replace_detail(c7, json!({ "rsRating": rating, "rsTrendWeeks": weeks }));
    }
}

fn apply_peer_rank(report: &mut Report, bars: &[Bar], peers: &PeerUniverse) {
    let Some(own) = period_return(&closes(bars), peers.lookback_days) else {
        debug!("rs: no return for the symbol over the peer lookback");
        return;
    };
    let mut returns: Vec<f64> = peers
        .closes
        .iter()
        .filter_map(|c| period_return(c, peers.lookback_days))
        .collect();
    returns.push(own);

    if returns.len() < MIN_POOL_RETURNS {
        debug!(returns = returns.len(), "rs: peer pool too small");
        return;
    }
    let Some(rating) = percentile_rank(own, &returns) else {
        return;
    };

    let source = match peers.kind {
        PoolKind::Peers => RsSource::ProxyPeers,
        PoolKind::IndexPool => RsSource::ProxyPool,
    };
    report.rs = RelativeStrength {
        source: Some(source),
        rs_rating: Some(rating),
        pool_size: Some(returns.len()),
        ..RelativeStrength::default()
    };
    // A rank alone does not pass: the RS line trend comes from the benchmark.
    if let Some(c7) = rs_criterion(&mut report.criteria) {
        c7.pass = false;
        merge_detail(
            c7,
            json!({ "rsRating": rating, "poolSize": returns.len() }),
        );
    }
}

fn apply_benchmark(report: &mut Report, bars: &[Bar], benchmark: &Benchmark) {
    // Benchmark rows never went through validation.
    let bench_by_date: HashMap<NaiveDate, f64> = benchmark
        .bars
        .iter()
        .filter(|b| b.close.is_finite() && b.close > 0.0)
        .map(|b| (b.date, b.close))
        .collect();
    let (stock, bench): (Vec<f64>, Vec<f64>) = bars
        .iter()
        .filter_map(|b| bench_by_date.get(&b.date).map(|&bc| (b.close, bc)))
        .unzip();

    if stock.len() < MIN_ALIGNED_DATES {
        debug!(aligned = stock.len(), benchmark = %benchmark.name, "rs: too few aligned dates");
        return;
    }
    let (Some(stock_ret), Some(bench_ret)) = (total_return(&stock), total_return(&bench)) else {
        return;
    };
    let outperformance_pct = (stock_ret / bench_ret - 1.0) * 100.0;

    let ratio: Vec<f64> = stock.iter().zip(&bench).map(|(s, b)| s / b).collect();
    let weeks = rising_weeks(&ratio);

    match report.rs.rs_rating {
        Some(rating) => {
            report.rs.benchmark = Some(benchmark.name.clone());
            report.rs.rs_outperformance_pct = Some(outperformance_pct);
            report.rs.rs_trend_weeks = Some(weeks);
            if let Some(c7) = rs_criterion(&mut report.criteria) {
                c7.pass = rs_passes(rating.into(), weeks);
                merge_detail(
                    c7,
                    json!({
                        "rsRating": rating,
                        "rsTrendWeeks": weeks,
                        "benchmark": benchmark.name,
                    }),
                );
            }
        }
        None => {
            let rs_approx = (50.0 + outperformance_pct).clamp(0.0, 100.0);
            report.rs = RelativeStrength {
                source: Some(RsSource::FallbackBenchmark),
                rs_approx: Some(rs_approx),
                rs_outperformance_pct: Some(outperformance_pct),
                rs_trend_weeks: Some(weeks),
                benchmark: Some(benchmark.name.clone()),
                ..RelativeStrength::default()
            };
            if let Some(c7) = rs_criterion(&mut report.criteria) {
                c7.pass = rs_passes(rs_approx, weeks);
                replace_detail(
                    c7,
                    json!({
                        "rsApprox": rs_approx,
                        "rsTrendWeeks": weeks,
                        "rsOutperformancePct": outperformance_pct,
                        "benchmark": benchmark.name,
                    }),
                );
            }
        }
    }
}

/// `last / first` of an aligned close series.
fn total_return(closes: &[f64]) -> Option<f64> {
    let first = *closes.first()?;
    let last = *closes.last()?;
    (first > 0.0 && first.is_finite() && last.is_finite()).then(|| last / first)
}
