use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{Report, analyze};
use crate::data::closes;
use crate::error::ScreenError;
use crate::rs::{Benchmark, PeerUniverse, PoolKind, RsInputs, apply_relative_strength};
use crate::source::BarSource;

/// Relative-strength data shared by every symbol of a screen.
#[derive(Debug, Clone)]
pub struct RsContext {
    pub benchmark: Option<Benchmark>,
    /// `(symbol, closes)` for each peer that could be loaded.
    pub peers: Vec<(String, Vec<f64>)>,
    pub pool_kind: PoolKind,
    pub lookback_days: usize,
}

impl Default for RsContext {
    fn default() -> Self {
        Self {
            benchmark: None,
            peers: Vec::new(),
            pool_kind: PoolKind::Peers,
            lookback_days: PeerUniverse::DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl RsContext {
    /// Load the benchmark and peer closes through `source`. Peers that fail
    /// to load are skipped; a missing benchmark only disables that tier.
    pub fn load<S: BarSource>(
        source: &S,
        benchmark: Option<&str>,
        peers: &[String],
        pool_kind: PoolKind,
        lookback_days: usize,
    ) -> Self {
        let benchmark = benchmark.and_then(|name| match source.daily_bars(name) {
            Ok(bars) => Some(Benchmark {
                name: name.to_string(),
                bars,
            }),
            Err(err) => {
                warn!(benchmark = name, error = %err, "benchmark unavailable");
                None
            }
        });

        let peers = peers
            .par_iter()
            .filter_map(|peer| match source.daily_bars(peer) {
                Ok(bars) => Some((peer.to_ascii_uppercase(), closes(&bars))),
                Err(err) => {
                    warn!(peer = %peer, error = %err, "skipping peer");
                    None
                }
            })
            .collect();

        Self {
            benchmark,
            peers,
            pool_kind,
            lookback_days,
        }
    }

    /// Inputs for one symbol: every peer except the symbol itself.
    fn inputs_for(&self, symbol: &str) -> RsInputs {
        let peers = (!self.peers.is_empty()).then(|| PeerUniverse {
            kind: self.pool_kind,
            closes: self
                .peers
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case(symbol))
                .map(|(_, c)| c.clone())
                .collect(),
            lookback_days: self.lookback_days,
        });
        RsInputs {
            direct: None,
            peers,
            benchmark: self.benchmark.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ScreenResult {
    pub symbol: String,
    pub outcome: Result<Report, ScreenError>,
}

fn screen_symbol<S: BarSource>(source: &S, symbol: &str, ctx: &RsContext) -> ScreenResult {
    let outcome = source
        .daily_bars(symbol)
        .map_err(ScreenError::from)
        .and_then(|bars| {
            let mut report = analyze(&bars)?;
            apply_relative_strength(&mut report, &bars, &ctx.inputs_for(symbol));
            Ok(report)
        });

    if let Err(err) = &outcome {
        warn!(%symbol, error = %err, "screen: symbol failed");
    }
    ScreenResult {
        symbol: symbol.to_string(),
        outcome,
    }
}

/// Analyze every symbol in parallel. Results come back in input order,
/// one per symbol, failures included.
pub fn screen_symbols<S: BarSource>(
    source: &S,
    symbols: &[String],
    ctx: &RsContext,
) -> Vec<ScreenResult> {
    info!(symbols = symbols.len(), "screen: starting");
    let results: Vec<ScreenResult> = symbols
        .par_iter()
        .map(|symbol| screen_symbol(source, symbol, ctx))
        .collect();

    let ok = results.iter().filter(|r| r.outcome.is_ok()).count();
    info!(ok, failed = results.len() - ok, "screen: finished");
    results
}

/// One line of the screen summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenRow {
    pub symbol: String,
    pub last_close: Option<f64>,
    pub signal: Option<String>,
    pub criteria_passed: Option<usize>,
    pub rs_rating: Option<u8>,
    pub vcp: bool,
    pub pivot: Option<f64>,
    pub cheat: bool,
    pub cheat_low: bool,
    pub power_play: bool,
    pub error: Option<String>,
}

impl From<&ScreenResult> for ScreenRow {
    fn from(result: &ScreenResult) -> Self {
        match &result.outcome {
            Ok(report) => Self {
                symbol: result.symbol.clone(),
                last_close: report.indicators.last_close,
                signal: Some(report.signal.to_string()),
                criteria_passed: Some(report.criteria.iter().filter(|c| c.pass).count()),
                rs_rating: report.rs.rs_rating,
                vcp: report.vcp.best.is_vcp,
                pivot: report.pivot.as_ref().map(|p| p.pivot),
                cheat: report.cheat.as_ref().is_some_and(|c| c.qualifies),
                cheat_low: report.cheat_low.as_ref().is_some_and(|c| c.qualifies),
                power_play: report.power_play.as_ref().is_some_and(|p| p.qualifies),
                error: None,
            },
            Err(err) => Self {
                symbol: result.symbol.clone(),
                last_close: None,
                signal: None,
                criteria_passed: None,
                rs_rating: None,
                vcp: false,
                pivot: None,
                cheat: false,
                cheat_low: false,
                power_play: false,
                error: Some(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use crate::error::SourceError;
    use crate::rs::RsSource;
    use crate::testing::{bars_from_closes, flat_series, three_leg_vcp_closes};
    use std::collections::HashMap;

    struct MemorySource(HashMap<String, Vec<Bar>>);

    impl BarSource for MemorySource {
        fn daily_bars(&self, symbol: &str) -> Result<Vec<Bar>, SourceError> {
            match symbol {
                "THROTTLED" => Err(SourceError::RateLimited(symbol.into())),
                _ => self
                    .0
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| SourceError::NoData(symbol.into())),
            }
        }
    }

    fn source() -> MemorySource {
        let mut map = HashMap::new();
        map.insert("FLAT".into(), flat_series(300, 100.0, 1_000));
        map.insert(
            "VCP".into(),
            bars_from_closes(&three_leg_vcp_closes(), 1_000),
        );
        let rising: Vec<f64> = (0..200).map(|i| 50.0 + i as f64 * 0.5).collect();
        map.insert("RISE".into(), bars_from_closes(&rising, 1_000));
        map.insert("SPY".into(), flat_series(300, 400.0, 1_000_000));
        MemorySource(map)
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_screen_returns_one_result_per_symbol_in_order() {
        let names = symbols(&["VCP", "MISSING", "FLAT", "THROTTLED", "RISE"]);
        let results = screen_symbols(&source(), &names, &RsContext::default());

        let order: Vec<&str> = results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["VCP", "MISSING", "FLAT", "THROTTLED", "RISE"]);

        assert!(results[0].outcome.as_ref().unwrap().pivot.is_some());
        assert!(matches!(
            results[1].outcome,
            Err(ScreenError::Source(SourceError::NoData(_)))
        ));
        assert!(results[2].outcome.is_ok());
        assert!(matches!(
            results[3].outcome,
            Err(ScreenError::Source(SourceError::RateLimited(_)))
        ));
    }

    #[test]
    fn test_screen_applies_benchmark_relative_strength() {
        let src = source();
        let ctx = RsContext::load(&src, Some("SPY"), &[], PoolKind::Peers, 126);
        assert!(ctx.benchmark.is_some());

        let results = screen_symbols(&src, &symbols(&["RISE"]), &ctx);
        let report = results[0].outcome.as_ref().unwrap();
        assert_eq!(report.rs.source, Some(RsSource::FallbackBenchmark));
        assert_eq!(report.rs.benchmark.as_deref(), Some("SPY"));
    }

    #[test]
    fn test_rs_context_skips_unloadable_peers_and_excludes_self() {
        let src = source();
        let peers = symbols(&["FLAT", "MISSING", "RISE"]);
        let ctx = RsContext::load(&src, Some("NOPE"), &peers, PoolKind::IndexPool, 126);

        assert!(ctx.benchmark.is_none());
        assert_eq!(ctx.peers.len(), 2);
        let inputs = ctx.inputs_for("rise");
        assert_eq!(inputs.peers.unwrap().closes.len(), 1);
    }

    #[test]
    fn test_screen_row_summarizes_success_and_failure() {
        let names = symbols(&["VCP", "MISSING"]);
        let results = screen_symbols(&source(), &names, &RsContext::default());
        let rows: Vec<ScreenRow> = results.iter().map(ScreenRow::from).collect();

        assert!(rows[0].vcp);
        assert_eq!(rows[0].pivot, Some(100.0));
        assert_eq!(rows[0].error, None);
        assert!(rows[1].error.as_deref().unwrap().contains("MISSING"));
        assert_eq!(rows[1].criteria_passed, None);
    }
}
