use anyhow::{Context, Result};

use std::io::Write;
use std::path::Path;

use crate::analysis::Report;
use crate::screen::ScreenRow;

fn opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn flag(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

pub fn print_report(symbol: &str, report: &Report) {
    let ind = &report.indicators;
    println!("=== {symbol} ===");
    println!("Last close:              {}", opt(ind.last_close));
    println!("MA20 / MA50:             {} / {}", opt(ind.ma20), opt(ind.ma50));
    println!("MA150 / MA200:           {} / {}", opt(ind.ma150), opt(ind.ma200));
    println!("52w high / low:          {} / {}", opt(ind.high_52w), opt(ind.low_52w));
    println!("Signal:                  {}", report.signal);
    for reason in &report.reasons {
        println!("  - {reason}");
    }

    println!("Trend template:");
    for c in &report.criteria {
        println!("  [{}] {}. {}", if c.pass { "x" } else { " " }, c.id, c.title);
    }

    if let Some(rating) = report.rs.rs_rating {
        println!("RS rating:               {rating}");
    }
    if let Some(approx) = report.rs.rs_approx {
        println!("RS approx:               {approx:.1}");
    }

    println!(
        "VCP:                     {} (best run: {}, {} legs)",
        flag(report.vcp.is_vcp),
        flag(report.vcp.best.is_vcp),
        report.vcp.best.count
    );
    if let Some(p) = &report.pivot {
        println!(
            "Pivot:                   {:.2} on {} (buy to {:.2}, above: {})",
            p.pivot,
            p.pivot_date,
            p.buy_zone.to,
            flag(p.is_above_pivot)
        );
    }

    for (name, cup) in [("Cheat", &report.cheat), ("Low cheat", &report.cheat_low)] {
        match cup {
            Some(cup) => {
                println!("{name:<25}{}", flag(cup.qualifies));
                for reason in &cup.reasons {
                    println!("  - {reason}");
                }
            }
            None => println!("{name:<25}n/a"),
        }
    }

    match &report.power_play {
        Some(pp) => {
            println!("Power play:              {}", flag(pp.qualifies));
            for reason in &pp.reasons {
                println!("  - {reason}");
            }
        }
        None => println!("Power play:              n/a"),
    }
}

pub fn print_json(report: &Report) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    println!("{json}");
    Ok(())
}

pub fn write_summary<W: Write>(writer: W, rows: &[ScreenRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row).context("failed to write summary row")?;
    }
    wtr.flush().context("failed to flush summary")?;
    Ok(())
}

pub fn write_summary_file(path: &Path, rows: &[ScreenRow]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create output file: {:?}", path))?;
    write_summary(file, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(symbol: &str, error: Option<&str>) -> ScreenRow {
        ScreenRow {
            symbol: symbol.into(),
            last_close: error.is_none().then_some(101.5),
            signal: error.is_none().then(|| "bullish".to_string()),
            criteria_passed: error.is_none().then_some(6),
            rs_rating: None,
            vcp: error.is_none(),
            pivot: None,
            cheat: false,
            cheat_low: false,
            power_play: false,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_write_summary_emits_header_and_rows() {
        let mut buf = Vec::new();
        write_summary(&mut buf, &[row("AAPL", None), row("XYZ", Some("no data"))]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("symbol,last_close,signal,criteria_passed"));
        assert!(lines[1].starts_with("AAPL,101.5,bullish,6,,true"));
        assert!(lines[2].ends_with(",no data"));
    }

    #[test]
    fn test_opt_formats_missing_values() {
        assert_eq!(opt(None), "n/a");
        assert_eq!(opt(Some(1.0 / 3.0)), "0.33");
    }
}
