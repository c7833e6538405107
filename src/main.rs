use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;

use setup_scanner::rs::{Benchmark, RsInputs, apply_relative_strength};

#[derive(Debug, Parser)]
struct Args {
    /// Path to the daily CSV file (date,open,high,low,close,volume)
    #[arg(long)]
    input: PathBuf,

    /// Daily CSV of a benchmark index for the relative-strength line
    #[arg(long)]
    benchmark: Option<PathBuf>,

    /// Label used for the benchmark in the report
    #[arg(long, default_value = "SPY")]
    benchmark_name: String,

    /// Print the full report as JSON instead of the text summary
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let bars = setup_scanner::data::get_bars_from_input_file(&args.input)?;
    if bars.is_empty() {
        println!("No data found in CSV.");
        return Ok(());
    }

    let mut report = setup_scanner::analysis::analyze(&bars)
        .with_context(|| format!("cannot analyze {:?}", args.input))?;

    if let Some(path) = &args.benchmark {
        let benchmark = Benchmark {
            name: args.benchmark_name.clone(),
            bars: setup_scanner::data::get_bars_from_input_file(path)?,
        };
        let inputs = RsInputs {
            benchmark: Some(benchmark),
            ..RsInputs::default()
        };
        apply_relative_strength(&mut report, &bars, &inputs);
    }

    if args.json {
        setup_scanner::output::print_json(&report)?;
    } else {
        let label = args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        setup_scanner::output::print_report(&label, &report);
    }

    Ok(())
}
