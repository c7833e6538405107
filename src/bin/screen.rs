use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;

use setup_scanner::{
    config::ScreenConfig,
    output::{write_summary, write_summary_file},
    screen::{RsContext, ScreenRow, screen_symbols},
    source::CsvDirectorySource,
};

/// Screen every configured symbol and write a one-line-per-symbol summary.
#[derive(Debug, Parser)]
struct Args {
    /// Screen settings (TOML, JSON or YAML)
    #[arg(long)]
    config: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = ScreenConfig::load(args.config)?;
    info!(data_dir = ?cfg.data_dir, symbols = cfg.symbols.len(), "loaded screen config");

    let source = CsvDirectorySource::new(&cfg.data_dir);
    let ctx = RsContext::load(
        &source,
        cfg.benchmark.as_deref(),
        &cfg.peers,
        cfg.peer_pool,
        cfg.rs_lookback_days,
    );

    let results = screen_symbols(&source, &cfg.symbols, &ctx);
    let rows: Vec<ScreenRow> = results.iter().map(ScreenRow::from).collect();

    match &cfg.output_csv {
        Some(path) => {
            write_summary_file(path, &rows)?;
            info!(path = ?path, rows = rows.len(), "wrote screen summary");
        }
        None => write_summary(std::io::stdout().lock(), &rows)?,
    }

    Ok(())
}
