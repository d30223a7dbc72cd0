//! FlowLab CLI — run, inspect, and fixture-generation commands.
//!
//! Commands:
//! - `run` — backtest a strategy document against a directory of bar CSVs
//! - `compress` — report what the tree rewrites would do to a strategy
//! - `synth` — write deterministic synthetic OHLCV fixtures

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use flowlab_core::compress::compress;
use flowlab_core::config::{ExecutionConvention, RunSettings};
use flowlab_core::data::csv_source::write_bars;
use flowlab_core::data::synthetic::{seed_for, synthetic_bars};
use flowlab_core::data::CsvBarSource;
use flowlab_core::engine::run_backtest;
use flowlab_core::error::BacktestError;
use flowlab_core::report::BacktestReport;
use flowlab_core::resolver::{CallSource, NoCalls};
use flowlab_core::strategy::{schema, Strategy};

#[derive(Parser)]
#[command(
    name = "flowlab",
    about = "FlowLab CLI — conditional-tree strategy backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a strategy JSON document against a directory of bar CSVs.
    Run {
        /// Path to the strategy JSON document.
        strategy: PathBuf,

        /// Directory of SYMBOL.csv bar files. Defaults to ./bars.
        #[arg(long)]
        bars: Option<PathBuf>,

        /// Directory of called-tree documents ({call_id}.json).
        #[arg(long)]
        calls: Option<PathBuf>,

        /// TOML run profile with a [settings] table.
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Execution convention: open-to-open, open-to-close,
        /// close-to-open, close-to-close.
        #[arg(long)]
        convention: Option<String>,

        /// Transaction cost on turnover, in basis points.
        #[arg(long)]
        cost_bps: Option<f64>,

        /// Benchmark symbol for beta and the relative curve.
        #[arg(long)]
        benchmark: Option<String>,

        /// Newest rows fetched per symbol.
        #[arg(long)]
        max_bars: Option<usize>,

        /// Write the full report JSON here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Report what compression would do to a strategy document.
    Compress {
        /// Path to the strategy JSON document.
        strategy: PathBuf,

        /// Write the compressed document JSON here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write deterministic synthetic OHLCV fixtures, one CSV per symbol.
    Synth {
        /// Symbols to generate (e.g., SPY QQQ GLD).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Weekday bars per symbol.
        #[arg(long, default_value_t = 756)]
        days: usize,

        /// First bar date (YYYY-MM-DD).
        #[arg(long, default_value = "2021-01-04")]
        start: String,

        /// Starting price.
        #[arg(long, default_value_t = 100.0)]
        price: f64,

        /// Per-day drift as a fraction.
        #[arg(long, default_value_t = 0.0002)]
        drift: f64,

        /// Per-day volatility as a fraction.
        #[arg(long, default_value_t = 0.012)]
        vol: f64,

        /// Output directory. Defaults to ./bars.
        #[arg(long, default_value = "bars")]
        out_dir: PathBuf,
    },
}

/// TOML run profile. Paths fill in for missing flags; flags win when
/// both are present.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunProfile {
    bars: Option<PathBuf>,
    calls: Option<PathBuf>,
    output: Option<PathBuf>,
    settings: RunSettings,
}

/// Called trees as {call_id}.json documents in one directory.
struct JsonDirCalls {
    dir: PathBuf,
}

impl CallSource for JsonDirCalls {
    fn resolve(&self, call_id: &str) -> Option<Strategy> {
        let path = self.dir.join(format!("{call_id}.json"));
        let text = std::fs::read_to_string(&path).ok()?;
        match schema::parse(&text) {
            Ok(tree) => Some(tree),
            Err(e) => {
                eprintln!("warning: {} is not a valid strategy: {e}", path.display());
                None
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            strategy,
            bars,
            calls,
            profile,
            convention,
            cost_bps,
            benchmark,
            max_bars,
            output,
        } => run_cmd(
            strategy, bars, calls, profile, convention, cost_bps, benchmark, max_bars, output,
        ),
        Commands::Compress { strategy, output } => compress_cmd(&strategy, output),
        Commands::Synth {
            symbols,
            days,
            start,
            price,
            drift,
            vol,
            out_dir,
        } => synth_cmd(&symbols, days, &start, price, drift, vol, &out_dir),
    }
}

fn load_strategy(path: &Path) -> Result<Strategy> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    schema::parse(&text).with_context(|| format!("parsing {}", path.display()))
}

fn parse_convention(name: &str) -> Result<ExecutionConvention> {
    let convention = match name {
        "open-to-open" => ExecutionConvention::OpenToOpen,
        "open-to-close" => ExecutionConvention::OpenToClose,
        "close-to-open" => ExecutionConvention::CloseToOpen,
        "close-to-close" => ExecutionConvention::CloseToClose,
        _ => bail!(
            "unknown convention '{name}'. Valid: open-to-open, open-to-close, close-to-open, close-to-close"
        ),
    };
    Ok(convention)
}

#[allow(clippy::too_many_arguments)]
fn run_cmd(
    strategy_path: PathBuf,
    bars: Option<PathBuf>,
    calls: Option<PathBuf>,
    profile_path: Option<PathBuf>,
    convention: Option<String>,
    cost_bps: Option<f64>,
    benchmark: Option<String>,
    max_bars: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let tree = load_strategy(&strategy_path)?;

    let profile = match &profile_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<RunProfile>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => RunProfile::default(),
    };

    let mut settings = profile.settings;
    if let Some(name) = &convention {
        settings.convention = parse_convention(name)?;
    }
    if let Some(bps) = cost_bps {
        settings.cost_bps = bps;
    }
    if let Some(symbol) = benchmark {
        settings.benchmark = Some(symbol);
    }
    if let Some(cap) = max_bars {
        settings.max_bars = cap;
    }

    let bars_dir = bars.or(profile.bars).unwrap_or_else(|| PathBuf::from("bars"));
    let source = CsvBarSource::new(&bars_dir);

    let calls_dir = calls.or(profile.calls);
    let call_source: Box<dyn CallSource> = match calls_dir {
        Some(dir) => Box::new(JsonDirCalls { dir }),
        None => Box::new(NoCalls),
    };

    let report = match run_backtest(&tree, &source, call_source.as_ref(), &settings) {
        Ok(report) => report,
        Err(BacktestError::Validation(issues)) => {
            for issue in &issues {
                eprintln!("  {issue}");
            }
            bail!("validation failed with {} issue(s)", issues.len());
        }
        Err(e) => return Err(e.into()),
    };

    print_summary(&report, &settings);

    if let Some(path) = output.or(profile.output) {
        std::fs::write(&path, report.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Report saved to: {}", path.display());
    }

    Ok(())
}

fn compress_cmd(strategy_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let tree = load_strategy(strategy_path)?;
    let (compressed, stats) = match compress(&tree) {
        Ok(pair) => pair,
        Err(issue) => bail!("compression rejected the tree: {issue}"),
    };

    println!("Nodes:            {} -> {}", stats.original_nodes, stats.compressed_nodes);
    println!("Pruned links:     {}", stats.pruned);
    println!("Collapsed groups: {}", stats.collapsed_groups);
    println!("Merged gates:     {}", stats.merged_gates);
    println!("Deduplicated:     {}", stats.deduplicated);
    println!("Elapsed:          {:.2} ms", stats.elapsed_ms);

    if let Some(path) = output {
        std::fs::write(&path, schema::to_json(&compressed)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Compressed document saved to: {}", path.display());
    }

    Ok(())
}

fn synth_cmd(
    symbols: &[String],
    days: usize,
    start: &str,
    price: f64,
    drift: f64,
    vol: f64,
    out_dir: &Path,
) -> Result<()> {
    let start_date = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("parsing start date '{start}'"))?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    for symbol in symbols {
        let bars = synthetic_bars(seed_for(symbol), days, start_date, price, drift, vol);
        let path = out_dir.join(format!("{symbol}.csv"));
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        write_bars(file, &bars)?;
        println!("Wrote {} bars to {}", bars.len(), path.display());
    }

    Ok(())
}

fn print_summary(report: &BacktestReport, settings: &RunSettings) {
    let summary = &report.summary;
    println!();
    println!("=== Backtest Result ===");
    println!("Run id:         {}", report.run_id);
    println!("Convention:     {}", settings.convention.label());
    if let (Some(first), Some(last)) = (report.days.first(), report.days.last()) {
        println!(
            "Span:           {} to {} ({} days)",
            first.date, last.date, summary.days
        );
    }
    println!("Final equity:   {:.4}x", report.final_equity());
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", summary.total_return * 100.0);
    println!("CAGR:           {:.2}%", summary.cagr * 100.0);
    println!("Volatility:     {:.2}%", summary.annualized_volatility * 100.0);
    println!("Sharpe:         {:.3}", summary.sharpe);
    println!("Sortino:        {:.3}", summary.sortino);
    println!("Calmar:         {:.3}", summary.calmar);
    println!("Max Drawdown:   {:.2}%", summary.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", summary.win_rate * 100.0);
    println!("Avg Turnover:   {:.3}", summary.avg_turnover);
    println!("Avg Holdings:   {:.1}", summary.avg_holdings);
    println!("Best Day:       {:.2}%", summary.best_day * 100.0);
    println!("Worst Day:      {:.2}%", summary.worst_day * 100.0);
    if let Some(beta) = summary.beta {
        println!("Beta:           {beta:.3}");
    }
    if let Some(treynor) = summary.treynor {
        println!("Treynor:        {treynor:.3}");
    }
    println!();
    println!("--- Compression ---");
    println!(
        "Nodes:          {} -> {}",
        report.compression.original_nodes, report.compression.compressed_nodes
    );

    const SHOWN: usize = 8;
    for warning in report.warnings.iter().take(SHOWN) {
        println!("WARNING: {warning}");
    }
    if report.warnings.len() > SHOWN {
        println!("... and {} more warnings", report.warnings.len() - SHOWN);
    }
    println!();
}
