//! The backtest pipeline.
//!
//! [`run_backtest`] strings the phases together: resolve calls,
//! validate, compress, fetch bars once, align prices, check warmup
//! windows, then evaluate day by day and score the result. Anything
//! wrong before the day loop is a hard [`BacktestError`]; anomalies
//! inside it degrade to warnings on the report.

pub mod returns;

pub use returns::{
    benchmark_curve, compute_returns, curve_returns, drawdown_curve, monthly_table, MAX_DAILY_LOSS,
};

use std::collections::BTreeMap;

use serde_json::json;

use crate::compress::{compress, structural_hash};
use crate::config::RunSettings;
use crate::data::{BarSource, DataError, PriceDb};
use crate::error::{BacktestError, ValidationIssue, Warning, RUN_SCOPE};
use crate::eval::{evaluate_day, EvalCtx, EvalTrace};
use crate::metrics::compute_summary;
use crate::report::{BacktestReport, CurvePoint};
use crate::resolver::{resolve_calls, CallSource, CallTable};
use crate::strategy::node::Strategy;
use crate::validate::{collect_tickers, validate_tree, validate_windows};

/// Run one backtest end to end.
pub fn run_backtest(
    tree: &Strategy,
    bars: &dyn BarSource,
    calls: &dyn CallSource,
    settings: &RunSettings,
) -> Result<BacktestReport, BacktestError> {
    run(tree, bars, calls, settings, false).map(|(report, _)| report)
}

/// Same pipeline, also recording which branch every gate, numbered
/// node, and ranking took on every evaluated day.
pub fn run_backtest_traced(
    tree: &Strategy,
    bars: &dyn BarSource,
    calls: &dyn CallSource,
    settings: &RunSettings,
) -> Result<(BacktestReport, EvalTrace), BacktestError> {
    run(tree, bars, calls, settings, true)
}

fn run(
    tree: &Strategy,
    bars: &dyn BarSource,
    calls: &dyn CallSource,
    settings: &RunSettings,
    traced: bool,
) -> Result<(BacktestReport, EvalTrace), BacktestError> {
    // ─── Resolve and validate ────────────────────────────────────────

    let table = resolve_calls(tree, calls).map_err(BacktestError::Validation)?;

    let mut issues = validate_tree(tree);
    for (call_id, sub) in table.iter() {
        issues.extend(validate_tree(sub).into_iter().map(|i| prefixed(call_id, i)));
    }
    if !issues.is_empty() {
        return Err(BacktestError::Validation(issues));
    }

    // ─── Compress ────────────────────────────────────────────────────

    let (tree, mut stats) =
        compress(tree).map_err(|issue| BacktestError::Validation(vec![issue]))?;
    let table = table
        .map_trees(|call_id, sub| {
            compress(&sub)
                .map(|(compressed, s)| {
                    stats.absorb(&s);
                    compressed
                })
                .map_err(|issue| prefixed(call_id, issue))
        })
        .map_err(|issue| BacktestError::Validation(vec![issue]))?;

    // ─── Fetch and align ─────────────────────────────────────────────

    let mut sets = collect_tickers(&tree, &table);
    if let Some(benchmark) = &settings.benchmark {
        sets.indicator.insert(benchmark.clone());
    }
    let raw = bars.fetch_batch(&sets.all(), settings.max_bars)?;
    // Too little shared history is a caller-fixable problem, so it joins
    // the validation channel; transport and parse failures stay data
    // errors.
    let db = match PriceDb::build(&raw, &sets.indicator) {
        Ok(db) => db,
        Err(DataError::InsufficientHistory { days, limiting }) => {
            return Err(BacktestError::Validation(vec![ValidationIssue::new(
                RUN_SCOPE,
                "data",
                format!("insufficient overlapping history: {days} shared days, limited by {limiting}"),
            )]));
        }
        Err(err) => return Err(err.into()),
    };

    // ─── Warmup windows ──────────────────────────────────────────────

    let mut issues = validate_windows(&tree, db.len());
    for (call_id, sub) in table.iter() {
        issues.extend(
            validate_windows(sub, db.len())
                .into_iter()
                .map(|i| prefixed(call_id, i)),
        );
    }
    if !issues.is_empty() {
        return Err(BacktestError::Validation(issues));
    }

    // ─── Start index ─────────────────────────────────────────────────

    // Every position symbol must be tradable before the loop starts;
    // index 0 is excluded so the lagged conventions always have a
    // previous bar.
    let Some(latest) = sets
        .position
        .iter()
        .filter_map(|symbol| db.first_valid(symbol))
        .max()
    else {
        return Err(BacktestError::Validation(vec![ValidationIssue::new(
            RUN_SCOPE,
            "data",
            "no position symbol ever becomes tradable on the shared axis",
        )]));
    };
    let start = latest.max(1);
    if start >= db.len() {
        return Err(BacktestError::Validation(vec![ValidationIssue::new(
            RUN_SCOPE,
            "data",
            format!(
                "no evaluable days: tradability starts at index {start}, axis has {}",
                db.len()
            ),
        )]));
    }

    // ─── Day loop ────────────────────────────────────────────────────

    let mut ctx = if traced {
        EvalCtx::with_trace(&db, &table, settings)
    } else {
        EvalCtx::new(&db, &table, settings)
    };
    let mut allocations = Vec::with_capacity(db.len() - start);
    for index in start..db.len() {
        ctx.set_day(index);
        allocations.push(evaluate_day(&tree, &mut ctx));
    }

    // ─── Returns and report ──────────────────────────────────────────

    let mut warnings = std::mem::take(&mut ctx.warnings);
    let days = compute_returns(&db, &allocations, start, settings, &mut warnings);
    let equity: Vec<CurvePoint> = days
        .iter()
        .map(|d| CurvePoint::new(d.date, d.equity))
        .collect();
    let drawdown = drawdown_curve(&equity);

    let benchmark = settings
        .benchmark
        .as_deref()
        .and_then(|symbol| benchmark_curve(&db, symbol, start));
    if settings.benchmark.is_some() && benchmark.is_none() {
        warnings.push(Warning::new(
            db.date(start),
            "benchmark never prices in the evaluated span; relative stats omitted",
        ));
    }
    let benchmark_returns = benchmark.as_deref().map(curve_returns);

    let report = BacktestReport {
        run_id: run_fingerprint(&tree, &table, settings, &db, start),
        summary: compute_summary(&days, benchmark_returns.as_deref()),
        monthly: monthly_table(&days),
        equity,
        drawdown,
        benchmark,
        days,
        warnings,
        compression: stats,
    };
    Ok((report, ctx.trace))
}

fn prefixed(call_id: &str, mut issue: ValidationIssue) -> ValidationIssue {
    issue.node_id = format!("{call_id}:{}", issue.node_id);
    issue
}

/// Stable run id: the structural hashes of the compressed trees, the
/// settings, and the evaluated date span. Node ids and layout do not
/// matter; semantics do.
fn run_fingerprint(
    tree: &Strategy,
    table: &CallTable,
    settings: &RunSettings,
    db: &PriceDb,
    start: usize,
) -> String {
    let calls: BTreeMap<&String, String> = table
        .iter()
        .map(|(call_id, sub)| (call_id, structural_hash(sub)))
        .collect();
    let doc = json!({
        "tree": structural_hash(tree),
        "calls": calls,
        "settings": settings,
        "span": [db.date(start), db.date(db.len() - 1)],
    });
    blake3::hash(doc.to_string().as_bytes()).to_hex().to_string()
}
