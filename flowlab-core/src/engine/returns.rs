//! Turning daily target allocations into realized returns.
//!
//! The execution convention decides which allocation is at work on a
//! given axis day and which price pair brackets it:
//!
//! * open-to-close holds today's target from today's open to its close;
//! * open-to-open holds yesterday's target from yesterday's open to
//!   today's open;
//! * close-to-open holds yesterday's target from yesterday's close to
//!   today's open;
//! * close-to-close holds yesterday's target from yesterday's close to
//!   today's close.
//!
//! Under the lagged conventions the first evaluated day carries no
//! position yet. All return math runs on adjusted prices.

use chrono::Datelike;

use crate::allocation::Allocation;
use crate::config::{ExecutionConvention, RunSettings};
use crate::data::PriceDb;
use crate::error::Warning;
use crate::report::{CurvePoint, DaySnapshot, MonthlyReturn};

/// Floor on a single day's net return. A day that computes below this
/// is clamped, with a warning, so one corrupt price cannot zero the
/// whole equity curve.
pub const MAX_DAILY_LOSS: f64 = -0.9999;

/// Realize returns for `allocations`, where `allocations[k]` is the
/// target decided at axis index `start + k`. Anomalies append to
/// `warnings` with the axis date they occurred on.
pub fn compute_returns(
    db: &PriceDb,
    allocations: &[Allocation],
    start: usize,
    settings: &RunSettings,
    warnings: &mut Vec<Warning>,
) -> Vec<DaySnapshot> {
    let convention = settings.convention;
    let cost_rate = settings.cost_rate();
    let empty = Allocation::empty();
    let mut days = Vec::with_capacity(allocations.len());
    let mut previous_used: &Allocation = &empty;
    let mut equity = 1.0;

    for (k, decided) in allocations.iter().enumerate() {
        let t = start + k;
        let date = db.date(t);
        let used: &Allocation = if convention == ExecutionConvention::OpenToClose {
            decided
        } else if k == 0 {
            &empty
        } else {
            &allocations[k - 1]
        };

        let gross = gross_return(db, used, t, convention, date, warnings);
        let turnover = used.turnover(previous_used);
        let cost = turnover * cost_rate;
        let mut net = gross - cost;
        if net < MAX_DAILY_LOSS {
            warnings.push(Warning::new(
                date,
                format!("net return {net:.4} clamped to {MAX_DAILY_LOSS}"),
            ));
            net = MAX_DAILY_LOSS;
        }
        equity *= 1.0 + net;

        days.push(DaySnapshot {
            date,
            allocation: decided.clone(),
            gross_return: gross,
            net_return: net,
            turnover,
            cost,
            equity,
        });
        previous_used = used;
    }
    days
}

/// Weighted sum of per-symbol price moves for the day's working
/// allocation. A symbol without a usable price pair contributes zero.
fn gross_return(
    db: &PriceDb,
    used: &Allocation,
    t: usize,
    convention: ExecutionConvention,
    date: chrono::NaiveDate,
    warnings: &mut Vec<Warning>,
) -> f64 {
    let mut gross = 0.0;
    for (symbol, weight) in used.iter() {
        let Some(series) = db.series(symbol) else {
            warnings.push(Warning::new(
                date,
                format!("no price series for {symbol}; dropped from the day's return"),
            ));
            continue;
        };
        let (entry, exit) = match convention {
            ExecutionConvention::OpenToClose => (series.adj_open[t], series.adj_close[t]),
            ExecutionConvention::OpenToOpen => (series.adj_open[t - 1], series.adj_open[t]),
            ExecutionConvention::CloseToOpen => (series.adj_close[t - 1], series.adj_open[t]),
            ExecutionConvention::CloseToClose => (series.adj_close[t - 1], series.adj_close[t]),
        };
        if entry.is_finite() && exit.is_finite() && entry > 0.0 {
            gross += weight * (exit / entry - 1.0);
        } else {
            warnings.push(Warning::new(
                date,
                format!("no usable price for {symbol}; dropped from the day's return"),
            ));
        }
    }
    gross
}

/// Benchmark equity from `start`, normalized to 1 at its first valid
/// close at or after `start`. Gaps carry the last price forward. `None`
/// when the symbol is absent or never prices in the span.
pub fn benchmark_curve(db: &PriceDb, symbol: &str, start: usize) -> Option<Vec<CurvePoint>> {
    let series = db.series(symbol)?;
    let closes = &series.adj_close;
    let base = closes[start..]
        .iter()
        .copied()
        .find(|v| v.is_finite() && *v > 0.0)?;
    let mut last = f64::NAN;
    let mut points = Vec::with_capacity(db.len() - start);
    for t in start..db.len() {
        let px = closes[t];
        if px.is_finite() && px > 0.0 {
            last = px;
        }
        let value = if last.is_finite() { last / base } else { 1.0 };
        points.push(CurvePoint::new(db.date(t), value));
    }
    Some(points)
}

/// Daily returns of a curve, 0 on its first point.
pub fn curve_returns(curve: &[CurvePoint]) -> Vec<f64> {
    curve
        .iter()
        .enumerate()
        .map(|(k, point)| {
            if k == 0 {
                return 0.0;
            }
            let prev = curve[k - 1].value;
            if prev > 0.0 {
                point.value / prev - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Drawdown from the running peak of an equity curve, as negative
/// fractions.
pub fn drawdown_curve(equity: &[CurvePoint]) -> Vec<CurvePoint> {
    let mut peak = f64::NEG_INFINITY;
    equity
        .iter()
        .map(|point| {
            peak = peak.max(point.value);
            let dd = if peak > 0.0 { point.value / peak - 1.0 } else { 0.0 };
            CurvePoint::new(point.date, dd)
        })
        .collect()
}

/// Compound the daily nets into calendar months, in percent.
pub fn monthly_table(days: &[DaySnapshot]) -> Vec<MonthlyReturn> {
    let mut table = Vec::new();
    let mut current: Option<(i32, u32, f64)> = None;
    for day in days {
        let (year, month) = (day.date.year(), day.date.month());
        match current.as_mut() {
            Some((y, m, factor)) if *y == year && *m == month => {
                *factor *= 1.0 + day.net_return;
            }
            _ => {
                if let Some((y, m, factor)) = current.take() {
                    table.push(MonthlyReturn {
                        year: y,
                        month: m,
                        pct: (factor - 1.0) * 100.0,
                    });
                }
                current = Some((year, month, 1.0 + day.net_return));
            }
        }
    }
    if let Some((y, m, factor)) = current {
        table.push(MonthlyReturn {
            year: y,
            month: m,
            pct: (factor - 1.0) * 100.0,
        });
    }
    table
}
