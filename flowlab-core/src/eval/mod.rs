//! Day-by-day tree evaluation.
//!
//! [`evaluate_day`] walks a tree at one decision index and returns the
//! target allocation for that day, weights in 0..1 summing to at most 1.
//! Whatever the tree does not assign stays in cash.
//!
//! All indicator reads go through [`EvalCtx`]: it owns the per-run
//! indicator cache, translates the decision index into the indicator
//! index for the run's execution convention, and collects warnings as
//! branches degrade.

pub mod conditions;
pub mod trace;
pub mod weighting;

pub use conditions::{eval_line, eval_lines, Outcome};
pub use trace::{EvalTrace, TraceEntry};
pub use weighting::{combine, representative_symbol, ChildOutcome};

use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::allocation::{Allocation, WEIGHT_TOLERANCE};
use crate::config::RunSettings;
use crate::data::PriceDb;
use crate::error::Warning;
use crate::indicators::{IndicatorCache, Metric};
use crate::resolver::CallTable;
use crate::strategy::condition::IndicatorExpr;
use crate::strategy::node::{NodeId, NodeKind, PositionEntry, Quantifier, RankDirection, Strategy};

/// Everything a day's evaluation reads and writes besides the tree
/// itself. One context lives for the whole run so the indicator cache
/// is computed once per (symbol, metric, window).
pub struct EvalCtx<'a> {
    pub db: &'a PriceDb,
    pub calls: &'a CallTable,
    pub settings: &'a RunSettings,
    index: usize,
    indicator_index: usize,
    cache: IndicatorCache,
    pub warnings: Vec<Warning>,
    pub trace: EvalTrace,
}

impl<'a> EvalCtx<'a> {
    pub fn new(db: &'a PriceDb, calls: &'a CallTable, settings: &'a RunSettings) -> Self {
        EvalCtx {
            db,
            calls,
            settings,
            index: 0,
            indicator_index: 0,
            cache: IndicatorCache::new(),
            warnings: Vec::new(),
            trace: EvalTrace::disabled(),
        }
    }

    pub fn with_trace(db: &'a PriceDb, calls: &'a CallTable, settings: &'a RunSettings) -> Self {
        EvalCtx {
            trace: EvalTrace::enabled(),
            ..EvalCtx::new(db, calls, settings)
        }
    }

    /// Position the context on a decision index. Indicator reads lag
    /// behind it under open-entry conventions.
    pub fn set_day(&mut self, index: usize) {
        debug_assert!(index < self.db.len());
        self.index = index;
        self.indicator_index = index.saturating_sub(self.settings.convention.indicator_lag());
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn indicator_index(&self) -> usize {
        self.indicator_index
    }

    pub fn date(&self) -> NaiveDate {
        self.db.date(self.index)
    }

    /// Indicator value for a condition operand at an explicit index.
    /// `None` when the series is undefined there or the symbol is
    /// absent from the database.
    pub fn value_expr(&mut self, expr: &IndicatorExpr, at: usize) -> Option<f64> {
        self.cache
            .value(self.db, &expr.symbol, expr.metric, expr.window, at)
    }

    pub fn value_metric(
        &mut self,
        metric: Metric,
        window: usize,
        symbol: &str,
        at: usize,
    ) -> Option<f64> {
        self.cache.value(self.db, symbol, metric, window, at)
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let warning = Warning::new(self.date(), message);
        self.warnings.push(warning);
    }

    fn record(&mut self, node_id: &str, detail: impl Into<String>) {
        let date = self.date();
        self.trace.record(date, node_id, detail);
    }
}

/// Evaluate the whole tree at the decision index set on `ctx`.
pub fn evaluate_day(tree: &Strategy, ctx: &mut EvalCtx) -> Allocation {
    let allocation = evaluate_node(tree, tree.root(), ctx);
    debug_assert!(
        allocation.total() <= 1.0 + WEIGHT_TOLERANCE,
        "allocation exceeds 1: {}",
        allocation.total()
    );
    allocation
}

fn evaluate_node(tree: &Strategy, id: NodeId, ctx: &mut EvalCtx) -> Allocation {
    match &tree.node(id).kind {
        NodeKind::Group {
            weighting,
            children,
        } => {
            let outcomes = eval_children(tree, children, ctx);
            combine(tree, &outcomes, weighting, ctx)
        }
        NodeKind::Gate {
            conditions,
            then_weighting,
            else_weighting,
            then_children,
            else_children,
        } => {
            let taken = eval_lines(conditions, ctx);
            if ctx.trace.is_enabled() {
                ctx.record(&tree.node(id).id, if taken { "then" } else { "else" });
            }
            let (slot, weighting) = if taken {
                (then_children, then_weighting)
            } else {
                (else_children, else_weighting)
            };
            let outcomes = eval_children(tree, slot, ctx);
            combine(tree, &outcomes, weighting, ctx)
        }
        NodeKind::Numbered {
            groups,
            quantifier,
            then_weighting,
            else_weighting,
            then_children,
            else_children,
        } => {
            let satisfied = groups
                .iter()
                .filter(|group| eval_lines(group, ctx))
                .count();
            let taken = quantifier_holds(quantifier, satisfied, groups.len());
            if ctx.trace.is_enabled() {
                ctx.record(
                    &tree.node(id).id,
                    format!(
                        "{satisfied}/{} groups satisfied: {}",
                        groups.len(),
                        if taken { "then" } else { "else" }
                    ),
                );
            }
            let (slot, weighting) = if taken {
                (then_children, then_weighting)
            } else {
                (else_children, else_weighting)
            };
            let outcomes = eval_children(tree, slot, ctx);
            combine(tree, &outcomes, weighting, ctx)
        }
        NodeKind::Ranking {
            metric,
            window,
            direction,
            take,
            weighting,
            children,
        } => {
            let selected = rank_children(tree, id, children, *metric, *window, *direction, ctx);
            let picked = selected.len().min(*take);
            if ctx.trace.is_enabled() {
                let names: Vec<&str> = selected[..picked]
                    .iter()
                    .map(|&child| tree.node(child).id.as_str())
                    .collect();
                ctx.record(&tree.node(id).id, format!("picked [{}]", names.join(", ")));
            }
            // Only the picked children are evaluated; the rest stay
            // untouched for the day.
            let outcomes: Vec<ChildOutcome> = selected[..picked]
                .iter()
                .filter_map(|&child| {
                    let allocation = evaluate_node(tree, child, ctx);
                    (!allocation.is_empty()).then(|| ChildOutcome {
                        node: child,
                        allocation,
                    })
                })
                .collect();
            combine(tree, &outcomes, weighting, ctx)
        }
        NodeKind::Position { entries } => position_allocation(entries, ctx),
        NodeKind::Call { call_id } => {
            let calls = ctx.calls;
            match calls.get(call_id) {
                Some(sub) => evaluate_node(sub, sub.root(), ctx),
                None => {
                    ctx.warn(format!("call \"{call_id}\" unresolved; treated as empty"));
                    Allocation::empty()
                }
            }
        }
    }
}

/// Evaluate a child slot, dropping placeholders and children that came
/// back empty. The survivors are the active set the weighting splits
/// over.
fn eval_children(
    tree: &Strategy,
    children: &[Option<NodeId>],
    ctx: &mut EvalCtx,
) -> Vec<ChildOutcome> {
    children
        .iter()
        .filter_map(|child| *child)
        .filter_map(|child| {
            let allocation = evaluate_node(tree, child, ctx);
            (!allocation.is_empty()).then(|| ChildOutcome {
                node: child,
                allocation,
            })
        })
        .collect()
}

/// Score each candidate by its representative symbol and return them
/// best-first for the direction. Children without a score are excluded
/// for the day with a warning; ties keep declaration order.
fn rank_children(
    tree: &Strategy,
    id: NodeId,
    children: &[Option<NodeId>],
    metric: Metric,
    window: usize,
    direction: RankDirection,
    ctx: &mut EvalCtx,
) -> Vec<NodeId> {
    let at = ctx.indicator_index();
    let mut scored: Vec<(NodeId, f64)> = Vec::new();
    for child in children.iter().filter_map(|child| *child) {
        let score = representative_symbol(tree, child, ctx.calls)
            .and_then(|symbol| ctx.value_metric(metric, window, &symbol, at));
        match score {
            Some(score) => scored.push((child, score)),
            None => ctx.warn(format!(
                "ranking {} has no score for child {}; excluded today",
                tree.node(id).id,
                tree.node(child).id
            )),
        }
    }
    scored.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        match direction {
            RankDirection::Top => ord.reverse(),
            RankDirection::Bottom => ord,
        }
    });
    scored.into_iter().map(|(child, _)| child).collect()
}

/// Split a position leaf's entries into symbol weights. Declared
/// percentages renormalize over their sum; otherwise the entries split
/// equally. Cash entries keep their share but put nothing into the
/// allocation, so the node's total can land below 1.
fn position_allocation(entries: &[PositionEntry], ctx: &mut EvalCtx) -> Allocation {
    if entries.is_empty() {
        return Allocation::empty();
    }
    let declared = entries.iter().all(|e| e.weight_pct.is_some());
    let shares: Vec<f64> = if declared {
        let sum: f64 = entries.iter().filter_map(|e| e.weight_pct).sum();
        if sum <= WEIGHT_TOLERANCE {
            ctx.warn("declared position weights sum to zero; splitting equally");
            vec![1.0 / entries.len() as f64; entries.len()]
        } else {
            entries
                .iter()
                .map(|e| e.weight_pct.unwrap_or(0.0) / sum)
                .collect()
        }
    } else {
        vec![1.0 / entries.len() as f64; entries.len()]
    };

    let mut total = Allocation::empty();
    for (entry, share) in entries.iter().zip(shares) {
        if let Some(symbol) = entry.symbol.as_deref().filter(|s| !s.is_empty()) {
            total.add(symbol, share);
        }
    }
    total
}

/// Whether `satisfied` out of `total` numbered groups meets the
/// quantifier.
pub fn quantifier_holds(quantifier: &Quantifier, satisfied: usize, total: usize) -> bool {
    match quantifier {
        Quantifier::Any => satisfied >= 1,
        Quantifier::All => satisfied == total,
        Quantifier::None => satisfied == 0,
        Quantifier::Exactly { k } => satisfied == *k,
        Quantifier::AtLeast { k } => satisfied >= *k,
        Quantifier::AtMost { k } => satisfied <= *k,
    }
}
