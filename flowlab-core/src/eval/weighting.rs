//! Combining child allocations under a node's weighting mode.
//!
//! Children arrive already evaluated and filtered to the active ones
//! (non-empty allocations). Every mode hands out factors that sum to at
//! most 1 over the active children, so weights can only shrink on the
//! way up the tree.

use crate::allocation::{Allocation, MIN_WEIGHT, WEIGHT_TOLERANCE};
use crate::indicators::Metric;
use crate::resolver::CallTable;
use crate::strategy::node::{NodeId, NodeKind, Strategy, Weighting};

use super::EvalCtx;

/// One active child: its node and the allocation it produced.
pub struct ChildOutcome {
    pub node: NodeId,
    pub allocation: Allocation,
}

/// Scale-and-merge the active children under `weighting`.
pub fn combine(
    tree: &Strategy,
    outcomes: &[ChildOutcome],
    weighting: &Weighting,
    ctx: &mut EvalCtx,
) -> Allocation {
    if outcomes.is_empty() {
        return Allocation::empty();
    }
    match weighting {
        Weighting::Equal => equal_split(outcomes),
        Weighting::Defined => defined_split(tree, outcomes, ctx),
        Weighting::InverseVolatility { window } => {
            volatility_split(tree, outcomes, *window, true, ctx)
        }
        Weighting::ProVolatility { window } => {
            volatility_split(tree, outcomes, *window, false, ctx)
        }
        Weighting::CappedFallback { max_pct, fallback } => {
            capped_split(outcomes, *max_pct, fallback)
        }
    }
}

fn equal_split(outcomes: &[ChildOutcome]) -> Allocation {
    let factor = 1.0 / outcomes.len() as f64;
    let mut total = Allocation::empty();
    for outcome in outcomes {
        total.merge_scaled(&outcome.allocation, factor);
    }
    total
}

/// Renormalize the declared `weight_pct` shares over the active
/// children. No declared weight among them falls back to an equal
/// split with a warning.
fn defined_split(tree: &Strategy, outcomes: &[ChildOutcome], ctx: &mut EvalCtx) -> Allocation {
    let pcts: Vec<f64> = outcomes
        .iter()
        .map(|o| tree.node(o.node).weight_pct.unwrap_or(0.0))
        .collect();
    let sum: f64 = pcts.iter().sum();
    if sum <= WEIGHT_TOLERANCE {
        ctx.warn("no declared weights among active children; splitting equally");
        return equal_split(outcomes);
    }
    let mut total = Allocation::empty();
    for (outcome, pct) in outcomes.iter().zip(pcts) {
        total.merge_scaled(&outcome.allocation, pct / sum);
    }
    total
}

/// Split by trailing volatility of each child's representative symbol.
/// A child whose volatility cannot be scored keeps a plain equal share
/// (with a warning); the scored children divide the remainder.
fn volatility_split(
    tree: &Strategy,
    outcomes: &[ChildOutcome],
    window: usize,
    inverse: bool,
    ctx: &mut EvalCtx,
) -> Allocation {
    let n = outcomes.len() as f64;
    let scores: Vec<Option<f64>> = outcomes
        .iter()
        .map(|o| {
            let symbol = representative_symbol(tree, o.node, ctx.calls)?;
            let vol = volatility_score(&symbol, window, ctx)?;
            Some(if inverse { 1.0 / vol } else { vol })
        })
        .collect();

    for (outcome, score) in outcomes.iter().zip(&scores) {
        if score.is_none() {
            ctx.warn(format!(
                "volatility unavailable for child {}; using equal share",
                tree.node(outcome.node).id
            ));
        }
    }

    let unscored = scores.iter().filter(|s| s.is_none()).count() as f64;
    let scored_sum: f64 = scores.iter().flatten().sum();
    let remaining = 1.0 - unscored / n;

    let mut total = Allocation::empty();
    for (outcome, score) in outcomes.iter().zip(&scores) {
        let factor = match score {
            Some(s) if scored_sum > 0.0 => remaining * s / scored_sum,
            Some(_) => 0.0,
            None => 1.0 / n,
        };
        total.merge_scaled(&outcome.allocation, factor);
    }
    total
}

/// Equal split capped per child; the clipped excess buys the fallback
/// symbol directly.
fn capped_split(outcomes: &[ChildOutcome], max_pct: f64, fallback: &str) -> Allocation {
    let n = outcomes.len() as f64;
    let base = 1.0 / n;
    let factor = base.min(max_pct / 100.0);
    let mut total = Allocation::empty();
    for outcome in outcomes {
        total.merge_scaled(&outcome.allocation, factor);
    }
    let excess = (base - factor) * n;
    if excess > MIN_WEIGHT {
        total.add(fallback, excess);
    }
    total
}

/// First non-cash symbol under a node, following calls through the
/// resolved table. This is the symbol volatility weighting and ranking
/// score for a whole subtree.
pub fn representative_symbol(tree: &Strategy, id: NodeId, calls: &CallTable) -> Option<String> {
    match &tree.node(id).kind {
        NodeKind::Position { entries } => entries
            .iter()
            .find_map(|e| e.symbol.clone().filter(|s| !s.is_empty())),
        NodeKind::Call { call_id } => calls
            .get(call_id)
            .and_then(|sub| representative_symbol(sub, sub.root(), calls)),
        kind => kind
            .child_ids()
            .into_iter()
            .find_map(|child| representative_symbol(tree, child, calls)),
    }
}

/// Annualized trailing volatility at the indicator index. Zero or
/// unavailable reads as unscorable.
fn volatility_score(symbol: &str, window: usize, ctx: &mut EvalCtx) -> Option<f64> {
    let at = ctx.indicator_index();
    ctx.value_metric(Metric::AnnualizedVolatility, window, symbol, at)
        .filter(|v| *v > 1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunSettings;
    use crate::data::{PriceDb, RawBar};
    use crate::strategy::node::{PositionEntry, SlotName};
    use chrono::NaiveDate;
    use std::collections::{BTreeMap, BTreeSet};

    fn db_of(series: &[(&str, &[f64])]) -> PriceDb {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut map = BTreeMap::new();
        for (symbol, closes) in series {
            let bars: Vec<RawBar> = closes
                .iter()
                .enumerate()
                .map(|(i, &px)| RawBar {
                    date: start + chrono::Days::new(i as u64),
                    open: px,
                    high: px + 0.5,
                    low: px - 0.5,
                    close: px,
                    adj_close: px,
                    volume: 1_000_000.0,
                })
                .collect();
            map.insert(symbol.to_string(), bars);
        }
        let indicators: BTreeSet<String> = map.keys().cloned().collect();
        PriceDb::build(&map, &indicators).unwrap()
    }

    fn outcome(tree: &mut Strategy, symbol: &str, pct: Option<f64>) -> ChildOutcome {
        let node = tree.add(NodeKind::single_position(symbol));
        if let Some(p) = pct {
            tree.set_weight_pct(node, p);
        }
        tree.attach(tree.root(), SlotName::Next, node);
        ChildOutcome {
            node,
            allocation: Allocation::single(symbol, 1.0),
        }
    }

    fn group_tree() -> Strategy {
        Strategy::with_root(NodeKind::Group {
            weighting: Weighting::Equal,
            children: Vec::new(),
        })
    }

    #[test]
    fn equal_split_over_active() {
        let db = db_of(&[("AAA", &[10.0; 5])]);
        let calls = CallTable::new();
        let settings = RunSettings::default();
        let mut ctx = EvalCtx::new(&db, &calls, &settings);
        ctx.set_day(2);

        let mut tree = group_tree();
        let outcomes = vec![
            outcome(&mut tree, "AAA", None),
            outcome(&mut tree, "BBB", None),
        ];
        let total = combine(&tree, &outcomes, &Weighting::Equal, &mut ctx);
        assert!((total.weight("AAA") - 0.5).abs() < 1e-12);
        assert!((total.weight("BBB") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn defined_renormalizes_over_active() {
        let db = db_of(&[("AAA", &[10.0; 5])]);
        let calls = CallTable::new();
        let settings = RunSettings::default();
        let mut ctx = EvalCtx::new(&db, &calls, &settings);
        ctx.set_day(2);

        // Declared 60/20; the 20-pct sibling dropped out, so shares are
        // 60 and 20 renormalized over 80.
        let mut tree = group_tree();
        let outcomes = vec![
            outcome(&mut tree, "AAA", Some(60.0)),
            outcome(&mut tree, "BBB", Some(20.0)),
        ];
        let total = combine(&tree, &outcomes, &Weighting::Defined, &mut ctx);
        assert!((total.weight("AAA") - 0.75).abs() < 1e-12);
        assert!((total.weight("BBB") - 0.25).abs() < 1e-12);
    }

    #[test]
    fn defined_without_declarations_warns_and_splits_equally() {
        let db = db_of(&[("AAA", &[10.0; 5])]);
        let calls = CallTable::new();
        let settings = RunSettings::default();
        let mut ctx = EvalCtx::new(&db, &calls, &settings);
        ctx.set_day(2);

        let mut tree = group_tree();
        let outcomes = vec![
            outcome(&mut tree, "AAA", None),
            outcome(&mut tree, "BBB", None),
        ];
        let total = combine(&tree, &outcomes, &Weighting::Defined, &mut ctx);
        assert!((total.weight("AAA") - 0.5).abs() < 1e-12);
        assert_eq!(ctx.warnings.len(), 1);
    }

    #[test]
    fn inverse_volatility_favors_the_quiet_symbol() {
        let wild: Vec<f64> = (0..8)
            .map(|i| if i % 2 == 0 { 100.0 } else { 110.0 })
            .collect();
        let calm: Vec<f64> = (0..8)
            .map(|i| if i % 2 == 0 { 100.0 } else { 100.2 })
            .collect();
        let db = db_of(&[("WILD", &wild), ("CALM", &calm)]);
        let calls = CallTable::new();
        let settings = RunSettings::default();
        let mut ctx = EvalCtx::new(&db, &calls, &settings);
        ctx.set_day(7);

        let mut tree = group_tree();
        let outcomes = vec![
            outcome(&mut tree, "WILD", None),
            outcome(&mut tree, "CALM", None),
        ];
        let total = combine(
            &tree,
            &outcomes,
            &Weighting::InverseVolatility { window: 3 },
            &mut ctx,
        );
        assert!(total.weight("CALM") > 0.9, "calm leg dominates: {total:?}");
        assert!((total.total() - 1.0).abs() < 1e-9);

        let pro = combine(
            &tree,
            &outcomes,
            &Weighting::ProVolatility { window: 3 },
            &mut ctx,
        );
        assert!(pro.weight("WILD") > 0.9, "wild leg dominates: {pro:?}");
    }

    #[test]
    fn unscorable_child_keeps_equal_share() {
        let wild: Vec<f64> = (0..8)
            .map(|i| if i % 2 == 0 { 100.0 } else { 110.0 })
            .collect();
        let db = db_of(&[("WILD", &wild)]);
        let calls = CallTable::new();
        let settings = RunSettings::default();
        let mut ctx = EvalCtx::new(&db, &calls, &settings);
        ctx.set_day(7);

        let mut tree = group_tree();
        let outcomes = vec![
            outcome(&mut tree, "WILD", None),
            outcome(&mut tree, "GHOST", None), // not in the database
        ];
        let total = combine(
            &tree,
            &outcomes,
            &Weighting::InverseVolatility { window: 3 },
            &mut ctx,
        );
        assert!((total.weight("GHOST") - 0.5).abs() < 1e-12);
        assert!((total.weight("WILD") - 0.5).abs() < 1e-12);
        assert_eq!(ctx.warnings.len(), 1);
    }

    #[test]
    fn cap_routes_excess_to_fallback() {
        let db = db_of(&[("AAA", &[10.0; 5])]);
        let calls = CallTable::new();
        let settings = RunSettings::default();
        let mut ctx = EvalCtx::new(&db, &calls, &settings);
        ctx.set_day(2);

        let mut tree = group_tree();
        let outcomes = vec![
            outcome(&mut tree, "AAA", None),
            outcome(&mut tree, "BBB", None),
        ];
        let total = combine(
            &tree,
            &outcomes,
            &Weighting::CappedFallback {
                max_pct: 30.0,
                fallback: "BIL".to_string(),
            },
            &mut ctx,
        );
        assert!((total.weight("AAA") - 0.3).abs() < 1e-12);
        assert!((total.weight("BBB") - 0.3).abs() < 1e-12);
        assert!((total.weight("BIL") - 0.4).abs() < 1e-12);
        assert!((total.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn loose_cap_changes_nothing() {
        let db = db_of(&[("AAA", &[10.0; 5])]);
        let calls = CallTable::new();
        let settings = RunSettings::default();
        let mut ctx = EvalCtx::new(&db, &calls, &settings);
        ctx.set_day(2);

        let mut tree = group_tree();
        let outcomes = vec![
            outcome(&mut tree, "AAA", None),
            outcome(&mut tree, "BBB", None),
        ];
        let total = combine(
            &tree,
            &outcomes,
            &Weighting::CappedFallback {
                max_pct: 80.0,
                fallback: "BIL".to_string(),
            },
            &mut ctx,
        );
        assert!((total.weight("AAA") - 0.5).abs() < 1e-12);
        assert_eq!(total.weight("BIL"), 0.0);
    }

    #[test]
    fn representative_symbol_descends_and_follows_calls() {
        let sub = Strategy::with_root(NodeKind::single_position("GLD"));
        let mut calls = CallTable::new();
        calls.insert("defense", sub);

        let mut tree = group_tree();
        let gate = tree.add(NodeKind::Gate {
            conditions: Vec::new(),
            then_weighting: Weighting::Equal,
            else_weighting: Weighting::Equal,
            then_children: Vec::new(),
            else_children: Vec::new(),
        });
        let cash = tree.add(NodeKind::Position {
            entries: vec![PositionEntry::cash()],
        });
        let call = tree.add(NodeKind::Call {
            call_id: "defense".to_string(),
        });
        tree.attach(tree.root(), SlotName::Next, gate);
        tree.attach(gate, SlotName::Then, cash);
        tree.attach(gate, SlotName::Then, call);

        assert_eq!(
            representative_symbol(&tree, tree.root(), &calls),
            Some("GLD".to_string())
        );
    }
}
