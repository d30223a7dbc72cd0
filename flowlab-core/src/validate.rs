//! Pre-flight validation.
//!
//! Structural checks run on every tree in the run (root and called)
//! before any data is fetched, and window checks run once the date axis
//! is known. Everything is collected into `ValidationIssue` lists; the
//! engine refuses to start while any exist. Warnings, by contrast, are
//! a run-time concern and never produced here.

use std::collections::BTreeSet;

use crate::error::ValidationIssue;
use crate::resolver::CallTable;
use crate::strategy::condition::{ConditionLine, Connector, Operand};
use crate::strategy::node::{NodeKind, Quantifier, Strategy, Weighting};

/// Symbols a run touches, split by role. Indicator symbols constrain
/// the shared date axis; position-only symbols may enter later with
/// shorter history.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickerSets {
    pub indicator: BTreeSet<String>,
    pub position: BTreeSet<String>,
}

impl TickerSets {
    /// Union of both roles, for the batched fetch.
    pub fn all(&self) -> BTreeSet<String> {
        self.indicator.union(&self.position).cloned().collect()
    }
}

/// Collect the symbols referenced by the root tree and every called
/// tree. Condition operands are indicator symbols; position entries and
/// capped-weighting fallbacks are position symbols. Ranking and
/// volatility weightings score position symbols in place, so they add
/// nothing to the indicator side.
pub fn collect_tickers(root: &Strategy, calls: &CallTable) -> TickerSets {
    let mut sets = TickerSets::default();
    collect_from(root, &mut sets);
    for (_, tree) in calls.iter() {
        collect_from(tree, &mut sets);
    }
    sets
}

fn collect_from(tree: &Strategy, sets: &mut TickerSets) {
    for id in tree.reachable() {
        match &tree.node(id).kind {
            NodeKind::Position { entries } => {
                for entry in entries {
                    if let Some(symbol) = &entry.symbol {
                        if !symbol.is_empty() {
                            sets.position.insert(symbol.clone());
                        }
                    }
                }
            }
            NodeKind::Gate { conditions, .. } => {
                collect_lines(conditions, sets);
            }
            NodeKind::Numbered { groups, .. } => {
                for group in groups {
                    collect_lines(group, sets);
                }
            }
            _ => {}
        }
        for weighting in weightings_of(&tree.node(id).kind) {
            if let Weighting::CappedFallback { fallback, .. } = weighting {
                if !fallback.is_empty() {
                    sets.position.insert(fallback.clone());
                }
            }
        }
    }
}

fn collect_lines(lines: &[ConditionLine], sets: &mut TickerSets) {
    for line in lines {
        sets.indicator.insert(line.left.symbol.clone());
        if let Operand::Expr(expr) = &line.right {
            sets.indicator.insert(expr.symbol.clone());
        }
    }
}

// ─── Structural checks ──────────────────────────────────────────────

/// Shape checks that need no price data.
pub fn validate_tree(tree: &Strategy) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for id in tree.reachable() {
        let node = tree.node(id);
        let ext = &node.id;
        if let Some(pct) = node.weight_pct {
            if !(0.0..=100.0).contains(&pct) {
                issues.push(ValidationIssue::new(
                    ext,
                    "weight_pct",
                    format!("declared weight {pct} is outside 0..100"),
                ));
            }
        }
        match &node.kind {
            NodeKind::Gate { conditions, .. } => {
                check_lines(ext, "conditions", conditions, &mut issues);
            }
            NodeKind::Numbered {
                groups, quantifier, ..
            } => {
                if groups.is_empty() {
                    issues.push(ValidationIssue::new(ext, "groups", "no condition groups"));
                }
                for (i, group) in groups.iter().enumerate() {
                    check_lines(ext, &format!("groups[{i}]"), group, &mut issues);
                }
                let m = groups.len();
                let unsatisfiable = match quantifier {
                    Quantifier::Exactly { k } | Quantifier::AtLeast { k } => *k > m,
                    _ => false,
                };
                if unsatisfiable {
                    issues.push(ValidationIssue::new(
                        ext,
                        "quantifier",
                        format!("requires more groups than the {m} present"),
                    ));
                }
            }
            NodeKind::Ranking {
                window,
                take,
                metric,
                children,
                ..
            } => {
                let candidates = children.iter().flatten().count();
                if candidates > 0 {
                    if *take == 0 {
                        issues.push(ValidationIssue::new(ext, "take", "take must be at least 1"));
                    } else if *take > candidates {
                        issues.push(ValidationIssue::new(
                            ext,
                            "take",
                            format!("take {take} exceeds the {candidates} candidates"),
                        ));
                    }
                }
                if metric.uses_window() && *window == 0 {
                    issues.push(ValidationIssue::new(ext, "window", "window must be at least 1"));
                }
            }
            NodeKind::Position { entries } => {
                if entries.is_empty() {
                    issues.push(ValidationIssue::new(ext, "entries", "position has no entries"));
                }
                let declared = entries.iter().filter(|e| e.weight_pct.is_some()).count();
                if declared != 0 && declared != entries.len() {
                    issues.push(ValidationIssue::new(
                        ext,
                        "entries",
                        "mix of declared and undeclared entry weights",
                    ));
                }
                for entry in entries {
                    if matches!(entry.symbol.as_deref(), Some("")) {
                        issues.push(ValidationIssue::new(ext, "entries", "empty symbol"));
                    }
                    if let Some(pct) = entry.weight_pct {
                        if !(0.0..=100.0).contains(&pct) {
                            issues.push(ValidationIssue::new(
                                ext,
                                "entries",
                                format!("entry weight {pct} is outside 0..100"),
                            ));
                        }
                    }
                }
            }
            NodeKind::Call { call_id } => {
                if call_id.is_empty() {
                    issues.push(ValidationIssue::new(ext, "call_id", "empty call id"));
                }
            }
            NodeKind::Group { .. } => {}
        }
        for weighting in weightings_of(&node.kind) {
            check_weighting(ext, weighting, &mut issues);
        }
    }
    issues
}

fn weightings_of(kind: &NodeKind) -> Vec<&Weighting> {
    match kind {
        NodeKind::Group { weighting, .. } | NodeKind::Ranking { weighting, .. } => vec![weighting],
        NodeKind::Gate {
            then_weighting,
            else_weighting,
            ..
        }
        | NodeKind::Numbered {
            then_weighting,
            else_weighting,
            ..
        } => vec![then_weighting, else_weighting],
        NodeKind::Position { .. } | NodeKind::Call { .. } => Vec::new(),
    }
}

fn check_weighting(ext: &str, weighting: &Weighting, issues: &mut Vec<ValidationIssue>) {
    match weighting {
        Weighting::InverseVolatility { window } | Weighting::ProVolatility { window } => {
            if *window == 0 {
                issues.push(ValidationIssue::new(
                    ext,
                    "weighting",
                    "volatility window must be at least 1",
                ));
            }
        }
        Weighting::CappedFallback { max_pct, fallback } => {
            if !(*max_pct > 0.0 && *max_pct <= 100.0) {
                issues.push(ValidationIssue::new(
                    ext,
                    "weighting",
                    format!("cap {max_pct} is outside (0, 100]"),
                ));
            }
            if fallback.is_empty() {
                issues.push(ValidationIssue::new(ext, "weighting", "empty fallback symbol"));
            }
        }
        _ => {}
    }
}

fn check_lines(
    ext: &str,
    field: &str,
    lines: &[ConditionLine],
    issues: &mut Vec<ValidationIssue>,
) {
    if lines.is_empty() {
        issues.push(ValidationIssue::new(ext, field, "condition list is empty"));
        return;
    }
    if lines[0].connector != Connector::If {
        issues.push(ValidationIssue::new(ext, field, "first line must open with IF"));
    }
    for (i, line) in lines.iter().enumerate() {
        if i > 0 && line.connector == Connector::If {
            issues.push(ValidationIssue::new(
                ext,
                field,
                format!("line {i} reopens with IF; use AND or OR"),
            ));
        }
        if line.streak == 0 {
            issues.push(ValidationIssue::new(
                ext,
                field,
                format!("line {i}: streak must be at least 1"),
            ));
        }
        for expr in line_exprs(line) {
            if expr.metric.uses_window() && expr.window == 0 {
                issues.push(ValidationIssue::new(
                    ext,
                    field,
                    format!("line {i}: window must be at least 1"),
                ));
            }
            if expr.symbol.is_empty() {
                issues.push(ValidationIssue::new(ext, field, format!("line {i}: empty symbol")));
            }
        }
    }
}

fn line_exprs(line: &ConditionLine) -> Vec<&crate::strategy::condition::IndicatorExpr> {
    let mut exprs = vec![&line.left];
    if let Operand::Expr(expr) = &line.right {
        exprs.push(expr);
    }
    exprs
}

// ─── Window checks ──────────────────────────────────────────────────

/// Checks that need the axis length: every window must leave at least
/// one evaluable day. Cross comparators read one extra day back, and a
/// streak of `s` needs `s` consecutive defined days.
pub fn validate_windows(tree: &Strategy, axis_len: usize) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for id in tree.reachable() {
        let node = tree.node(id);
        let ext = &node.id;
        match &node.kind {
            NodeKind::Gate { conditions, .. } => {
                check_line_windows(ext, "conditions", conditions, axis_len, &mut issues);
            }
            NodeKind::Numbered { groups, .. } => {
                for (i, group) in groups.iter().enumerate() {
                    check_line_windows(ext, &format!("groups[{i}]"), group, axis_len, &mut issues);
                }
            }
            NodeKind::Ranking { metric, window, .. } => {
                let need = metric.min_history(*window);
                if need > axis_len {
                    issues.push(ValidationIssue::new(
                        ext,
                        "window",
                        format!("needs {need} days of history, axis has {axis_len}"),
                    ));
                }
            }
            _ => {}
        }
        for weighting in weightings_of(&node.kind) {
            if let Weighting::InverseVolatility { window } | Weighting::ProVolatility { window } =
                weighting
            {
                let need = window + 1;
                if need > axis_len {
                    issues.push(ValidationIssue::new(
                        ext,
                        "weighting",
                        format!("needs {need} days of history, axis has {axis_len}"),
                    ));
                }
            }
        }
    }
    issues
}

fn check_line_windows(
    ext: &str,
    field: &str,
    lines: &[ConditionLine],
    axis_len: usize,
    issues: &mut Vec<ValidationIssue>,
) {
    for (i, line) in lines.iter().enumerate() {
        for expr in line_exprs(line) {
            let mut need = expr.metric.min_history(expr.window);
            if line.comparator.is_cross() {
                need += 1;
            }
            need += line.streak.saturating_sub(1);
            if need > axis_len {
                issues.push(ValidationIssue::new(
                    ext,
                    field,
                    format!(
                        "line {i}: {} needs {need} days of history, axis has {axis_len}",
                        expr
                    ),
                ));
            }
        }
    }
}
