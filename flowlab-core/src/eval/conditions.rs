//! Condition evaluation against the indicator cache.
//!
//! Lines evaluate at the indicator index (the decision index minus the
//! convention's lag). A line whose inputs are unavailable degrades to
//! false with a warning rather than poisoning the whole list, so a
//! short-history symbol turns its branch off instead of aborting the
//! run.

use crate::strategy::condition::{clauses, Comparator, ConditionLine, Operand};

use super::EvalCtx;

/// Three-valued line outcome. `Unavailable` means an input had no
/// defined value at the requested index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    True,
    False,
    Unavailable,
}

/// Evaluate a full line list: OR over AND-groups, with `Or` starting a
/// new group. Unavailable lines count as false after warning.
pub fn eval_lines(lines: &[ConditionLine], ctx: &mut EvalCtx) -> bool {
    for clause in clauses(lines) {
        let mut all_true = true;
        for line in clause {
            match eval_line(line, ctx) {
                Outcome::True => {}
                Outcome::False => {
                    all_true = false;
                    break;
                }
                Outcome::Unavailable => {
                    ctx.warn(format!("condition {line} unavailable; treated as false"));
                    all_true = false;
                    break;
                }
            }
        }
        if all_true && !clause.is_empty() {
            return true;
        }
    }
    false
}

/// One line, honoring its streak: the comparison must hold on every one
/// of the `streak` consecutive days ending at the indicator index.
pub fn eval_line(line: &ConditionLine, ctx: &mut EvalCtx) -> Outcome {
    let at = ctx.indicator_index();
    for offset in 0..line.streak.max(1) {
        let Some(index) = at.checked_sub(offset) else {
            return Outcome::Unavailable;
        };
        match compare_at(line, ctx, index) {
            Outcome::True => {}
            other => return other,
        }
    }
    Outcome::True
}

fn compare_at(line: &ConditionLine, ctx: &mut EvalCtx, index: usize) -> Outcome {
    let Some(left) = ctx.value_expr(&line.left, index) else {
        return Outcome::Unavailable;
    };
    let Some(right) = operand_value(&line.right, ctx, index) else {
        return Outcome::Unavailable;
    };
    match line.comparator {
        Comparator::LessThan => bool_outcome(left < right),
        Comparator::GreaterThan => bool_outcome(left > right),
        Comparator::CrossesBelow | Comparator::CrossesAbove => {
            let Some(prev_index) = index.checked_sub(1) else {
                return Outcome::Unavailable;
            };
            let Some(prev_left) = ctx.value_expr(&line.left, prev_index) else {
                return Outcome::Unavailable;
            };
            let Some(prev_right) = operand_value(&line.right, ctx, prev_index) else {
                return Outcome::Unavailable;
            };
            match line.comparator {
                Comparator::CrossesBelow => {
                    bool_outcome(prev_left >= prev_right && left < right)
                }
                _ => bool_outcome(prev_left <= prev_right && left > right),
            }
        }
    }
}

fn operand_value(operand: &Operand, ctx: &mut EvalCtx, index: usize) -> Option<f64> {
    match operand {
        Operand::Value(v) => Some(*v),
        Operand::Expr(expr) => ctx.value_expr(expr, index),
    }
}

fn bool_outcome(b: bool) -> Outcome {
    if b {
        Outcome::True
    } else {
        Outcome::False
    }
}
