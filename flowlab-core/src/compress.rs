//! Tree compression.
//!
//! Four semantics-preserving passes before a run: prune subtrees that
//! can never produce a holding, merge chained single-child gates into
//! one AND list, collapse pass-through groups, and deduplicate
//! structurally identical subtrees into shared nodes. A tree that
//! prunes down to nothing is a validation error, not a silent no-op.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ValidationIssue;
use crate::strategy::condition::{has_or, Connector};
use crate::strategy::node::{FlowNode, NodeId, NodeKind, Strategy, Weighting};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressStats {
    pub original_nodes: usize,
    pub compressed_nodes: usize,
    /// Child links dropped by pruning, placeholders included.
    pub pruned: usize,
    pub merged_gates: usize,
    pub collapsed_groups: usize,
    pub deduplicated: usize,
    pub elapsed_ms: f64,
}

impl CompressStats {
    /// Fold stats from a called tree into the run total.
    pub fn absorb(&mut self, other: &CompressStats) {
        self.original_nodes += other.original_nodes;
        self.compressed_nodes += other.compressed_nodes;
        self.pruned += other.pruned;
        self.merged_gates += other.merged_gates;
        self.collapsed_groups += other.collapsed_groups;
        self.deduplicated += other.deduplicated;
        self.elapsed_ms += other.elapsed_ms;
    }
}

/// Run all passes. The result allocates identically to the input on
/// every day; only the shape is smaller.
pub fn compress(strategy: &Strategy) -> Result<(Strategy, CompressStats), ValidationIssue> {
    let started = Instant::now();
    let mut tree = strategy.clone();
    let mut stats = CompressStats {
        original_nodes: tree.reachable().len(),
        ..CompressStats::default()
    };

    prune(&mut tree, &mut stats)?;

    // Collapse and merge feed each other: a merge can leave a
    // single-child group, a collapse can expose a gate chain.
    loop {
        let changed = collapse_groups(&mut tree, &mut stats) | merge_one_gate(&mut tree, &mut stats);
        if !changed {
            break;
        }
    }

    dedup(&mut tree, &mut stats);
    let tree = garbage_collect(&tree);
    stats.compressed_nodes = tree.reachable().len();
    stats.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    Ok((tree, stats))
}

/// Hex digest of the reachable tree's structure: kinds, conditions,
/// parameters, declared weights, and child order. External ids do not
/// participate, so renaming nodes keeps the digest stable.
pub fn structural_hash(strategy: &Strategy) -> String {
    let mut memo = HashMap::new();
    subtree_hash(strategy, strategy.root(), &mut memo)
}

// ─── Prune ──────────────────────────────────────────────────────────

/// A node is meaningful when some reachable position entry names a
/// symbol, or a call sits below it (calls are opaque here).
fn mark_meaningful(strategy: &Strategy) -> Vec<bool> {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    fn visit(s: &Strategy, id: NodeId, state: &mut [u8], value: &mut [bool]) -> bool {
        let i = id.index();
        match state[i] {
            GRAY => return false,
            BLACK => return value[i],
            _ => {}
        }
        state[i] = GRAY;
        let meaningful = match &s.node(id).kind {
            NodeKind::Position { entries } => entries.iter().any(|e| !e.is_cash()),
            NodeKind::Call { .. } => true,
            kind => kind
                .child_ids()
                .into_iter()
                .any(|c| visit(s, c, state, value)),
        };
        state[i] = BLACK;
        value[i] = meaningful;
        meaningful
    }

    let mut state = vec![WHITE; strategy.len()];
    let mut value = vec![false; strategy.len()];
    visit(strategy, strategy.root(), &mut state, &mut value);
    value
}

fn prune(tree: &mut Strategy, stats: &mut CompressStats) -> Result<(), ValidationIssue> {
    let meaningful = mark_meaningful(tree);
    if !meaningful[tree.root().index()] {
        let root = tree.node(tree.root());
        return Err(ValidationIssue::new(
            &root.id,
            "children",
            "strategy compresses to nothing: no position or call survives pruning",
        ));
    }
    let mut dropped = 0usize;
    for id in tree.reachable() {
        for (_, slot) in tree.node_mut(id).kind.slots_mut() {
            let before = slot.len();
            slot.retain(|entry| matches!(entry, Some(c) if meaningful[c.index()]));
            dropped += before - slot.len();
        }
    }
    stats.pruned = dropped;
    Ok(())
}

// ─── Collapse ───────────────────────────────────────────────────────

/// Replace every single-child group with its child, whole chains at a
/// time. Capped weighting is exempt: it can route weight to the
/// fallback symbol even with one child. The chain's final child takes
/// over the outermost group's declared weight share.
fn collapse_groups(tree: &mut Strategy, stats: &mut CompressStats) -> bool {
    let mut redirect: HashMap<NodeId, NodeId> = HashMap::new();
    for id in tree.reachable() {
        if let NodeKind::Group {
            weighting,
            children,
        } = &tree.node(id).kind
        {
            if matches!(weighting, Weighting::CappedFallback { .. }) {
                continue;
            }
            let present: Vec<NodeId> = children.iter().flatten().copied().collect();
            if present.len() == 1 && present[0] != id {
                redirect.insert(id, present[0]);
            }
        }
    }
    if redirect.is_empty() {
        return false;
    }

    let hop_limit = redirect.len() + 1;
    let resolve = |start: NodeId| {
        let mut id = start;
        let mut hops = 0usize;
        while let Some(&next) = redirect.get(&id) {
            id = next;
            hops += 1;
            if hops > hop_limit {
                break;
            }
        }
        id
    };

    // The outermost group of each chain is the one a parent still
    // references; its declared share lands on the chain's final child.
    let targets: HashSet<NodeId> = redirect.values().copied().collect();
    for &head in redirect.keys().filter(|g| !targets.contains(g)) {
        let pct = tree.node(head).weight_pct;
        let landing = resolve(head);
        tree.node_mut(landing).weight_pct = pct;
    }

    rewrite_links(tree, resolve);
    stats.collapsed_groups += redirect.len();
    true
}

// ─── Merge ──────────────────────────────────────────────────────────

/// Fold one `gate A -> then: [gate B]` pair into a single gate testing
/// A AND B. Requires empty else branches on both and pure AND lists,
/// since an OR clause would regroup under concatenation. One merge per
/// call; the fixpoint loop drives chains.
fn merge_one_gate(tree: &mut Strategy, stats: &mut CompressStats) -> bool {
    let Some((outer, inner)) = tree
        .reachable()
        .into_iter()
        .find_map(|id| mergeable_inner(tree, id).map(|inner| (id, inner)))
    else {
        return false;
    };

    let NodeKind::Gate {
        conditions: inner_conditions,
        then_weighting: inner_then_weighting,
        then_children: inner_then,
        ..
    } = tree.node(inner).kind.clone()
    else {
        return false;
    };
    let NodeKind::Gate {
        conditions,
        then_weighting,
        then_children,
        ..
    } = &mut tree.node_mut(outer).kind
    else {
        return false;
    };
    let mut appended = inner_conditions;
    if let Some(first) = appended.first_mut() {
        first.connector = Connector::And;
    }
    conditions.extend(appended);
    *then_weighting = inner_then_weighting;
    *then_children = inner_then;
    stats.merged_gates += 1;
    true
}

fn mergeable_inner(tree: &Strategy, id: NodeId) -> Option<NodeId> {
    let NodeKind::Gate {
        conditions,
        then_weighting,
        then_children,
        else_children,
        ..
    } = &tree.node(id).kind
    else {
        return None;
    };
    if has_or(conditions) || !else_children.is_empty() {
        return None;
    }
    if matches!(then_weighting, Weighting::CappedFallback { .. }) {
        return None;
    }
    let present: Vec<NodeId> = then_children.iter().flatten().copied().collect();
    if present.len() != 1 {
        return None;
    }
    let inner = present[0];
    let NodeKind::Gate {
        conditions: inner_conditions,
        else_children: inner_else,
        ..
    } = &tree.node(inner).kind
    else {
        return None;
    };
    if has_or(inner_conditions) || !inner_else.is_empty() {
        return None;
    }
    Some(inner)
}

// ─── Dedup ──────────────────────────────────────────────────────────

/// Point every occurrence of a repeated subtree at its first copy,
/// turning the tree into a DAG.
fn dedup(tree: &mut Strategy, stats: &mut CompressStats) {
    let mut memo = HashMap::new();
    let mut canonical: HashMap<String, NodeId> = HashMap::new();
    for id in tree.reachable() {
        let hash = subtree_hash(tree, id, &mut memo);
        canonical.entry(hash).or_insert(id);
    }

    let mut replaced = 0usize;
    for id in tree.reachable() {
        let mut kind = tree.node(id).kind.clone();
        let mut changed = false;
        for (_, slot) in kind.slots_mut() {
            for entry in slot.iter_mut() {
                if let Some(child) = entry {
                    let hash = subtree_hash(tree, *child, &mut memo);
                    let target = canonical[&hash];
                    if target != *child {
                        *entry = Some(target);
                        changed = true;
                        replaced += 1;
                    }
                }
            }
        }
        if changed {
            tree.node_mut(id).kind = kind;
        }
    }
    stats.deduplicated = replaced;
}

fn subtree_hash(strategy: &Strategy, id: NodeId, memo: &mut HashMap<NodeId, String>) -> String {
    if let Some(hash) = memo.get(&id) {
        return hash.clone();
    }
    let node = strategy.node(id);
    let child_hashes: Vec<serde_json::Value> = node
        .kind
        .slots()
        .iter()
        .flat_map(|(_, slot)| slot.iter())
        .map(|entry| match entry {
            Some(child) => json!(subtree_hash(strategy, *child, memo)),
            None => serde_json::Value::Null,
        })
        .collect();
    let body = match &node.kind {
        NodeKind::Group { weighting, .. } => json!({ "weighting": weighting }),
        NodeKind::Gate {
            conditions,
            then_weighting,
            else_weighting,
            then_children,
            ..
        } => json!({
            "conditions": conditions,
            "then_weighting": then_weighting,
            "else_weighting": else_weighting,
            "then_len": then_children.len(),
        }),
        NodeKind::Numbered {
            groups,
            quantifier,
            then_weighting,
            else_weighting,
            then_children,
            ..
        } => json!({
            "groups": groups,
            "quantifier": quantifier,
            "then_weighting": then_weighting,
            "else_weighting": else_weighting,
            "then_len": then_children.len(),
        }),
        NodeKind::Ranking {
            metric,
            window,
            direction,
            take,
            weighting,
            ..
        } => json!({
            "metric": metric,
            "window": window,
            "direction": direction,
            "take": take,
            "weighting": weighting,
        }),
        NodeKind::Position { entries } => json!({ "entries": entries }),
        NodeKind::Call { call_id } => json!({ "call_id": call_id }),
    };
    let doc = json!({
        "kind": node.kind.kind_name(),
        "weight_pct": node.weight_pct,
        "body": body,
        "children": child_hashes,
    });
    let hash = blake3::hash(doc.to_string().as_bytes()).to_hex().to_string();
    memo.insert(id, hash.clone());
    hash
}

// ─── Rebuild ────────────────────────────────────────────────────────

fn rewrite_links(tree: &mut Strategy, map: impl Fn(NodeId) -> NodeId) {
    for id in tree.reachable() {
        let mut kind = tree.node(id).kind.clone();
        let mut changed = false;
        for (_, slot) in kind.slots_mut() {
            for entry in slot.iter_mut() {
                if let Some(child) = entry {
                    let target = map(*child);
                    if target != *child {
                        *entry = Some(target);
                        changed = true;
                    }
                }
            }
        }
        if changed {
            tree.node_mut(id).kind = kind;
        }
    }
    let new_root = map(tree.root());
    if new_root != tree.root() {
        let nodes: Vec<FlowNode> = tree.iter().map(|(_, n)| n.clone()).collect();
        *tree = Strategy::from_parts(nodes, new_root);
    }
}

/// Drop unreachable nodes and renumber, preorder.
fn garbage_collect(tree: &Strategy) -> Strategy {
    let order = tree.reachable();
    let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
    for (new_index, old) in order.iter().enumerate() {
        remap.insert(*old, NodeId::new(new_index));
    }
    let mut nodes = Vec::with_capacity(order.len());
    for old in &order {
        let mut node = tree.node(*old).clone();
        for (_, slot) in node.kind.slots_mut() {
            for entry in slot.iter_mut() {
                if let Some(child) = entry {
                    *entry = Some(remap[child]);
                }
            }
        }
        nodes.push(node);
    }
    Strategy::from_parts(nodes, remap[&tree.root()])
}
