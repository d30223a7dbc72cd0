//! Arena-backed strategy tree.
//!
//! Nodes live in a flat `Vec` inside [`Strategy`] and refer to children
//! through [`NodeId`] handles, so shared subtrees (after deduplication)
//! are plain repeated ids rather than reference-counted pointers. Child
//! lists hold `Option<NodeId>`: a `None` entry is an empty editor slot
//! that evaluation and compression skip over.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::condition::ConditionLine;
use crate::indicators::Metric;

/// Handle into a [`Strategy`] arena. Only valid for the arena that
/// issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which child list of a node a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotName {
    Next,
    Then,
    Else,
}

impl SlotName {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotName::Next => "next",
            SlotName::Then => "then",
            SlotName::Else => "else",
        }
    }
}

/// How a branch distributes its inherited weight across active children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Weighting {
    #[default]
    Equal,
    /// Children declare `weight_pct`; the shares renormalize over the
    /// active ones.
    Defined,
    /// Weight inversely proportional to trailing volatility.
    InverseVolatility {
        #[serde(default = "default_vol_window")]
        window: usize,
    },
    /// Weight proportional to trailing volatility.
    ProVolatility {
        #[serde(default = "default_vol_window")]
        window: usize,
    },
    /// Equal split capped per child at `max_pct` percent; the excess
    /// goes to the fallback symbol.
    CappedFallback { max_pct: f64, fallback: String },
}

fn default_vol_window() -> usize {
    21
}

/// How many of a numbered node's groups must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quantifier {
    Any,
    All,
    None,
    Exactly { k: usize },
    AtLeast { k: usize },
    AtMost { k: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankDirection {
    Top,
    Bottom,
}

/// One holding in a position leaf. `symbol: None` is cash: the entry
/// keeps its share of the split but contributes nothing to the
/// allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PositionEntry {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub weight_pct: Option<f64>,
}

impl PositionEntry {
    pub fn ticker(symbol: impl Into<String>) -> Self {
        PositionEntry {
            symbol: Some(symbol.into()),
            weight_pct: None,
        }
    }

    pub fn cash() -> Self {
        PositionEntry::default()
    }

    pub fn is_cash(&self) -> bool {
        self.symbol.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Plain container: splits weight over whatever its children produce.
    Group {
        weighting: Weighting,
        children: Vec<Option<NodeId>>,
    },
    /// If/else on one condition list.
    Gate {
        conditions: Vec<ConditionLine>,
        then_weighting: Weighting,
        else_weighting: Weighting,
        then_children: Vec<Option<NodeId>>,
        else_children: Vec<Option<NodeId>>,
    },
    /// If/else on how many of several numbered condition groups hold.
    Numbered {
        groups: Vec<Vec<ConditionLine>>,
        quantifier: Quantifier,
        then_weighting: Weighting,
        else_weighting: Weighting,
        then_children: Vec<Option<NodeId>>,
        else_children: Vec<Option<NodeId>>,
    },
    /// Scores each child by a metric and keeps the best `take`.
    Ranking {
        metric: Metric,
        window: usize,
        direction: RankDirection,
        take: usize,
        weighting: Weighting,
        children: Vec<Option<NodeId>>,
    },
    /// Leaf holdings.
    Position { entries: Vec<PositionEntry> },
    /// Reference to another tree resolved at run start.
    Call { call_id: String },
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Group { .. } => "group",
            NodeKind::Gate { .. } => "gate",
            NodeKind::Numbered { .. } => "numbered",
            NodeKind::Ranking { .. } => "ranking",
            NodeKind::Position { .. } => "position",
            NodeKind::Call { .. } => "call",
        }
    }

    /// Leaf shorthand used all over the tests.
    pub fn single_position(symbol: impl Into<String>) -> NodeKind {
        NodeKind::Position {
            entries: vec![PositionEntry::ticker(symbol)],
        }
    }

    /// Child lists in evaluation order.
    pub fn slots(&self) -> Vec<(SlotName, &[Option<NodeId>])> {
        match self {
            NodeKind::Group { children, .. } | NodeKind::Ranking { children, .. } => {
                vec![(SlotName::Next, children)]
            }
            NodeKind::Gate {
                then_children,
                else_children,
                ..
            }
            | NodeKind::Numbered {
                then_children,
                else_children,
                ..
            } => vec![
                (SlotName::Then, then_children),
                (SlotName::Else, else_children),
            ],
            NodeKind::Position { .. } | NodeKind::Call { .. } => Vec::new(),
        }
    }

    pub fn slots_mut(&mut self) -> Vec<(SlotName, &mut Vec<Option<NodeId>>)> {
        match self {
            NodeKind::Group { children, .. } | NodeKind::Ranking { children, .. } => {
                vec![(SlotName::Next, children)]
            }
            NodeKind::Gate {
                then_children,
                else_children,
                ..
            }
            | NodeKind::Numbered {
                then_children,
                else_children,
                ..
            } => vec![
                (SlotName::Then, then_children),
                (SlotName::Else, else_children),
            ],
            NodeKind::Position { .. } | NodeKind::Call { .. } => Vec::new(),
        }
    }

    /// Present children across all slots, placeholders skipped.
    pub fn child_ids(&self) -> Vec<NodeId> {
        self.slots()
            .iter()
            .flat_map(|(_, slot)| slot.iter().flatten().copied())
            .collect()
    }
}

/// One tree node: a user-facing id for diagnostics, the weight share it
/// declares toward a `Defined` parent, and its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub weight_pct: Option<f64>,
    pub kind: NodeKind,
}

/// The whole tree. After deduplication this is a DAG; traversals track
/// visited ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    nodes: Vec<FlowNode>,
    root: NodeId,
}

impl Strategy {
    /// New arena whose root is `kind`, with the auto id `n0`.
    pub fn with_root(kind: NodeKind) -> Strategy {
        Strategy {
            nodes: vec![FlowNode {
                id: "n0".to_string(),
                weight_pct: None,
                kind,
            }],
            root: NodeId(0),
        }
    }

    pub fn from_parts(nodes: Vec<FlowNode>, root: NodeId) -> Strategy {
        debug_assert!(root.index() < nodes.len());
        Strategy { nodes, root }
    }

    /// Add a detached node with an auto id (`n{index}`).
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = format!("n{}", self.nodes.len());
        self.add_with_id(id, kind)
    }

    pub fn add_with_id(&mut self, id: impl Into<String>, kind: NodeKind) -> NodeId {
        let node_id = NodeId::new(self.nodes.len());
        self.nodes.push(FlowNode {
            id: id.into(),
            weight_pct: None,
            kind,
        });
        node_id
    }

    /// Append `child` to the named slot list of `parent`.
    ///
    /// Panics when the parent has no such slot; builders own that
    /// invariant.
    pub fn attach(&mut self, parent: NodeId, slot: SlotName, child: NodeId) {
        self.push_slot(parent, slot, Some(child));
    }

    /// Append an empty placeholder slot.
    pub fn attach_placeholder(&mut self, parent: NodeId, slot: SlotName) {
        self.push_slot(parent, slot, None);
    }

    fn push_slot(&mut self, parent: NodeId, slot: SlotName, entry: Option<NodeId>) {
        let kind_name = self.node(parent).kind.kind_name();
        for (name, list) in self.node_mut(parent).kind.slots_mut() {
            if name == slot {
                list.push(entry);
                return;
            }
        }
        panic!("{kind_name} node has no {} slot", slot.as_str());
    }

    pub fn set_weight_pct(&mut self, id: NodeId, pct: f64) {
        self.node_mut(id).weight_pct = Some(pct);
    }

    pub fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut FlowNode {
        &mut self.nodes[id.index()]
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Arena size, detached nodes included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &FlowNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i), n))
    }

    /// Preorder ids reachable from the root, each visited once even when
    /// deduplication made it shared.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if seen[id.index()] {
                continue;
            }
            seen[id.index()] = true;
            order.push(id);
            let children = self.node(id).kind.child_ids();
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}
