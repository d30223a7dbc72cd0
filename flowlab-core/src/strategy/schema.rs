//! Strategy JSON: one nested object per node, a `"kind"` tag, and named
//! slot arrays (`"next"`, `"then"`, `"else"`) whose entries are child
//! objects or `null` placeholders. Parsing normalizes into the arena
//! form; serialization is its inverse.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::condition::ConditionLine;
use super::node::{
    FlowNode, NodeId, NodeKind, PositionEntry, Quantifier, RankDirection, Strategy, Weighting,
};
use crate::indicators::Metric;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid strategy json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate node id {0:?}")]
    DuplicateId(String),
}

/// One node as it appears in the document. `id` is optional on input
/// and assigned from the arena index when missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_pct: Option<f64>,
    #[serde(flatten)]
    pub kind: KindSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KindSpec {
    Group {
        #[serde(default)]
        weighting: Weighting,
        #[serde(default)]
        next: Vec<Option<NodeSpec>>,
    },
    Gate {
        conditions: Vec<ConditionLine>,
        #[serde(default)]
        then_weighting: Weighting,
        #[serde(default)]
        else_weighting: Weighting,
        #[serde(default)]
        then: Vec<Option<NodeSpec>>,
        #[serde(default, rename = "else")]
        else_children: Vec<Option<NodeSpec>>,
    },
    Numbered {
        groups: Vec<Vec<ConditionLine>>,
        quantifier: Quantifier,
        #[serde(default)]
        then_weighting: Weighting,
        #[serde(default)]
        else_weighting: Weighting,
        #[serde(default)]
        then: Vec<Option<NodeSpec>>,
        #[serde(default, rename = "else")]
        else_children: Vec<Option<NodeSpec>>,
    },
    Ranking {
        metric: Metric,
        window: usize,
        direction: RankDirection,
        take: usize,
        #[serde(default)]
        weighting: Weighting,
        #[serde(default)]
        next: Vec<Option<NodeSpec>>,
    },
    Position {
        entries: Vec<PositionEntry>,
    },
    Call {
        call_id: String,
    },
}

/// Parse a strategy document into arena form.
pub fn parse(json: &str) -> Result<Strategy, SchemaError> {
    let spec: NodeSpec = serde_json::from_str(json)?;
    let mut nodes = Vec::new();
    let mut used = BTreeSet::new();
    let root = build(spec, &mut nodes, &mut used)?;
    Ok(Strategy::from_parts(nodes, root))
}

/// Serialize back to the document form.
pub fn to_json(strategy: &Strategy) -> Result<String, SchemaError> {
    Ok(serde_json::to_string_pretty(&to_spec(strategy))?)
}

/// Nested spec for the reachable tree. A node shared by several parents
/// (after deduplication) expands into copies; only the first copy keeps
/// the explicit id, so the document parses back cleanly.
pub fn to_spec(strategy: &Strategy) -> NodeSpec {
    let mut emitted = BTreeSet::new();
    spec_of(strategy, strategy.root(), &mut emitted)
}

fn build(
    spec: NodeSpec,
    nodes: &mut Vec<FlowNode>,
    used: &mut BTreeSet<String>,
) -> Result<NodeId, SchemaError> {
    let NodeSpec {
        id,
        weight_pct,
        kind,
    } = spec;
    let kind = match kind {
        KindSpec::Group { weighting, next } => NodeKind::Group {
            weighting,
            children: build_slot(next, nodes, used)?,
        },
        KindSpec::Gate {
            conditions,
            then_weighting,
            else_weighting,
            then,
            else_children,
        } => NodeKind::Gate {
            conditions,
            then_weighting,
            else_weighting,
            then_children: build_slot(then, nodes, used)?,
            else_children: build_slot(else_children, nodes, used)?,
        },
        KindSpec::Numbered {
            groups,
            quantifier,
            then_weighting,
            else_weighting,
            then,
            else_children,
        } => NodeKind::Numbered {
            groups,
            quantifier,
            then_weighting,
            else_weighting,
            then_children: build_slot(then, nodes, used)?,
            else_children: build_slot(else_children, nodes, used)?,
        },
        KindSpec::Ranking {
            metric,
            window,
            direction,
            take,
            weighting,
            next,
        } => NodeKind::Ranking {
            metric,
            window,
            direction,
            take,
            weighting,
            children: build_slot(next, nodes, used)?,
        },
        KindSpec::Position { entries } => NodeKind::Position { entries },
        KindSpec::Call { call_id } => NodeKind::Call { call_id },
    };

    let node_id = NodeId::new(nodes.len());
    let ext_id = id.unwrap_or_else(|| format!("n{}", nodes.len()));
    if !used.insert(ext_id.clone()) {
        return Err(SchemaError::DuplicateId(ext_id));
    }
    nodes.push(FlowNode {
        id: ext_id,
        weight_pct,
        kind,
    });
    Ok(node_id)
}

fn build_slot(
    entries: Vec<Option<NodeSpec>>,
    nodes: &mut Vec<FlowNode>,
    used: &mut BTreeSet<String>,
) -> Result<Vec<Option<NodeId>>, SchemaError> {
    entries
        .into_iter()
        .map(|entry| entry.map(|spec| build(spec, nodes, used)).transpose())
        .collect()
}

fn spec_of(strategy: &Strategy, id: NodeId, emitted: &mut BTreeSet<NodeId>) -> NodeSpec {
    let node = strategy.node(id);
    let slot = |children: &[Option<NodeId>], emitted: &mut BTreeSet<NodeId>| {
        children
            .iter()
            .map(|entry| entry.map(|child| spec_of(strategy, child, emitted)))
            .collect::<Vec<_>>()
    };
    let kind = match &node.kind {
        NodeKind::Group {
            weighting,
            children,
        } => KindSpec::Group {
            weighting: weighting.clone(),
            next: slot(children, emitted),
        },
        NodeKind::Gate {
            conditions,
            then_weighting,
            else_weighting,
            then_children,
            else_children,
        } => KindSpec::Gate {
            conditions: conditions.clone(),
            then_weighting: then_weighting.clone(),
            else_weighting: else_weighting.clone(),
            then: slot(then_children, emitted),
            else_children: slot(else_children, emitted),
        },
        NodeKind::Numbered {
            groups,
            quantifier,
            then_weighting,
            else_weighting,
            then_children,
            else_children,
        } => KindSpec::Numbered {
            groups: groups.clone(),
            quantifier: *quantifier,
            then_weighting: then_weighting.clone(),
            else_weighting: else_weighting.clone(),
            then: slot(then_children, emitted),
            else_children: slot(else_children, emitted),
        },
        NodeKind::Ranking {
            metric,
            window,
            direction,
            take,
            weighting,
            children,
        } => KindSpec::Ranking {
            metric: *metric,
            window: *window,
            direction: *direction,
            take: *take,
            weighting: weighting.clone(),
            next: slot(children, emitted),
        },
        NodeKind::Position { entries } => KindSpec::Position {
            entries: entries.clone(),
        },
        NodeKind::Call { call_id } => KindSpec::Call {
            call_id: call_id.clone(),
        },
    };
    let first_visit = emitted.insert(id);
    NodeSpec {
        id: first_visit.then(|| node.id.clone()),
        weight_pct: node.weight_pct,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::condition::{Comparator, Connector};
    use crate::strategy::node::SlotName;

    const GATE_DOC: &str = r#"{
        "id": "root",
        "kind": "GATE",
        "conditions": [{
            "connector": "IF",
            "left": {"metric": "RSI", "window": 14, "symbol": "QQQ"},
            "comparator": "LESS_THAN",
            "right": 30.0
        }],
        "then": [{"kind": "POSITION", "entries": [{"symbol": "TQQQ"}]}],
        "else": [null, {"kind": "POSITION", "entries": [{"symbol": null}]}]
    }"#;

    #[test]
    fn parse_gate_document() {
        let s = parse(GATE_DOC).unwrap();
        let root = s.node(s.root());
        assert_eq!(root.id, "root");
        match &root.kind {
            NodeKind::Gate {
                conditions,
                then_children,
                else_children,
                ..
            } => {
                assert_eq!(conditions.len(), 1);
                assert_eq!(conditions[0].connector, Connector::If);
                assert_eq!(conditions[0].comparator, Comparator::LessThan);
                assert_eq!(then_children.len(), 1);
                assert_eq!(else_children.len(), 2);
                assert!(else_children[0].is_none(), "null keeps its slot");
                let cash = else_children[1].unwrap();
                match &s.node(cash).kind {
                    NodeKind::Position { entries } => assert!(entries[0].is_cash()),
                    other => panic!("expected position, got {}", other.kind_name()),
                }
            }
            other => panic!("expected gate, got {}", other.kind_name()),
        }
    }

    #[test]
    fn missing_ids_get_arena_numbers() {
        let s = parse(r#"{"kind": "POSITION", "entries": [{"symbol": "SPY"}]}"#).unwrap();
        assert_eq!(s.node(s.root()).id, "n0");
    }

    #[test]
    fn duplicate_ids_rejected() {
        let doc = r#"{
            "id": "a", "kind": "GROUP",
            "next": [{"id": "a", "kind": "POSITION", "entries": [{"symbol": "SPY"}]}]
        }"#;
        match parse(doc) {
            Err(SchemaError::DuplicateId(id)) => assert_eq!(id, "a"),
            other => panic!("expected duplicate id error, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_structurally() {
        let s = parse(GATE_DOC).unwrap();
        let json = to_json(&s).unwrap();
        let again = parse(&json).unwrap();
        assert_eq!(s, again);
    }

    #[test]
    fn shared_node_expands_with_one_explicit_id() {
        let mut s = Strategy::with_root(NodeKind::Group {
            weighting: Weighting::Equal,
            children: Vec::new(),
        });
        let shared = s.add_with_id("leaf", NodeKind::single_position("SPY"));
        s.attach(s.root(), SlotName::Next, shared);
        s.attach(s.root(), SlotName::Next, shared);

        let json = to_json(&s).unwrap();
        let again = parse(&json).unwrap();
        // Two copies in the document; both parse, only one keeps "leaf".
        assert_eq!(again.len(), 3);
        let named: Vec<_> = again.iter().filter(|(_, n)| n.id == "leaf").collect();
        assert_eq!(named.len(), 1);
    }

    #[test]
    fn unknown_kind_is_a_json_error() {
        let err = parse(r#"{"kind": "WORMHOLE"}"#).unwrap_err();
        assert!(matches!(err, SchemaError::Json(_)));
    }
}
