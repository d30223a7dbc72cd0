//! Call resolution.
//!
//! A tree can reference other trees by call id. Before a run the whole
//! reference closure is resolved into a [`CallTable`] so evaluation
//! never touches the source again, and the reference graph is checked
//! for cycles; a cycle would otherwise recurse forever at eval time.

use std::collections::BTreeMap;

use crate::error::{ValidationIssue, RUN_SCOPE};
use crate::strategy::{NodeKind, Strategy};

/// Where called trees come from: a directory of documents, a test map,
/// or nothing at all.
pub trait CallSource {
    fn resolve(&self, call_id: &str) -> Option<Strategy>;
}

/// Source with no trees; every call id is unknown.
pub struct NoCalls;

impl CallSource for NoCalls {
    fn resolve(&self, _call_id: &str) -> Option<Strategy> {
        None
    }
}

/// Map-backed source for tests and embedded strategies.
#[derive(Default)]
pub struct InMemoryCalls {
    trees: BTreeMap<String, Strategy>,
}

impl InMemoryCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, call_id: impl Into<String>, tree: Strategy) -> Self {
        self.trees.insert(call_id.into(), tree);
        self
    }
}

impl CallSource for InMemoryCalls {
    fn resolve(&self, call_id: &str) -> Option<Strategy> {
        self.trees.get(call_id).cloned()
    }
}

/// Resolved closure of called trees for one run, keyed by call id.
#[derive(Debug, Default)]
pub struct CallTable {
    trees: BTreeMap<String, Strategy>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, call_id: impl Into<String>, tree: Strategy) {
        self.trees.insert(call_id.into(), tree);
    }

    pub fn get(&self, call_id: &str) -> Option<&Strategy> {
        self.trees.get(call_id)
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Strategy)> {
        self.trees.iter()
    }

    /// Replace each resolved tree through `f`; the engine compresses
    /// them in place with this.
    pub fn map_trees<E>(
        self,
        mut f: impl FnMut(&str, Strategy) -> Result<Strategy, E>,
    ) -> Result<CallTable, E> {
        let mut out = CallTable::new();
        for (id, tree) in self.trees {
            let mapped = f(&id, tree)?;
            out.insert(id, mapped);
        }
        Ok(out)
    }
}

/// (referrer node id, call id) pairs for every reachable call node.
fn call_refs(tree: &Strategy) -> Vec<(String, String)> {
    tree.reachable()
        .into_iter()
        .filter_map(|id| {
            let node = tree.node(id);
            match &node.kind {
                NodeKind::Call { call_id } => Some((node.id.clone(), call_id.clone())),
                _ => None,
            }
        })
        .collect()
}

/// Resolve the closure of `root`'s call references and reject cycles.
/// All missing references are reported together.
pub fn resolve_calls(
    root: &Strategy,
    source: &dyn CallSource,
) -> Result<CallTable, Vec<ValidationIssue>> {
    let mut table = CallTable::new();
    let mut issues = Vec::new();
    // Edges of the reference graph; the root tree is the "" vertex.
    let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let mut queue: Vec<(String, Vec<(String, String)>)> =
        vec![(String::new(), call_refs(root))];
    while let Some((owner, refs)) = queue.pop() {
        for (referrer, call_id) in refs {
            edges.entry(owner.clone()).or_default().push(call_id.clone());
            if table.get(&call_id).is_some() {
                continue;
            }
            match source.resolve(&call_id) {
                Some(tree) => {
                    let nested = call_refs(&tree);
                    table.insert(call_id.clone(), tree);
                    queue.push((call_id, nested));
                }
                None => issues.push(ValidationIssue::new(
                    &referrer,
                    "call_id",
                    format!("references unknown tree {call_id:?}"),
                )),
            }
        }
    }

    if issues.is_empty() {
        if let Some(cycle) = find_cycle(&edges) {
            issues.push(ValidationIssue::new(
                RUN_SCOPE,
                "calls",
                format!("call cycle: {}", cycle.join(" -> ")),
            ));
        }
    }

    if issues.is_empty() {
        Ok(table)
    } else {
        Err(issues)
    }
}

/// First cycle in the reference graph, as the list of call ids along it
/// with the entry repeated at the end.
fn find_cycle(edges: &BTreeMap<String, Vec<String>>) -> Option<Vec<String>> {
    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    fn visit(
        vertex: &str,
        edges: &BTreeMap<String, Vec<String>>,
        state: &mut BTreeMap<String, u8>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        match state.get(vertex).copied().unwrap_or(WHITE) {
            GRAY => {
                let entry = path.iter().position(|v| v == vertex).unwrap_or(0);
                let mut cycle: Vec<String> = path[entry..].to_vec();
                cycle.push(vertex.to_string());
                return Some(cycle);
            }
            BLACK => return None,
            _ => {}
        }
        state.insert(vertex.to_string(), GRAY);
        path.push(vertex.to_string());
        if let Some(next) = edges.get(vertex) {
            for target in next {
                if let Some(cycle) = visit(target, edges, state, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        state.insert(vertex.to_string(), BLACK);
        None
    }

    let mut state = BTreeMap::new();
    let mut path = Vec::new();
    for vertex in edges.keys() {
        if let Some(cycle) = visit(vertex, edges, &mut state, &mut path) {
            return Some(cycle);
        }
    }
    None
}
