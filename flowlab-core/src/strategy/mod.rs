//! Strategy trees: node kinds, condition lines, and the JSON document
//! form.

pub mod condition;
pub mod node;
pub mod schema;

pub use condition::{clauses, has_or, Comparator, ConditionLine, Connector, IndicatorExpr, Operand};
pub use node::{
    FlowNode, NodeId, NodeKind, PositionEntry, Quantifier, RankDirection, SlotName, Strategy,
    Weighting,
};
pub use schema::{parse, to_json, to_spec, NodeSpec, SchemaError};
