//! FlowLab Core — conditional-tree strategy backtesting.
//!
//! The crate turns a strategy tree (gates, groups, numbered condition
//! blocks, rankings, position leaves, and calls into shared subtrees)
//! into a daily allocation stream and scores it:
//! - Tree model with a JSON schema, validation, and structural compression
//! - 48 price and volume indicators behind a per-run cache
//! - Day loop with four execution conventions and turnover costs
//! - Bar sources (CSV, in-memory, synthetic) aligned onto a shared axis
//! - Report with equity curves, a monthly table, and summary statistics

pub mod allocation;
pub mod compress;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod eval;
pub mod indicators;
pub mod metrics;
pub mod report;
pub mod resolver;
pub mod strategy;
pub mod validate;
