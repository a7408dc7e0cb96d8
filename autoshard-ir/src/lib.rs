//! Core data types describing candidate sharding strategies
//! that are independent of the cost graph and the solver
//! that consume them.

pub mod matrix;
pub mod strategy;
pub mod tuple_index;

pub use self::{matrix::Matrix, tuple_index::TupleIndex};

/// Dense index of a node in the cost graph.
pub type NodeIdx = usize;
/// Index of a strategy, local to a single node.
pub type StrategyIdx = usize;
