//! Cost graph for choosing one sharding strategy per operation.
//!
//! A [`CostGraph`] is built from a [`StrategyGraph`]: every node is an
//! operation with a fixed list of candidate strategies, and every edge
//! carries the resharding costs between the strategies of its endpoints.
//! Before the graph is handed to a solver, nodes that follow another node
//! are contracted into it. The solver's answer is mapped back to concrete
//! strategies with a [`StrategyResolver`].

pub mod config;
pub mod cost_graph;
pub mod error;
mod follow;
pub mod problem;
pub mod resolver;

#[doc(inline)]
pub use self::{
    config::CostGraphConfig,
    cost_graph::{CostGraph, EdgeCosts},
    error::{Error, Result},
    problem::SolverProblem,
    resolver::StrategyResolver,
};
#[doc(inline)]
pub use autoshard_ir::{
    Matrix, NodeIdx, StrategyIdx, TupleIndex,
    strategy::{GroupId, InstructionId, ShardingStrategy, StrategyGraph, StrategyGroup},
};
