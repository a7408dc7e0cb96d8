use crate::{cost_graph::CostGraph, error::Result};
use autoshard_ir::{Matrix, NodeIdx};
use serde::Serialize;

/// Coefficients handed to the strategy solver: one variable per node,
/// with a cost term per node and per edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverProblem {
    pub node_lens: Vec<usize>,
    /// Final destination of merged nodes, which need no variable of their own.
    pub follow_idx: Vec<Option<NodeIdx>>,
    pub extra_node_costs: Vec<Vec<f64>>,
    pub edges: Vec<SolverEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverEdge {
    pub src: NodeIdx,
    pub dst: NodeIdx,
    pub communication: Matrix,
    pub memory: Matrix,
}

impl SolverProblem {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl CostGraph {
    pub fn solver_problem(&self) -> SolverProblem {
        SolverProblem {
            node_lens: self.node_lens().to_vec(),
            follow_idx: self.follow_idx().to_vec(),
            extra_node_costs: (0..self.num_nodes())
                .map(|node| self.extra_node_cost(node).to_vec())
                .collect(),
            edges: self
                .edges()
                .map(|(src, dst, costs)| SolverEdge {
                    src,
                    dst,
                    communication: costs.communication.clone(),
                    memory: costs.memory.clone(),
                })
                .collect(),
        }
    }
}
