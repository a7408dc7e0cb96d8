use crate::{NodeIdx, StrategyIdx};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::fmt::{Display, Formatter};

slotmap::new_key_type! {
    pub struct GroupId;
}

/// Identifies an operation of the program being sharded.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstructionId(pub u64);

impl Display for InstructionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// One candidate way of partitioning an operation's tensors across devices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShardingStrategy {
    pub name: String,
    pub compute_cost: f64,
    pub communication_cost: f64,
    pub memory_cost: f64,
    /// For each operand, the communication cost of resharding every
    /// strategy of the operand into the layout this strategy expects.
    ///
    /// A vector may carry extra leading entries; only the trailing
    /// window matching the operand's strategy count is meaningful.
    pub communication_resharding_costs: Vec<Vec<f64>>,
    /// Same layout as `communication_resharding_costs`, for memory.
    pub memory_resharding_costs: Vec<Vec<f64>>,
}

impl ShardingStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_communication_cost(mut self, cost: f64) -> Self {
        self.communication_cost = cost;
        self
    }

    /// Appends the resharding costs for the next operand.
    pub fn with_operand_costs(mut self, communication: Vec<f64>, memory: Vec<f64>) -> Self {
        self.communication_resharding_costs.push(communication);
        self.memory_resharding_costs.push(memory);
        self
    }
}

/// Strategies of an operation producing a single (non-tuple) value.
/// Each leaf is one node of the cost graph.
#[derive(Debug, Clone)]
pub struct LeafGroup {
    pub instruction_id: InstructionId,
    pub node_idx: NodeIdx,
    pub strategies: Vec<ShardingStrategy>,
    /// Operands, in operand order.
    pub in_nodes: Vec<GroupId>,
    /// Group whose strategy choice this group mirrors.
    pub following: Option<GroupId>,
}

impl LeafGroup {
    pub fn num_strategies(&self) -> usize {
        self.strategies.len()
    }

    pub fn strategy(&self, idx: StrategyIdx) -> &ShardingStrategy {
        &self.strategies[idx]
    }
}

/// Strategies of a tuple-producing operation, one child per element.
#[derive(Debug, Clone)]
pub struct TupleGroup {
    pub instruction_id: InstructionId,
    pub children: Vec<GroupId>,
}

#[derive(Debug, Clone)]
pub enum StrategyGroup {
    Leaf(LeafGroup),
    Tuple(TupleGroup),
}

impl StrategyGroup {
    pub fn is_tuple(&self) -> bool {
        matches!(self, StrategyGroup::Tuple(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafGroup> {
        match self {
            StrategyGroup::Leaf(leaf) => Some(leaf),
            StrategyGroup::Tuple(_) => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&TupleGroup> {
        match self {
            StrategyGroup::Leaf(_) => None,
            StrategyGroup::Tuple(tuple) => Some(tuple),
        }
    }
}

/// The candidate strategies of every operation, together with
/// the dependencies between them.
///
/// Leaf groups receive dense node indices in insertion order.
#[derive(Debug, Clone, Default)]
pub struct StrategyGraph {
    groups: SlotMap<GroupId, StrategyGroup>,
    leaves: Vec<GroupId>,
    instructions: IndexMap<InstructionId, GroupId, ahash::RandomState>,
}

impl StrategyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new leaf group, which becomes the next node.
    ///
    /// # Panics
    /// Panics if an operand does not exist in this graph.
    pub fn push_leaf(
        &mut self,
        instruction_id: InstructionId,
        strategies: Vec<ShardingStrategy>,
        in_nodes: Vec<GroupId>,
    ) -> GroupId {
        for operand in &in_nodes {
            assert!(self.groups.contains_key(*operand), "unknown operand");
        }
        let node_idx = self.leaves.len();
        let id = self.groups.insert(StrategyGroup::Leaf(LeafGroup {
            instruction_id,
            node_idx,
            strategies,
            in_nodes,
            following: None,
        }));
        self.leaves.push(id);
        self.instructions.entry(instruction_id).or_insert(id);
        id
    }

    /// Creates a tuple group from previously created element groups.
    ///
    /// The tuple replaces any element group registered for the
    /// same instruction.
    ///
    /// # Panics
    /// Panics if a child does not exist in this graph.
    pub fn push_tuple(&mut self, instruction_id: InstructionId, children: Vec<GroupId>) -> GroupId {
        for child in &children {
            assert!(self.groups.contains_key(*child), "unknown tuple element");
        }
        let id = self.groups.insert(StrategyGroup::Tuple(TupleGroup {
            instruction_id,
            children,
        }));
        self.instructions.insert(instruction_id, id);
        id
    }

    /// Declares that `group` mirrors the strategy choice of `target`.
    ///
    /// # Panics
    /// Panics if `group` is not a leaf or `target` does not exist.
    pub fn set_following(&mut self, group: GroupId, target: GroupId) {
        assert!(self.groups.contains_key(target), "unknown follow target");
        match &mut self.groups[group] {
            StrategyGroup::Leaf(leaf) => leaf.following = Some(target),
            StrategyGroup::Tuple(_) => panic!("only leaf groups can follow another group"),
        }
    }

    pub fn get(&self, id: GroupId) -> &StrategyGroup {
        &self.groups[id]
    }

    pub fn leaf(&self, id: GroupId) -> Option<&LeafGroup> {
        self.groups[id].as_leaf()
    }

    /// Returns the leaf group of the node with the given index.
    pub fn node(&self, node_idx: NodeIdx) -> &LeafGroup {
        match &self.groups[self.leaves[node_idx]] {
            StrategyGroup::Leaf(leaf) => leaf,
            StrategyGroup::Tuple(_) => unreachable!("leaves only index leaf groups"),
        }
    }

    /// Iterates over leaf groups in node-index order.
    pub fn leaves(&self) -> impl Iterator<Item = &LeafGroup> + '_ {
        (0..self.leaves.len()).map(move |idx| self.node(idx))
    }

    pub fn num_nodes(&self) -> usize {
        self.leaves.len()
    }

    pub fn group_for_instruction(&self, instruction_id: InstructionId) -> Option<GroupId> {
        self.instructions.get(&instruction_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_get_dense_indices() {
        let mut graph = StrategyGraph::new();
        let a = graph.push_leaf(InstructionId(10), vec![ShardingStrategy::new("R")], vec![]);
        let b = graph.push_leaf(InstructionId(11), vec![ShardingStrategy::new("R")], vec![a]);
        let t = graph.push_tuple(InstructionId(12), vec![a, b]);

        assert_eq!(graph.num_nodes(), 2);
        assert_eq!(graph.leaf(a).unwrap().node_idx, 0);
        assert_eq!(graph.leaf(b).unwrap().node_idx, 1);
        assert!(graph.get(t).is_tuple());
        assert_eq!(
            graph.leaves().map(|l| l.instruction_id).collect::<Vec<_>>(),
            vec![InstructionId(10), InstructionId(11)]
        );
    }

    #[test]
    fn tuple_replaces_element_registration() {
        let mut graph = StrategyGraph::new();
        let e0 = graph.push_leaf(InstructionId(3), vec![], vec![]);
        let e1 = graph.push_leaf(InstructionId(3), vec![], vec![]);
        assert_eq!(graph.group_for_instruction(InstructionId(3)), Some(e0));

        let t = graph.push_tuple(InstructionId(3), vec![e0, e1]);
        assert_eq!(graph.group_for_instruction(InstructionId(3)), Some(t));
    }

    #[test]
    #[should_panic(expected = "only leaf groups can follow")]
    fn tuples_cannot_follow() {
        let mut graph = StrategyGraph::new();
        let a = graph.push_leaf(InstructionId(0), vec![], vec![]);
        let t = graph.push_tuple(InstructionId(1), vec![a]);
        graph.set_following(t, a);
    }
}
