use crate::cost_graph::CostGraph;
use autoshard_ir::{
    NodeIdx, StrategyIdx, TupleIndex,
    strategy::{GroupId, InstructionId, LeafGroup, ShardingStrategy, StrategyGraph, StrategyGroup},
};

/// Maps the solver's choice of one strategy per node back
/// to the strategies of the program's operations.
#[derive(Debug, Clone, Copy)]
pub struct StrategyResolver<'a> {
    graph: &'a StrategyGraph,
    cost_graph: &'a CostGraph,
    assignment: &'a [StrategyIdx],
}

impl<'a> StrategyResolver<'a> {
    /// # Panics
    /// Panics if `assignment` does not have one entry per node.
    pub fn new(
        graph: &'a StrategyGraph,
        cost_graph: &'a CostGraph,
        assignment: &'a [StrategyIdx],
    ) -> Self {
        assert_eq!(graph.num_nodes(), cost_graph.num_nodes());
        assert_eq!(
            assignment.len(),
            cost_graph.num_nodes(),
            "expected one chosen strategy per node"
        );
        Self {
            graph,
            cost_graph,
            assignment,
        }
    }

    /// Strategy chosen for the node with the given index.
    pub fn node_strategy(&self, node_idx: NodeIdx) -> &'a ShardingStrategy {
        self.leaf_strategy(self.graph.node(node_idx))
    }

    /// Strategy chosen for an operation producing a single value.
    ///
    /// # Panics
    /// Panics if the instruction is unknown or produces a tuple.
    pub fn strategy(&self, instruction: InstructionId) -> &'a ShardingStrategy {
        match self.graph.get(self.group(instruction)) {
            StrategyGroup::Leaf(leaf) => self.leaf_strategy(leaf),
            StrategyGroup::Tuple(_) => panic!("instruction {instruction} produces a tuple"),
        }
    }

    /// Strategy chosen for one element of a tuple-producing operation.
    ///
    /// # Panics
    /// Panics if the instruction is unknown or does not produce a tuple,
    /// or if `index` does not lead to a non-tuple element.
    pub fn tuple_strategy(
        &self,
        instruction: InstructionId,
        index: &TupleIndex,
    ) -> &'a ShardingStrategy {
        let mut group = self.graph.get(self.group(instruction));
        assert!(group.is_tuple(), "instruction {instruction} does not produce a tuple");
        for &element in index.elements() {
            let Some(tuple) = group.as_tuple() else {
                panic!("tuple index {index} of instruction {instruction} is too deep");
            };
            assert!(
                element < tuple.children.len(),
                "tuple index {index} out of range for instruction {instruction}"
            );
            group = self.graph.get(tuple.children[element]);
        }
        match group {
            StrategyGroup::Leaf(leaf) => self.leaf_strategy(leaf),
            StrategyGroup::Tuple(_) => {
                panic!("tuple index {index} of instruction {instruction} names a tuple")
            }
        }
    }

    fn group(&self, instruction: InstructionId) -> GroupId {
        match self.graph.group_for_instruction(instruction) {
            Some(group) => group,
            None => panic!("unknown instruction {instruction}"),
        }
    }

    /// Merged nodes take the choice made for their final destination,
    /// translated into their own strategies. The assignment entry of a
    /// merged node itself is ignored.
    fn leaf_strategy(&self, leaf: &'a LeafGroup) -> &'a ShardingStrategy {
        let node_idx = leaf.node_idx;
        let destination = self.cost_graph.follow_idx()[node_idx].unwrap_or(node_idx);
        let strategy_idx = self
            .cost_graph
            .remap_index(node_idx, self.assignment[destination]);
        leaf.strategy(strategy_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostGraphConfig;

    /// `%0` produces a tuple of two values, consumed by `%1`.
    fn tuple_graph() -> (StrategyGraph, GroupId) {
        let mut graph = StrategyGraph::new();
        let e0 = graph.push_leaf(
            InstructionId(0),
            vec![ShardingStrategy::new("S0"), ShardingStrategy::new("R")],
            vec![],
        );
        let e1 = graph.push_leaf(
            InstructionId(0),
            vec![ShardingStrategy::new("S1"), ShardingStrategy::new("R")],
            vec![],
        );
        let tuple = graph.push_tuple(InstructionId(0), vec![e0, e1]);
        let consumer = graph.push_leaf(
            InstructionId(1),
            vec![
                ShardingStrategy::new("S0")
                    .with_operand_costs(vec![0.0, 1.0], vec![0.0, 0.0])
                    .with_operand_costs(vec![1.0, 1.0], vec![0.0, 0.0]),
            ],
            vec![tuple],
        );
        (graph, consumer)
    }

    #[test]
    fn resolves_leaf_and_tuple_elements() {
        let (graph, _) = tuple_graph();
        let cost_graph = CostGraph::build(&graph, &[], &CostGraphConfig::default()).unwrap();
        let assignment = [0, 1, 0];
        let resolver = StrategyResolver::new(&graph, &cost_graph, &assignment);

        assert_eq!(resolver.strategy(InstructionId(1)).name, "S0");
        assert_eq!(resolver.tuple_strategy(InstructionId(0), &[0].into()).name, "S0");
        assert_eq!(resolver.tuple_strategy(InstructionId(0), &[1].into()).name, "R");
        assert_eq!(resolver.node_strategy(1).name, "R");
    }

    #[test]
    fn resolves_through_merged_nodes() {
        let (mut graph, consumer) = tuple_graph();
        let follower = graph.push_leaf(
            InstructionId(2),
            vec![ShardingStrategy::new("S0").with_operand_costs(vec![3.0], vec![0.0])],
            vec![consumer],
        );
        graph.set_following(follower, consumer);

        let cost_graph = CostGraph::build(&graph, &[], &CostGraphConfig::default()).unwrap();
        assert_eq!(cost_graph.follow_idx()[3], Some(2));

        // The follower's own entry is ignored in favor of its destination.
        let assignment = [0, 0, 0, 7];
        let resolver = StrategyResolver::new(&graph, &cost_graph, &assignment);
        assert_eq!(resolver.strategy(InstructionId(2)).name, "S0");
    }

    /// `%0` produces `(a, (b0, b1))`.
    fn nested_tuple_graph() -> StrategyGraph {
        let mut graph = StrategyGraph::new();
        let a = graph.push_leaf(InstructionId(0), vec![ShardingStrategy::new("A0")], vec![]);
        let b0 = graph.push_leaf(InstructionId(0), vec![ShardingStrategy::new("B0")], vec![]);
        let b1 = graph.push_leaf(
            InstructionId(0),
            vec![ShardingStrategy::new("B0"), ShardingStrategy::new("B1")],
            vec![],
        );
        let inner = graph.push_tuple(InstructionId(0), vec![b0, b1]);
        graph.push_tuple(InstructionId(0), vec![a, inner]);
        graph
    }

    #[test]
    fn resolves_nested_tuple_elements() {
        let graph = nested_tuple_graph();
        let cost_graph = CostGraph::build(&graph, &[], &CostGraphConfig::default()).unwrap();
        let assignment = [0, 0, 1];
        let resolver = StrategyResolver::new(&graph, &cost_graph, &assignment);

        assert_eq!(resolver.tuple_strategy(InstructionId(0), &[0].into()).name, "A0");
        assert_eq!(resolver.tuple_strategy(InstructionId(0), &[1, 0].into()).name, "B0");
        assert_eq!(resolver.tuple_strategy(InstructionId(0), &[1, 1].into()).name, "B1");
    }

    #[test]
    #[should_panic(expected = "names a tuple")]
    fn tuple_index_stopping_at_tuple_panics() {
        let graph = nested_tuple_graph();
        let cost_graph = CostGraph::build(&graph, &[], &CostGraphConfig::default()).unwrap();
        let assignment = [0, 0, 0];
        StrategyResolver::new(&graph, &cost_graph, &assignment)
            .tuple_strategy(InstructionId(0), &[1].into());
    }

    #[test]
    #[should_panic(expected = "is too deep")]
    fn tuple_index_past_leaf_panics() {
        let graph = nested_tuple_graph();
        let cost_graph = CostGraph::build(&graph, &[], &CostGraphConfig::default()).unwrap();
        let assignment = [0, 0, 0];
        StrategyResolver::new(&graph, &cost_graph, &assignment)
            .tuple_strategy(InstructionId(0), &[0, 0].into());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn tuple_index_out_of_range() {
        let (graph, _) = tuple_graph();
        let cost_graph = CostGraph::build(&graph, &[], &CostGraphConfig::default()).unwrap();
        let assignment = [0, 0, 0];
        StrategyResolver::new(&graph, &cost_graph, &assignment)
            .tuple_strategy(InstructionId(0), &[2].into());
    }

    #[test]
    #[should_panic(expected = "produces a tuple")]
    fn leaf_lookup_of_tuple_panics() {
        let (graph, _) = tuple_graph();
        let cost_graph = CostGraph::build(&graph, &[], &CostGraphConfig::default()).unwrap();
        let assignment = [0, 0, 0];
        StrategyResolver::new(&graph, &cost_graph, &assignment).strategy(InstructionId(0));
    }
}
