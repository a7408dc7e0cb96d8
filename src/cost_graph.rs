use crate::{
    config::CostGraphConfig,
    error::{Error, Result},
    follow::FollowForest,
};
use ahash::AHashMap;
use autoshard_ir::{
    Matrix, NodeIdx, StrategyIdx,
    strategy::{GroupId, LeafGroup, ShardingStrategy, StrategyGraph, StrategyGroup},
};
use std::{
    borrow::Cow,
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, btree_map::Entry},
    fmt::{Display, Formatter},
    mem,
};

/// Communication and memory costs of one edge, shaped
/// `[strategies(i) x strategies(j)]` for the edge `(i, j)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCosts {
    pub communication: Matrix,
    pub memory: Matrix,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum CostKind {
    Communication,
    Memory,
}

impl CostKind {
    fn resharding_costs(self, strategy: &ShardingStrategy) -> &[Vec<f64>] {
        match self {
            CostKind::Communication => &strategy.communication_resharding_costs,
            CostKind::Memory => &strategy.memory_resharding_costs,
        }
    }

    fn select(self, costs: &EdgeCosts) -> &Matrix {
        match self {
            CostKind::Communication => &costs.communication,
            CostKind::Memory => &costs.memory,
        }
    }
}

/// Graph of resharding costs between the nodes of a `StrategyGraph`,
/// simplified by contracting nodes that follow another node.
///
/// Edges are stored once, under their smaller endpoint.
#[derive(Debug, Clone)]
pub struct CostGraph {
    /// Number of strategies of each node.
    node_lens: Vec<usize>,
    adjacency: Vec<BTreeSet<NodeIdx>>,
    /// `edge_costs[i][j]` holds the costs of edge `(i, j)` for `i < j`.
    edge_costs: Vec<BTreeMap<NodeIdx, EdgeCosts>>,
    /// Per-strategy costs folded into a node by merging neighbors into it.
    extra_node_costs: Vec<Vec<f64>>,
    follow: FollowForest,
    /// Final destination of each merged node.
    follow_idx: Vec<Option<NodeIdx>>,
    to_merge_pairs: Vec<(NodeIdx, NodeIdx)>,
}

impl CostGraph {
    /// Creates a graph without edges.
    pub fn with_node_lens(node_lens: Vec<usize>) -> Self {
        let num_nodes = node_lens.len();
        Self {
            adjacency: vec![BTreeSet::new(); num_nodes],
            edge_costs: vec![BTreeMap::new(); num_nodes],
            extra_node_costs: node_lens.iter().map(|&len| vec![0.0; len]).collect(),
            follow: FollowForest::new(num_nodes),
            follow_idx: vec![None; num_nodes],
            to_merge_pairs: Vec::new(),
            node_lens,
        }
    }

    /// Builds the graph and simplifies it if enabled by `config`.
    pub fn build(
        graph: &StrategyGraph,
        associative_pairs: &[(GroupId, GroupId)],
        config: &CostGraphConfig,
    ) -> Result<Self> {
        let mut cost_graph = Self::new(graph, associative_pairs, config)?;
        cost_graph.simplify(config.simplify);
        Ok(cost_graph)
    }

    /// Builds the edges of every node from the resharding costs of its
    /// strategies, then rewards matching strategies of associative pairs.
    ///
    /// # Panics
    /// Panics if the communication costs of two matching strategies of
    /// an associative pair differ by more than the configured tolerance.
    #[profiling::function]
    pub fn new(
        graph: &StrategyGraph,
        associative_pairs: &[(GroupId, GroupId)],
        config: &CostGraphConfig,
    ) -> Result<Self> {
        let mut cost_graph = Self::with_node_lens(
            graph.leaves().map(LeafGroup::num_strategies).collect(),
        );

        for leaf in graph.leaves() {
            for (i, &operand) in leaf.in_nodes.iter().enumerate() {
                match graph.get(operand) {
                    StrategyGroup::Leaf(src) => {
                        let costs = cost_graph.create_edge_costs(src.node_idx, i, leaf)?;
                        cost_graph.add_edge_cost(src.node_idx, leaf.node_idx, costs);
                    }
                    StrategyGroup::Tuple(tuple) if leaf.in_nodes.len() > 1 => {
                        // Only the adjacency matters here; elements of a tuple
                        // operand among other operands carry no resharding cost.
                        for &child in &tuple.children {
                            let src_idx = expect_leaf(graph, child)?.node_idx;
                            let costs = EdgeCosts {
                                communication: cost_graph.zero_matrix(src_idx, leaf.node_idx),
                                memory: cost_graph.zero_matrix(src_idx, leaf.node_idx),
                            };
                            cost_graph.add_edge_cost(src_idx, leaf.node_idx, costs);
                        }
                    }
                    StrategyGroup::Tuple(tuple) => {
                        // Sole tuple operand: resharding costs are listed per element.
                        for (l, &child) in tuple.children.iter().enumerate() {
                            let src_idx = expect_leaf(graph, child)?.node_idx;
                            let costs = cost_graph.create_edge_costs(src_idx, l, leaf)?;
                            cost_graph.add_edge_cost(src_idx, leaf.node_idx, costs);
                        }
                    }
                }
            }

            if let Some(following) = leaf.following {
                let target = expect_leaf(graph, following)?;
                if target.num_strategies() == leaf.num_strategies() {
                    cost_graph
                        .to_merge_pairs
                        .push((leaf.node_idx, target.node_idx));
                } else {
                    tracing::warn!(
                        instruction = %leaf.instruction_id,
                        following = %target.instruction_id,
                        "different strategy counts, not merging follower"
                    );
                }
            }
        }

        for &(first, second) in associative_pairs {
            let src = expect_leaf(graph, first)?;
            let dst = expect_leaf(graph, second)?;
            cost_graph.reward_associative_pair(src, dst, config.associative_cost_tolerance);
        }

        Ok(cost_graph)
    }

    fn create_edge_costs(
        &self,
        src_idx: NodeIdx,
        operand: usize,
        dst: &LeafGroup,
    ) -> Result<EdgeCosts> {
        Ok(EdgeCosts {
            communication: self.create_edge_cost(src_idx, operand, dst, CostKind::Communication)?,
            memory: self.create_edge_cost(src_idx, operand, dst, CostKind::Memory)?,
        })
    }

    /// Arranges the resharding costs of `dst`'s strategies for one operand
    /// into a `[strategies(src) x strategies(dst)]` matrix.
    fn create_edge_cost(
        &self,
        src_idx: NodeIdx,
        operand: usize,
        dst: &LeafGroup,
        kind: CostKind,
    ) -> Result<Matrix> {
        let src_len = self.node_lens[src_idx];
        let mut matrix = self.zero_matrix(src_idx, dst.node_idx);
        for (k, strategy) in dst.strategies.iter().enumerate() {
            let costs = kind.resharding_costs(strategy).get(operand).ok_or(
                Error::MissingReshardingCosts {
                    instruction: dst.instruction_id,
                    operand,
                },
            )?;
            // Leading entries beyond the source's strategy count are not ours.
            let start = costs.len().saturating_sub(src_len);
            for (j, &cost) in costs[start..].iter().enumerate() {
                matrix[(j, k)] = cost;
            }
        }
        Ok(matrix)
    }

    fn zero_matrix(&self, i: NodeIdx, j: NodeIdx) -> Matrix {
        Matrix::new(self.node_lens[i], self.node_lens[j])
    }

    /// Makes choosing the same strategy for both nodes of an associative
    /// pair free, since a later pass can fuse their communication.
    fn reward_associative_pair(&mut self, src: &LeafGroup, dst: &LeafGroup, tolerance: f64) {
        assert_ne!(
            src.node_idx, dst.node_idx,
            "associative pair ({}, {}) pairs a node with itself",
            src.instruction_id, dst.instruction_id,
        );
        let src_strategies: AHashMap<&str, StrategyIdx> = src
            .strategies
            .iter()
            .enumerate()
            .filter(|(_, strategy)| strategy.communication_cost > 0.0)
            .map(|(j, strategy)| (strategy.name.as_str(), j))
            .collect();

        let mut communication = self.zero_matrix(src.node_idx, dst.node_idx);
        for (i, dst_strategy) in dst.strategies.iter().enumerate() {
            if dst_strategy.communication_cost <= 0.0 {
                continue;
            }
            let Some(&j) = src_strategies.get(dst_strategy.name.as_str()) else {
                continue;
            };
            let src_cost = src.strategies[j].communication_cost;
            assert!(
                (src_cost - dst_strategy.communication_cost).abs() <= tolerance,
                "communication costs of strategy {:?} differ between {} ({src_cost}) and {} ({})",
                dst_strategy.name,
                src.instruction_id,
                dst.instruction_id,
                dst_strategy.communication_cost,
            );
            communication[(j, i)] = -src_cost;
        }

        let memory = self.zero_matrix(src.node_idx, dst.node_idx);
        self.add_edge_cost(
            src.node_idx,
            dst.node_idx,
            EdgeCosts {
                communication,
                memory,
            },
        );
    }

    pub fn num_nodes(&self) -> usize {
        self.node_lens.len()
    }

    pub fn node_lens(&self) -> &[usize] {
        &self.node_lens
    }

    pub fn extra_node_cost(&self, node: NodeIdx) -> &[f64] {
        &self.extra_node_costs[node]
    }

    pub fn neighbors(&self, node: NodeIdx) -> impl Iterator<Item = NodeIdx> + '_ {
        self.adjacency[node].iter().copied()
    }

    pub fn has_edge(&self, i: NodeIdx, j: NodeIdx) -> bool {
        self.adjacency[i].contains(&j)
    }

    /// Iterates over edges as `(i, j, costs)` with `i < j`, in ascending order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeIdx, NodeIdx, &EdgeCosts)> + '_ {
        self.edge_costs
            .iter()
            .enumerate()
            .flat_map(|(i, costs)| costs.iter().map(move |(&j, costs)| (i, j, costs)))
    }

    /// Pairs queued for contraction by `simplify`.
    pub fn pending_merges(&self) -> &[(NodeIdx, NodeIdx)] {
        &self.to_merge_pairs
    }

    /// Communication cost matrix of edge `(i, j)`,
    /// shaped `[strategies(i) x strategies(j)]`.
    ///
    /// # Panics
    /// Panics if there is no such edge.
    pub fn communication_cost(&self, i: NodeIdx, j: NodeIdx) -> Cow<'_, Matrix> {
        self.edge_cost(i, j, CostKind::Communication)
    }

    /// Memory cost matrix of edge `(i, j)`,
    /// shaped `[strategies(i) x strategies(j)]`.
    ///
    /// # Panics
    /// Panics if there is no such edge.
    pub fn memory_cost(&self, i: NodeIdx, j: NodeIdx) -> Cow<'_, Matrix> {
        self.edge_cost(i, j, CostKind::Memory)
    }

    fn edge_cost(&self, i: NodeIdx, j: NodeIdx, kind: CostKind) -> Cow<'_, Matrix> {
        let (lo, hi) = (i.min(j), i.max(j));
        let Some(costs) = self.edge_costs[lo].get(&hi) else {
            panic!("no edge between nodes {i} and {j}");
        };
        let matrix = kind.select(costs);
        if i <= j {
            Cow::Borrowed(matrix)
        } else {
            Cow::Owned(matrix.transpose())
        }
    }

    /// Adds `costs`, shaped `[strategies(i) x strategies(j)]`, to the
    /// edge `(i, j)`, creating the edge if needed.
    ///
    /// # Panics
    /// Panics if `i == j`, if the matrices have the wrong shape, or if
    /// the adjacency and the stored edges disagree.
    pub fn add_edge_cost(&mut self, i: NodeIdx, j: NodeIdx, costs: EdgeCosts) {
        assert_ne!(i, j, "edge endpoints must differ");
        let (i, j, costs) = if i > j {
            (
                j,
                i,
                EdgeCosts {
                    communication: costs.communication.transpose(),
                    memory: costs.memory.transpose(),
                },
            )
        } else {
            (i, j, costs)
        };

        let shape = (self.node_lens[i], self.node_lens[j]);
        assert_eq!((costs.communication.rows(), costs.communication.cols()), shape);
        assert_eq!((costs.memory.rows(), costs.memory.cols()), shape);

        match self.edge_costs[i].entry(j) {
            Entry::Occupied(mut entry) => {
                assert!(
                    self.adjacency[i].contains(&j) && self.adjacency[j].contains(&i),
                    "edge ({i}, {j}) is missing from the adjacency"
                );
                let existing = entry.get_mut();
                existing.communication += &costs.communication;
                existing.memory += &costs.memory;
            }
            Entry::Vacant(entry) => {
                entry.insert(costs);
                self.adjacency[i].insert(j);
                self.adjacency[j].insert(i);
                tracing::trace!(i, j, "created edge");
            }
        }
    }

    /// # Panics
    /// Panics if the edge does not exist.
    pub fn remove_edge(&mut self, i: NodeIdx, j: NodeIdx) {
        let (i, j) = (i.min(j), i.max(j));
        assert!(
            self.adjacency[i].remove(&j) && self.adjacency[j].remove(&i),
            "edge ({i}, {j}) is missing from the adjacency"
        );
        assert!(
            self.edge_costs[i].remove(&j).is_some(),
            "edge ({i}, {j}) has no costs"
        );
    }

    /// Contracts `src` into `dst`, its neighbor.
    ///
    /// The cost of the edge between them becomes an extra node cost of
    /// `dst`, and every other edge of `src` is moved to `dst` with its
    /// rows reindexed to `dst`'s strategies.
    ///
    /// When both nodes have the same number of strategies, the i-th strategy
    /// of `src` is assumed to follow the i-th strategy of `dst`; this is how
    /// following strategies are generated. Otherwise every strategy of `dst`
    /// is paired with the cheapest strategy of `src`, preferring the highest
    /// index on ties since the last strategy is the replicated one.
    ///
    /// # Panics
    /// Panics if the nodes are not adjacent, are equal, or either has
    /// already been merged.
    pub fn merge_node(&mut self, src: NodeIdx, dst: NodeIdx) {
        assert_ne!(src, dst, "cannot merge node {src} into itself");
        assert!(
            self.has_edge(src, dst) && self.has_edge(dst, src),
            "cannot merge node {src} into non-adjacent node {dst}"
        );
        assert!(!self.follow.is_merged(src), "node {src} is already merged");
        assert!(!self.follow.is_merged(dst), "node {dst} is already merged");

        let edge_cost = self.communication_cost(dst, src).into_owned();
        let reindexing: Vec<StrategyIdx> = if self.node_lens[dst] == self.node_lens[src] {
            (0..self.node_lens[dst]).collect()
        } else {
            greedy_reindexing(&edge_cost)
        };

        let neighbors: Vec<NodeIdx> = self.neighbors(src).collect();
        for &adj in &neighbors {
            if adj == dst {
                for (i, &j) in reindexing.iter().enumerate() {
                    self.extra_node_costs[dst][i] += edge_cost[(i, j)];
                }
            } else {
                let costs = EdgeCosts {
                    communication: reindex_rows(&self.communication_cost(src, adj), &reindexing),
                    memory: reindex_rows(&self.memory_cost(src, adj), &reindexing),
                };
                self.add_edge_cost(dst, adj, costs);
            }
        }
        for adj in neighbors {
            self.remove_edge(src, adj);
        }

        tracing::debug!(src, dst, ?reindexing, "merged node");
        self.follow.link(src, dst, reindexing);
    }

    /// Returns the node `node` has been merged into, transitively.
    pub fn query_destination(&mut self, node: NodeIdx) -> NodeIdx {
        self.follow.find(node)
    }

    /// Contracts every queued follower into its final destination if
    /// `enable` is set, then records the destination of each merged node.
    #[profiling::function]
    pub fn simplify(&mut self, enable: bool) {
        if enable {
            let pairs = mem::take(&mut self.to_merge_pairs);
            for &(src, dst) in &pairs {
                let dst = self.query_destination(dst);
                self.merge_node(src, dst);
            }
            tracing::debug!(merged = pairs.len(), "simplified cost graph");
        }

        let mut follow_idx = Vec::with_capacity(self.num_nodes());
        for node in 0..self.num_nodes() {
            follow_idx.push(self.follow.is_merged(node).then(|| self.follow.find(node)));
        }
        self.follow_idx = follow_idx;
    }

    /// Final destination of each node, or `None` if it was not merged.
    pub fn follow_idx(&self) -> &[Option<NodeIdx>] {
        &self.follow_idx
    }

    /// Translates a strategy chosen for `node`'s final destination into
    /// a strategy of `node` itself.
    pub fn remap_index(&self, node: NodeIdx, value: StrategyIdx) -> StrategyIdx {
        match self.follow_idx[node] {
            Some(_) => self.follow.remap(node, value),
            None => value,
        }
    }
}

fn expect_leaf(graph: &StrategyGraph, id: GroupId) -> Result<&LeafGroup> {
    match graph.get(id) {
        StrategyGroup::Leaf(leaf) => Ok(leaf),
        StrategyGroup::Tuple(tuple) => Err(Error::NotALeaf {
            instruction: tuple.instruction_id,
        }),
    }
}

/// For each row, the column with the lowest cost, preferring
/// the highest column on ties.
fn greedy_reindexing(cost: &Matrix) -> Vec<StrategyIdx> {
    (0..cost.rows())
        .map(|i| {
            (0..cost.cols())
                .min_by(|&a, &b| {
                    cost[(i, a)]
                        .partial_cmp(&cost[(i, b)])
                        .unwrap_or(Ordering::Equal)
                        .then(b.cmp(&a))
                })
                .expect("merged node has no strategies")
        })
        .collect()
}

fn reindex_rows(matrix: &Matrix, reindexing: &[StrategyIdx]) -> Matrix {
    let mut result = Matrix::new(reindexing.len(), matrix.cols());
    for (i, &row) in reindexing.iter().enumerate() {
        for k in 0..matrix.cols() {
            result[(i, k)] = matrix[(row, k)];
        }
    }
    result
}

/// Diagnostic dump; not a stable format.
impl Display for CostGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Cost Graph:")?;
        for (i, len) in self.node_lens.iter().enumerate() {
            writeln!(f, "Node{i}: {len}")?;
        }
        writeln!(f)?;
        for (i, j, costs) in self.edges() {
            writeln!(f, "Edge ({i}, {j}):")?;
            writeln!(f, "{}", costs.communication)?;
        }
        Ok(())
    }
}
