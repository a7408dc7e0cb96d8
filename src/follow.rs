//! Union-find over cost-graph nodes where every link carries
//! a strategy reindexing.
//!
//! When node `src` is merged into node `dst`, the link stores for
//! each strategy `i` of `dst` the strategy of `src` that is chosen
//! along with it. Finding the root of a node compresses the path and
//! composes the reindexings on the way, so that afterwards the node
//! links directly to its root with a reindexing from the root's
//! strategies to its own.

use autoshard_ir::{NodeIdx, StrategyIdx};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    parent: NodeIdx,
    reindexing: Vec<StrategyIdx>,
}

#[derive(Debug, Clone, Default)]
pub struct FollowForest {
    links: Vec<Option<Link>>,
}

impl FollowForest {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            links: vec![None; num_nodes],
        }
    }

    pub fn is_merged(&self, node: NodeIdx) -> bool {
        self.links[node].is_some()
    }

    /// Links `src` below `dst`.
    ///
    /// `reindexing[i]` is the strategy of `src` corresponding
    /// to strategy `i` of `dst`.
    ///
    /// # Panics
    /// Panics if either node has already been merged or if
    /// `src == dst`. Both keep the forest acyclic.
    pub fn link(&mut self, src: NodeIdx, dst: NodeIdx, reindexing: Vec<StrategyIdx>) {
        assert_ne!(src, dst, "cannot merge node {src} into itself");
        assert!(!self.is_merged(src), "node {src} is already merged");
        assert!(!self.is_merged(dst), "node {dst} is already merged");
        self.links[src] = Some(Link {
            parent: dst,
            reindexing,
        });
    }

    /// Parent recorded for `node`, without resolving further.
    pub fn parent(&self, node: NodeIdx) -> Option<NodeIdx> {
        self.links[node].as_ref().map(|link| link.parent)
    }

    /// Reindexing from the strategies of `node`'s parent to those of `node`.
    pub fn reindexing(&self, node: NodeIdx) -> Option<&[StrategyIdx]> {
        self.links[node]
            .as_ref()
            .map(|link| link.reindexing.as_slice())
    }

    /// Finds the root of `node`, compressing the path to it.
    pub fn find(&mut self, node: NodeIdx) -> NodeIdx {
        let Some(parent) = self.parent(node) else {
            return node;
        };
        let root = self.find(parent);
        if root != parent {
            // `parent` now links straight to `root`.
            let composed = match (&self.links[node], &self.links[parent]) {
                (Some(own), Some(up)) => up
                    .reindexing
                    .iter()
                    .map(|&i| own.reindexing[i])
                    .collect(),
                _ => unreachable!("both nodes on the path are linked"),
            };
            self.links[node] = Some(Link {
                parent: root,
                reindexing: composed,
            });
        }
        root
    }

    /// Translates a strategy chosen at `node`'s parent into
    /// a strategy of `node`. Unmerged nodes map to themselves.
    ///
    /// Only meaningful after `find(node)`, once the parent is the root.
    pub fn remap(&self, node: NodeIdx, value: StrategyIdx) -> StrategyIdx {
        match self.reindexing(node) {
            Some(reindexing) => reindexing[value],
            None => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmerged_nodes_are_roots() {
        let mut forest = FollowForest::new(3);
        assert_eq!(forest.find(1), 1);
        assert_eq!(forest.remap(1, 7), 7);
        assert!(!forest.is_merged(1));
    }

    #[test]
    fn find_compresses_and_composes() {
        // 0 -> 1 -> 2 -> 3, each with three strategies.
        let mut forest = FollowForest::new(4);
        forest.link(0, 1, vec![1, 2, 0]);
        forest.link(1, 2, vec![2, 0, 1]);
        forest.link(2, 3, vec![0, 0, 2]);

        assert_eq!(forest.find(0), 3);
        assert_eq!(forest.parent(0), Some(3));
        assert_eq!(forest.parent(1), Some(3));
        assert_eq!(forest.parent(2), Some(3));

        // Walk the uncompressed chain by hand for each root strategy.
        for root_strategy in 0..3 {
            let at2 = [0, 0, 2][root_strategy];
            let at1 = [2, 0, 1][at2];
            let at0 = [1, 2, 0][at1];
            assert_eq!(forest.remap(0, root_strategy), at0);
            assert_eq!(forest.remap(1, root_strategy), at1);
        }
    }

    #[test]
    fn find_is_idempotent() {
        let mut forest = FollowForest::new(3);
        forest.link(0, 1, vec![1, 0]);
        forest.link(1, 2, vec![1, 1]);

        let first = forest.find(0);
        let reindexing = forest.reindexing(0).map(<[_]>::to_vec);
        let second = forest.find(0);

        assert_eq!(first, second);
        assert_eq!(forest.reindexing(0).map(<[_]>::to_vec), reindexing);
        assert_eq!(reindexing, Some(vec![0, 0]));
    }

    #[test]
    fn reindexing_length_follows_root() {
        // Root has 3 strategies, intermediate has 2, leaf has 4.
        let mut forest = FollowForest::new(3);
        forest.link(0, 1, vec![3, 1]);
        forest.link(1, 2, vec![1, 0, 1]);

        assert_eq!(forest.find(0), 2);
        assert_eq!(forest.reindexing(0), Some(&[1, 3, 1][..]));
    }

    #[test]
    #[should_panic(expected = "already merged")]
    fn relinking_merged_node_panics() {
        let mut forest = FollowForest::new(3);
        forest.link(0, 1, vec![0]);
        forest.link(0, 2, vec![0]);
    }

    #[test]
    #[should_panic(expected = "already merged")]
    fn linking_into_merged_node_panics() {
        let mut forest = FollowForest::new(3);
        forest.link(1, 2, vec![0]);
        forest.link(0, 1, vec![0]);
    }

    #[test]
    #[should_panic(expected = "into itself")]
    fn self_link_panics() {
        let mut forest = FollowForest::new(1);
        forest.link(0, 0, vec![0]);
    }
}
